//! ct-protocol: Control-code wire protocol for ctlterm sessions
//!
//! The wire is a plain byte stream of UTF-8 text with embedded frames.
//! A frame is the marker byte followed by a 3-character control code;
//! everything else is literal payload.

pub mod code;
pub mod codec;
pub mod error;
pub mod scanner;

pub use code::{encode_frame, ControlCode, CODE_LEN, MARKER};
pub use codec::{ControlCodec, Outgoing};
pub use error::ProtocolError;
pub use scanner::{scan, Scanner, Token};

/// Size of a single receive operation on either side of the connection
pub const BUFSIZE: usize = 1024;

/// Length of the challenge nonce sent with `KAU`
pub const NONCE_LEN: usize = 32;

/// Length of the password digest sent in reply to `KPS`
pub const DIGEST_LEN: usize = 32;
