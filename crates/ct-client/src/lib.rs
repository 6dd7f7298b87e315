//! ct-client: ctlterm client
//!
//! The client reads the server's byte stream, separates control frames from
//! literal text and acts on each frame locally: printing text blocks,
//! prompting for input, answering authentication challenges and collecting
//! command blocks.

pub mod connector;
pub mod console;
pub mod interpreter;
pub mod state;

pub use connector::connect;
pub use console::{BufferedConsole, Console, TerminalConsole};
pub use interpreter::Interpreter;
pub use state::ClientState;
