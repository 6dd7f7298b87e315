//! Protocol error types

use thiserror::Error;

use crate::code::ControlCode;

/// Errors that can occur while framing or scanning the control-code stream
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The 3 bytes after a marker are not a known control code
    #[error("Unknown control code: {0:?}")]
    UnknownCode(String),

    /// The stream ended in the middle of a frame
    #[error("Incomplete frame: expected {expected} code bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    /// A frame arrived where only payload text is allowed
    #[error("Unexpected {code} frame while {context}")]
    UnexpectedFrame {
        code: ControlCode,
        context: &'static str,
    },

    /// Literal payload is not valid UTF-8
    #[error("Invalid UTF-8 in literal payload at byte {offset}")]
    InvalidUtf8 { offset: usize },

    /// Outgoing text contains the frame marker and would be misread as a frame
    #[error("Payload contains the frame marker at byte {offset}")]
    MarkerInPayload { offset: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
