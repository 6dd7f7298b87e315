//! Core error types for ctlterm

use ct_protocol::ProtocolError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the ctlterm ecosystem
#[derive(Error, Debug)]
pub enum CtError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Key material error
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CtError {
    /// Whether this error means the transport itself went away
    ///
    /// Such failures are routine (the peer hung up) and are dropped quietly
    /// by the server.
    pub fn is_disconnect(&self) -> bool {
        match self {
            CtError::Connection(_) => true,
            CtError::Io(e) | CtError::Protocol(ProtocolError::Io(e)) => is_disconnect_kind(e),
            _ => false,
        }
    }
}

/// I/O error kinds that indicate the peer dropped the connection
pub fn is_disconnect_kind(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected
    )
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Connection refused
    #[error("Connection refused: {0}")]
    Refused(String),

    /// Peer closed the stream without a close frame
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Local side gave up (e.g. interactive input ended)
    #[error("Connection aborted: {0}")]
    Aborted(String),
}

/// Session-related errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Peer did not reply in time
    #[error("Timed out after {0:?} waiting for a reply")]
    Timeout(Duration),

    /// Server is shutting down
    #[error("Session cancelled")]
    Cancelled,

    /// Reply could not be interpreted
    #[error("Malformed reply: {0}")]
    MalformedReply(String),
}

/// Key material errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Key text is not valid base64 or has the wrong length
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Signature text is not valid base64 or has the wrong length
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_disconnect_classification() {
        let reset: CtError = io::Error::from(io::ErrorKind::ConnectionReset).into();
        assert!(reset.is_disconnect());

        let lost: CtError = ConnectionError::ConnectionLost("eof".into()).into();
        assert!(lost.is_disconnect());

        let protocol: CtError = ProtocolError::UnknownCode("ZZZ".into()).into();
        assert!(!protocol.is_disconnect());

        let timeout: CtError = SessionError::Timeout(Duration::from_secs(1)).into();
        assert!(!timeout.is_disconnect());
    }
}
