//! Client state

use std::fmt;

/// Where the interpreter is in the frame stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    /// Idle between blocks
    #[default]
    Nop,
    /// Session closed; terminal
    Close,
    /// Inside a text block
    Text,
    /// Waiting on local input for a prompt
    KeyWait,
    /// Inside a command block
    Cmd,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientState::Nop => write!(f, "nop"),
            ClientState::Close => write!(f, "close"),
            ClientState::Text => write!(f, "text"),
            ClientState::KeyWait => write!(f, "keywait"),
            ClientState::Cmd => write!(f, "cmd"),
        }
    }
}
