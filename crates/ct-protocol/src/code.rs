//! Control codes and frame encoding
//!
//! A frame on the wire is `MARKER` followed by exactly [`CODE_LEN`] ASCII
//! characters naming one [`ControlCode`].

use bytes::{BufMut, BytesMut};
use std::fmt;

use crate::error::ProtocolError;

/// Frame-start marker byte (DC1)
pub const MARKER: u8 = 0x11;

/// Number of characters in a control code
pub const CODE_LEN: usize = 3;

/// Control code carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCode {
    /// Positive acknowledgement
    Ack,
    /// Negative acknowledgement
    Nak,
    /// Begin literal text block
    TextBegin,
    /// End literal text block
    TextEnd,
    /// Flush output now
    TextFlush,
    /// Prompt for a line of input
    KeyWait,
    /// Prompt for a line of input with a shell-style prompt
    ShellWait,
    /// Prompt for a secret, reply is a fixed-length digest
    PassWait,
    /// Begin challenge-response auth, payload is the nonce
    AuthWait,
    /// Begin command block
    CmdBegin,
    /// End command block
    CmdEnd,
    /// Close the session
    Close,
}

impl ControlCode {
    /// Every control code, in wire-table order
    pub const ALL: [ControlCode; 12] = [
        ControlCode::Ack,
        ControlCode::Nak,
        ControlCode::TextBegin,
        ControlCode::TextEnd,
        ControlCode::TextFlush,
        ControlCode::KeyWait,
        ControlCode::ShellWait,
        ControlCode::PassWait,
        ControlCode::AuthWait,
        ControlCode::CmdBegin,
        ControlCode::CmdEnd,
        ControlCode::Close,
    ];

    /// The 3-character wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCode::Ack => "ACK",
            ControlCode::Nak => "NAK",
            ControlCode::TextBegin => "STX",
            ControlCode::TextEnd => "ETX",
            ControlCode::TextFlush => "FTX",
            ControlCode::KeyWait => "KEY",
            ControlCode::ShellWait => "KSH",
            ControlCode::PassWait => "KPS",
            ControlCode::AuthWait => "KAU",
            ControlCode::CmdBegin => "SVC",
            ControlCode::CmdEnd => "EVC",
            ControlCode::Close => "EDT",
        }
    }

    /// Decode a wire token
    pub fn from_bytes(token: &[u8]) -> Result<Self, ProtocolError> {
        let code = match token {
            b"ACK" => ControlCode::Ack,
            b"NAK" => ControlCode::Nak,
            b"STX" => ControlCode::TextBegin,
            b"ETX" => ControlCode::TextEnd,
            b"FTX" => ControlCode::TextFlush,
            b"KEY" => ControlCode::KeyWait,
            b"KSH" => ControlCode::ShellWait,
            b"KPS" => ControlCode::PassWait,
            b"KAU" => ControlCode::AuthWait,
            b"SVC" => ControlCode::CmdBegin,
            b"EVC" => ControlCode::CmdEnd,
            b"EDT" => ControlCode::Close,
            other => {
                return Err(ProtocolError::UnknownCode(
                    String::from_utf8_lossy(other).into_owned(),
                ))
            }
        };
        Ok(code)
    }

    /// Append `MARKER || code` to a buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(1 + CODE_LEN);
        dst.put_u8(MARKER);
        dst.put_slice(self.as_str().as_bytes());
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encode a single frame as `MARKER || code`
pub fn encode_frame(code: ControlCode) -> [u8; 1 + CODE_LEN] {
    let token = code.as_str().as_bytes();
    [MARKER, token[0], token[1], token[2]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_code_roundtrip() {
        for code in ControlCode::ALL {
            let frame = encode_frame(code);
            assert_eq!(frame[0], MARKER);
            assert_eq!(ControlCode::from_bytes(&frame[1..]).unwrap(), code);
        }
    }

    #[test]
    fn test_codes_are_disjoint_ascii() {
        let tokens: HashSet<&str> = ControlCode::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(tokens.len(), ControlCode::ALL.len());
        for token in tokens {
            assert_eq!(token.len(), CODE_LEN);
            assert!(token.bytes().all(|b| b.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_unknown_code() {
        let result = ControlCode::from_bytes(b"XYZ");
        assert!(matches!(result, Err(ProtocolError::UnknownCode(ref t)) if t == "XYZ"));
    }

    #[test]
    fn test_encode_into_buffer() {
        let mut buf = BytesMut::new();
        ControlCode::TextBegin.encode(&mut buf);
        ControlCode::TextEnd.encode(&mut buf);
        assert_eq!(&buf[..], b"\x11STX\x11ETX");
    }
}
