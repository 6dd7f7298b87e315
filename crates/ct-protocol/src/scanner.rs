//! Stream scanner separating frames from literal text
//!
//! Bytes are classified without ever cutting a multi-byte character: the
//! marker is ASCII and cannot occur inside a UTF-8 sequence, so the scanner
//! searches for it in the raw bytes and then decodes each literal run up to
//! the last complete character. An incomplete trailing character or frame
//! stays buffered until more bytes arrive.

use bytes::{Buf, BytesMut};

use crate::code::{ControlCode, CODE_LEN, MARKER};
use crate::error::ProtocolError;

/// A decoded element of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal payload text
    Literal(String),
    /// A control frame
    Frame(ControlCode),
}

/// Decode the next token from the front of `src`
///
/// Returns `Ok(None)` when `src` holds only a partial frame or a partial
/// character and more bytes are needed.
pub fn next_token(src: &mut BytesMut) -> Result<Option<Token>, ProtocolError> {
    if src.is_empty() {
        return Ok(None);
    }

    if src[0] == MARKER {
        if src.len() < 1 + CODE_LEN {
            return Ok(None);
        }
        let code = ControlCode::from_bytes(&src[1..1 + CODE_LEN])?;
        src.advance(1 + CODE_LEN);
        return Ok(Some(Token::Frame(code)));
    }

    let run = src.iter().position(|&b| b == MARKER).unwrap_or(src.len());
    let complete = match std::str::from_utf8(&src[..run]) {
        Ok(_) => run,
        // A truncated character is only legal at the very end of the buffer
        Err(e) if e.error_len().is_none() && run == src.len() => e.valid_up_to(),
        Err(e) => {
            return Err(ProtocolError::InvalidUtf8 {
                offset: e.valid_up_to(),
            })
        }
    };

    if complete == 0 {
        return Ok(None);
    }

    let bytes = src.split_to(complete);
    let text = String::from_utf8(bytes.to_vec()).map_err(|e| ProtocolError::InvalidUtf8 {
        offset: e.utf8_error().valid_up_to(),
    })?;
    Ok(Some(Token::Literal(text)))
}

/// Check that nothing but complete tokens was left behind at end of stream
pub fn check_eof(src: &BytesMut) -> Result<(), ProtocolError> {
    if src.is_empty() {
        return Ok(());
    }
    if src[0] == MARKER {
        return Err(ProtocolError::IncompleteFrame {
            expected: CODE_LEN,
            actual: src.len() - 1,
        });
    }
    Err(ProtocolError::InvalidUtf8 { offset: 0 })
}

/// Incremental scanner over a byte stream delivered in arbitrary chunks
#[derive(Debug, Default)]
pub struct Scanner {
    buffer: BytesMut,
}

impl Scanner {
    /// Create an empty scanner
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Decode the next complete token, if any
    pub fn next_token(&mut self) -> Result<Option<Token>, ProtocolError> {
        next_token(&mut self.buffer)
    }

    /// Number of bytes waiting for completion
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Signal end of stream; fails if a partial frame or character remains
    pub fn finish(self) -> Result<(), ProtocolError> {
        check_eof(&self.buffer)
    }
}

/// Scan a complete buffer into tokens
pub fn scan(data: &[u8]) -> Result<Vec<Token>, ProtocolError> {
    let mut scanner = Scanner::new();
    scanner.push(data);

    let mut tokens = Vec::new();
    while let Some(token) = scanner.next_token()? {
        tokens.push(token);
    }
    scanner.finish()?;
    Ok(tokens)
}
