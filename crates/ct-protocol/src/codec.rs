//! Tokio codec for the control-code stream

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::code::{ControlCode, MARKER};
use crate::error::ProtocolError;
use crate::scanner::{self, Token};

/// Something to put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// A control frame
    Frame(ControlCode),
    /// Literal text; must not contain the frame marker
    Text(String),
    /// Raw bytes, written unchecked (replies such as password digests)
    Raw(Bytes),
}

/// Codec turning the byte stream into [`Token`]s and [`Outgoing`] items
/// into bytes
#[derive(Debug, Default)]
pub struct ControlCodec;

impl ControlCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for ControlCodec {
    type Item = Token;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let token = scanner::next_token(src)?;
        if let Some(Token::Frame(code)) = &token {
            tracing::trace!("Decoded frame {}", code);
        }
        Ok(token)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(token) => Ok(Some(token)),
            None => {
                scanner::check_eof(src)?;
                Ok(None)
            }
        }
    }
}

impl Encoder<Outgoing> for ControlCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Outgoing, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Outgoing::Frame(code) => code.encode(dst),
            Outgoing::Text(text) => {
                if let Some(offset) = text.bytes().position(|b| b == MARKER) {
                    return Err(ProtocolError::MarkerInPayload { offset });
                }
                dst.put_slice(text.as_bytes());
            }
            Outgoing::Raw(bytes) => dst.put_slice(&bytes),
        }
        Ok(())
    }
}
