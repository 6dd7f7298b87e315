//! Server side of a connection
//!
//! A [`Session`] owns the transport for one accepted connection and exposes
//! the protocol vocabulary a service uses to drive the remote terminal:
//! plain text, text blocks, prompts, the challenge-response handshake,
//! command blocks and the close frame.
//!
//! The session keeps no client-visible state; it only emits frames in the
//! order the service asks for them. Every operation that waits for the peer
//! is bounded by the configured reply timeout and aborts when the worker's
//! cancellation token fires.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;

use ct_core::auth::{Challenge, Verifier, REPLY_SEPARATOR};
use ct_core::config::ServerConfig;
use ct_core::{ConnectionError, CtError, SessionError};
use ct_protocol::{ControlCode, ControlCodec, Outgoing, BUFSIZE, DIGEST_LEN, NONCE_LEN};

/// Upper bound on a buffered reply that never completes
const MAX_REPLY_SIZE: usize = 4 * BUFSIZE;

/// How long the peer may pause mid-reply before the reply is considered
/// complete
const REPLY_GRACE: Duration = Duration::from_millis(20);

/// Byte stream a session can run over
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Per-session tunables
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// How long to wait for a reply (None = forever)
    pub reply_timeout: Option<Duration>,
}

impl From<&ServerConfig> for SessionOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            reply_timeout: config.reply_timeout,
        }
    }
}

/// One connection's protocol endpoint
pub struct Session {
    stream: Box<dyn Transport>,
    peer: Option<SocketAddr>,
    codec: ControlCodec,
    write_buf: BytesMut,
    read_buf: BytesMut,
    options: SessionOptions,
    cancel: CancellationToken,
}

impl Session {
    /// Create a session over a transport
    pub fn new(stream: impl Transport + 'static) -> Self {
        Self {
            stream: Box::new(stream),
            peer: None,
            codec: ControlCodec::new(),
            write_buf: BytesMut::with_capacity(BUFSIZE),
            read_buf: BytesMut::with_capacity(BUFSIZE),
            options: SessionOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Record the remote address (for logging)
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Apply session options
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Abort pending waits when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Remote address, if known
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Write literal text with no framing
    pub async fn send_text(&mut self, text: &str) -> Result<(), CtError> {
        self.write_items([Outgoing::Text(text.to_string())]).await
    }

    /// Write literal text followed by a newline
    pub async fn send_line(&mut self, text: &str) -> Result<(), CtError> {
        self.write_items([Outgoing::Text(format!("{}\n", text))]).await
    }

    /// Emit a single control frame
    pub async fn send_frame(&mut self, code: ControlCode) -> Result<(), CtError> {
        self.write_items([Outgoing::Frame(code)]).await
    }

    /// Print `parts` joined by `sep` and terminated by `end` inside a text block
    pub async fn print_block<I, S>(&mut self, parts: I, sep: &str, end: &str) -> Result<(), CtError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut body = String::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                body.push_str(sep);
            }
            body.push_str(part.as_ref());
        }
        body.push_str(end);

        self.write_items([
            Outgoing::Frame(ControlCode::TextBegin),
            Outgoing::Text(body),
            Outgoing::Frame(ControlCode::TextEnd),
        ])
        .await
    }

    /// Print one line inside a text block
    pub async fn println(&mut self, text: &str) -> Result<(), CtError> {
        self.print_block([text], " ", "\n").await
    }

    /// Ask the client to flush its output
    pub async fn flush(&mut self) -> Result<(), CtError> {
        self.send_frame(ControlCode::TextFlush).await
    }

    /// Prompt for a line of input
    pub async fn key_wait(&mut self) -> Result<String, CtError> {
        self.prompt(ControlCode::KeyWait).await?;
        self.wait_reply(take_text_reply).await
    }

    /// Prompt for a line of input with the client's shell prompt
    pub async fn shell_wait(&mut self) -> Result<String, CtError> {
        self.prompt(ControlCode::ShellWait).await?;
        self.wait_reply(take_text_reply).await
    }

    /// Prompt for a secret; returns the raw digest the client computed
    pub async fn pass_wait(&mut self) -> Result<[u8; DIGEST_LEN], CtError> {
        self.prompt(ControlCode::PassWait).await?;
        self.wait_reply(take_digest_reply).await
    }

    /// Run the challenge-response handshake against `verifier`
    ///
    /// Returns `Ok(false)` for a wrong key, a mismatched echo or a malformed
    /// reply. Transport failures, timeouts and cancellation are errors.
    pub async fn authenticate(&mut self, verifier: &dyn Verifier) -> Result<bool, CtError> {
        let challenge = Challenge::new();

        self.discard_stale();
        self.write_items([
            Outgoing::Frame(ControlCode::AuthWait),
            Outgoing::Text(challenge.nonce().to_string()),
        ])
        .await?;

        let reply = self.wait_reply(take_auth_reply).await?;
        let accepted = challenge.verify(&reply, verifier);

        if accepted {
            tracing::info!("Authentication succeeded for {:?}", self.peer);
        } else {
            tracing::warn!("Authentication failed for {:?}", self.peer);
        }
        Ok(accepted)
    }

    /// Send a command block
    pub async fn command_block(&mut self, command: &str) -> Result<(), CtError> {
        self.write_items([
            Outgoing::Frame(ControlCode::CmdBegin),
            Outgoing::Text(command.to_string()),
            Outgoing::Frame(ControlCode::CmdEnd),
        ])
        .await
    }

    /// Tell the client to close; the transport stays open
    pub async fn close(&mut self) -> Result<(), CtError> {
        self.send_frame(ControlCode::Close).await
    }

    /// Shut down the write side of the transport
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("Transport shutdown for {:?} failed: {}", self.peer, e);
        }
    }

    async fn prompt(&mut self, code: ControlCode) -> Result<(), CtError> {
        self.discard_stale();
        self.send_frame(code).await
    }

    /// Drop unconsumed bytes left over from an earlier reply
    fn discard_stale(&mut self) {
        if !self.read_buf.is_empty() {
            tracing::debug!(
                "Discarding {} stale reply bytes from {:?}",
                self.read_buf.len(),
                self.peer
            );
            self.read_buf.clear();
        }
    }

    async fn write_items<I>(&mut self, items: I) -> Result<(), CtError>
    where
        I: IntoIterator<Item = Outgoing>,
    {
        for item in items {
            if let Err(e) = self.codec.encode(item, &mut self.write_buf) {
                self.write_buf.clear();
                return Err(e.into());
            }
        }

        let result = self.stream.write_all(&self.write_buf).await;
        self.write_buf.clear();
        result?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn wait_reply<R, F>(&mut self, extract: F) -> Result<R, CtError>
    where
        F: FnMut(&mut BytesMut, bool) -> Result<Option<R>, CtError>,
    {
        let cancel = self.cancel.clone();
        let timeout = self.options.reply_timeout;
        let read = self.read_until(extract);

        let guarded = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, read).await {
                    Ok(result) => result,
                    Err(_) => Err(SessionError::Timeout(limit).into()),
                },
                None => read.await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(SessionError::Cancelled.into()),
            result = guarded => result,
        }
    }

    /// Read until `extract` yields a reply
    ///
    /// `extract` is told whether the peer has gone quiet: no further bytes
    /// arrived within [`REPLY_GRACE`] of the last receive. Replies longer
    /// than one receive are reassembled here.
    async fn read_until<R, F>(&mut self, mut extract: F) -> Result<R, CtError>
    where
        F: FnMut(&mut BytesMut, bool) -> Result<Option<R>, CtError>,
    {
        let mut chunk = [0u8; BUFSIZE];
        let mut idle = false;
        loop {
            if let Some(reply) = extract(&mut self.read_buf, idle)? {
                return Ok(reply);
            }
            if self.read_buf.len() > MAX_REPLY_SIZE {
                return Err(SessionError::MalformedReply(format!(
                    "reply exceeds {} bytes",
                    MAX_REPLY_SIZE
                ))
                .into());
            }

            let n = if self.read_buf.is_empty() || idle {
                self.stream.read(&mut chunk).await?
            } else {
                match tokio::time::timeout(REPLY_GRACE, self.stream.read(&mut chunk)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        idle = true;
                        continue;
                    }
                }
            };

            if n == 0 {
                if !self.read_buf.is_empty() && !idle {
                    idle = true;
                    continue;
                }
                return Err(ConnectionError::ConnectionLost("peer closed the stream".into()).into());
            }
            tracing::trace!("Received {} bytes from {:?}", n, self.peer);
            self.read_buf.extend_from_slice(&chunk[..n]);
            idle = false;
        }
    }
}

/// A line reply is everything received once the peer goes quiet, provided
/// it is complete UTF-8
fn take_text_reply(buf: &mut BytesMut, idle: bool) -> Result<Option<String>, CtError> {
    if buf.is_empty() || !idle {
        return Ok(None);
    }
    match std::str::from_utf8(buf) {
        Ok(_) => {}
        Err(e) if e.error_len().is_none() => return Ok(None),
        Err(e) => {
            return Err(SessionError::MalformedReply(format!(
                "invalid UTF-8 at byte {}",
                e.valid_up_to()
            ))
            .into())
        }
    }
    let bytes = buf.split();
    let text = String::from_utf8(bytes.to_vec())
        .map_err(|e| SessionError::MalformedReply(e.to_string()))?;
    Ok(Some(text))
}

fn take_digest_reply(buf: &mut BytesMut, _idle: bool) -> Result<Option<[u8; DIGEST_LEN]>, CtError> {
    if buf.len() < DIGEST_LEN {
        return Ok(None);
    }
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&buf.split_to(DIGEST_LEN));
    Ok(Some(digest))
}

/// An auth reply is complete once a full-length nonce follows the separator,
/// or, malformed, once the peer goes quiet without sending one
fn take_auth_reply(buf: &mut BytesMut, idle: bool) -> Result<Option<String>, CtError> {
    let separator = REPLY_SEPARATOR as u8;
    let end = buf
        .iter()
        .position(|&b| b == separator)
        .map(|pos| pos + 1 + NONCE_LEN)
        .filter(|&end| buf.len() >= end);

    let bytes = match end {
        Some(end) => buf.split_to(end),
        None if idle && !buf.is_empty() => buf.split(),
        None => return Ok(None),
    };
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}
