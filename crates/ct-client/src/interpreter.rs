//! Client-side state machine
//!
//! Tokens decoded from the server stream drive a small state machine:
//!
//! | State | Event      | Action                               | Next    |
//! |-------|------------|--------------------------------------|---------|
//! | Nop   | STX        |                                      | Text    |
//! | Text  | literal    | display                              | Text    |
//! | Text  | ETX        | flush                                | Nop     |
//! | any   | FTX        | flush                                | same    |
//! | Nop   | KEY / KSH  | read a non-empty line, send it       | Nop     |
//! | Nop   | KPS        | read a secret, send its digest       | Nop     |
//! | Nop   | KAU        | read nonce, sign it, send `sig,nonce`| Nop     |
//! | Nop   | SVC        |                                      | Cmd     |
//! | Cmd   | literal    | accumulate                           | Cmd     |
//! | Cmd   | EVC        | deliver the command                  | Nop     |
//! | any   | EDT        |                                      | Close   |
//!
//! Prompt and block frames that arrive while another block is open end that
//! block implicitly; a command block ended this way is discarded, never
//! delivered. `EVC` outside a command block is ignored. Literal text outside
//! any block is displayed as is.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;

use ct_core::auth::{self, SecretKey};
use ct_core::{ConnectionError, CtError};
use ct_protocol::{ControlCode, ControlCodec, Outgoing, ProtocolError, Token, NONCE_LEN};

use crate::console::Console;
use crate::state::ClientState;

/// Prompt shown for shell-style input
pub const SHELL_PROMPT: &str = "> ";

/// Prompt shown when a password is requested
pub const PASSWORD_PROMPT: &str = "Password: ";

/// Prompt shown when a passphrase is needed to sign a challenge
pub const PASSPHRASE_PROMPT: &str = "Passphrase: ";

/// Interprets one server connection
pub struct Interpreter<S, C> {
    framed: Framed<S, ControlCodec>,
    console: C,
    state: ClientState,
    command: String,
    pending: VecDeque<Token>,
    key: Option<SecretKey>,
    debug: bool,
}

impl<S, C> Interpreter<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Console,
{
    /// Create an interpreter over a connected stream
    pub fn new(stream: S, console: C) -> Self {
        Self {
            framed: Framed::new(stream, ControlCodec::new()),
            console,
            state: ClientState::Nop,
            command: String::new(),
            pending: VecDeque::new(),
            key: None,
            debug: false,
        }
    }

    /// Sign challenges with `key` instead of prompting for a passphrase
    pub fn with_key(mut self, key: SecretKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Log every decoded frame
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Current state
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The console
    pub fn console(&self) -> &C {
        &self.console
    }

    /// Consume the interpreter, returning the console
    pub fn into_console(self) -> C {
        self.console
    }

    /// Process the stream until the server closes the session
    ///
    /// The transport is shut down on every exit path. End of stream before
    /// the close frame is [`ConnectionError::ConnectionLost`].
    pub async fn run(&mut self) -> Result<(), CtError> {
        let result = self.drive().await;

        if let Err(e) = self.framed.get_mut().shutdown().await {
            tracing::debug!("Transport shutdown failed: {}", e);
        }
        result
    }

    async fn drive(&mut self) -> Result<(), CtError> {
        while self.state != ClientState::Close {
            let token = self.next_token().await?.ok_or_else(|| {
                ConnectionError::ConnectionLost(format!(
                    "server closed the stream in state {}",
                    self.state
                ))
            })?;
            self.handle(token).await?;
        }
        tracing::debug!("Session closed by server");
        Ok(())
    }

    async fn next_token(&mut self) -> Result<Option<Token>, CtError> {
        if let Some(token) = self.pending.pop_front() {
            return Ok(Some(token));
        }
        match self.framed.next().await {
            Some(token) => Ok(Some(token?)),
            None => Ok(None),
        }
    }

    async fn handle(&mut self, token: Token) -> Result<(), CtError> {
        match token {
            Token::Literal(text) => self.on_literal(&text).await,
            Token::Frame(code) => {
                if self.debug {
                    tracing::debug!("CMD: {} (state {})", code, self.state);
                }
                self.on_frame(code).await
            }
        }
    }

    async fn on_literal(&mut self, text: &str) -> Result<(), CtError> {
        match self.state {
            ClientState::Cmd => self.command.push_str(text),
            ClientState::Nop | ClientState::Text | ClientState::KeyWait => {
                self.console.display(text).await?
            }
            ClientState::Close => {}
        }
        Ok(())
    }

    async fn on_frame(&mut self, code: ControlCode) -> Result<(), CtError> {
        if matches!(
            code,
            ControlCode::TextBegin
                | ControlCode::KeyWait
                | ControlCode::ShellWait
                | ControlCode::PassWait
                | ControlCode::AuthWait
                | ControlCode::CmdBegin
        ) {
            self.end_block();
        }

        match code {
            ControlCode::Ack | ControlCode::Nak => {
                tracing::trace!("Ignoring {}", code);
            }
            ControlCode::TextBegin => self.state = ClientState::Text,
            ControlCode::TextEnd => {
                self.console.flush().await?;
                self.state = ClientState::Nop;
            }
            ControlCode::TextFlush => self.console.flush().await?,
            ControlCode::KeyWait => self.answer_prompt("").await?,
            ControlCode::ShellWait => self.answer_prompt(SHELL_PROMPT).await?,
            ControlCode::PassWait => self.answer_password().await?,
            ControlCode::AuthWait => self.answer_challenge().await?,
            ControlCode::CmdBegin => self.state = ClientState::Cmd,
            ControlCode::CmdEnd => {
                if self.state == ClientState::Cmd {
                    let command = std::mem::take(&mut self.command);
                    self.console.command(command).await?;
                }
                self.state = ClientState::Nop;
            }
            ControlCode::Close => self.state = ClientState::Close,
        }
        Ok(())
    }

    /// Implicitly close whatever block is open
    fn end_block(&mut self) {
        if self.state == ClientState::Cmd && !self.command.is_empty() {
            tracing::debug!(
                "Discarding unterminated command block ({} bytes)",
                self.command.len()
            );
        }
        self.command.clear();
        self.state = ClientState::Nop;
    }

    async fn answer_prompt(&mut self, prompt: &str) -> Result<(), CtError> {
        self.state = ClientState::KeyWait;
        self.console.flush().await?;

        let line = self.read_non_empty(prompt, false).await?;
        self.send_raw(line.into_bytes()).await?;

        self.state = ClientState::Nop;
        Ok(())
    }

    async fn answer_password(&mut self) -> Result<(), CtError> {
        self.state = ClientState::KeyWait;
        self.console.flush().await?;

        let password = self.read_non_empty(PASSWORD_PROMPT, true).await?;
        let digest = auth::password_digest(&password);
        self.send_raw(digest.to_vec()).await?;

        self.state = ClientState::Nop;
        Ok(())
    }

    async fn answer_challenge(&mut self) -> Result<(), CtError> {
        self.state = ClientState::KeyWait;
        self.console.flush().await?;

        let nonce = self.read_nonce().await?;
        let reply = match self.key.as_ref().map(|key| auth::respond(&nonce, key)) {
            Some(reply) => reply,
            None => {
                let passphrase = self.read_non_empty(PASSPHRASE_PROMPT, true).await?;
                auth::respond(&nonce, &SecretKey::from_passphrase(&passphrase))
            }
        };
        self.send_raw(reply.into_bytes()).await?;

        self.state = ClientState::Nop;
        Ok(())
    }

    /// Collect the challenge nonce that follows the auth frame
    ///
    /// The nonce may arrive split over several reads; any text received
    /// beyond it is kept for normal processing.
    async fn read_nonce(&mut self) -> Result<String, CtError> {
        let mut nonce = String::with_capacity(NONCE_LEN);

        while nonce.chars().count() < NONCE_LEN {
            match self.next_token().await? {
                Some(Token::Literal(text)) => {
                    let needed = NONCE_LEN - nonce.chars().count();
                    let split = text
                        .char_indices()
                        .nth(needed)
                        .map(|(i, _)| i)
                        .unwrap_or(text.len());
                    nonce.push_str(&text[..split]);
                    if split < text.len() {
                        self.pending
                            .push_front(Token::Literal(text[split..].to_string()));
                    }
                }
                Some(Token::Frame(code)) => {
                    return Err(ProtocolError::UnexpectedFrame {
                        code,
                        context: "reading the auth challenge",
                    }
                    .into())
                }
                None => {
                    return Err(ConnectionError::ConnectionLost(
                        "server closed the stream during auth".into(),
                    )
                    .into())
                }
            }
        }
        Ok(nonce)
    }

    /// Prompt until the user enters something
    async fn read_non_empty(&mut self, prompt: &str, secret: bool) -> Result<String, CtError> {
        loop {
            let input = if secret {
                self.console.read_secret(prompt).await?
            } else {
                self.console.read_line(prompt).await?
            };

            match input {
                Some(line) if !line.is_empty() => return Ok(line),
                Some(_) => continue,
                None => {
                    return Err(ConnectionError::Aborted("local input closed".into()).into());
                }
            }
        }
    }

    async fn send_raw(&mut self, bytes: Vec<u8>) -> Result<(), CtError> {
        self.framed.send(Outgoing::Raw(Bytes::from(bytes))).await?;
        Ok(())
    }
}
