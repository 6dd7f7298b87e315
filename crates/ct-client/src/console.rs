//! Local side of the terminal
//!
//! The interpreter never touches stdin/stdout directly; it goes through a
//! [`Console`]. [`TerminalConsole`] is the interactive implementation and
//! [`BufferedConsole`] replays scripted input and captures output, for
//! non-interactive runs and tests.

use std::collections::VecDeque;
use std::io::{self, Write};

use async_trait::async_trait;

/// Local input/output used by the interpreter
#[async_trait]
pub trait Console: Send {
    /// Show literal text
    async fn display(&mut self, text: &str) -> io::Result<()>;

    /// Flush displayed text
    async fn flush(&mut self) -> io::Result<()>;

    /// Read one line; `None` when local input has ended
    async fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Read a secret without echo; `None` when local input has ended
    async fn read_secret(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Receive a completed command block
    async fn command(&mut self, command: String) -> io::Result<()>;
}

/// Interactive console on the process's stdin/stdout
#[derive(Debug, Default)]
pub struct TerminalConsole;

impl TerminalConsole {
    /// Create a terminal console
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Console for TerminalConsole {
    async fn display(&mut self, text: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    async fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }

    async fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            let mut out = io::stdout().lock();
            out.write_all(prompt.as_bytes())?;
            out.flush()?;
            drop(out);

            let mut line = String::new();
            if io::stdin().read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim_end_matches(['\r', '\n']).len();
            line.truncate(trimmed);
            Ok(Some(line))
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn read_secret(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || match rpassword::prompt_password(prompt) {
            Ok(secret) => Ok(Some(secret)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn command(&mut self, command: String) -> io::Result<()> {
        tracing::info!("Received command block: {}", command);
        Ok(())
    }
}

/// Console fed from scripted input that records everything it is shown
#[derive(Debug, Default)]
pub struct BufferedConsole {
    lines: VecDeque<String>,
    secrets: VecDeque<String>,
    output: String,
    prompts: Vec<String>,
    commands: Vec<String>,
    flushes: usize,
}

impl BufferedConsole {
    /// Create a console with no scripted input
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue lines returned by `read_line`
    pub fn with_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Queue secrets returned by `read_secret`
    pub fn with_secrets<I, S>(mut self, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secrets.extend(secrets.into_iter().map(Into::into));
        self
    }

    /// Everything displayed so far
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Prompts shown, in order
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Command blocks received, in order
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Number of flushes requested
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

#[async_trait]
impl Console for BufferedConsole {
    async fn display(&mut self, text: &str) -> io::Result<()> {
        self.output.push_str(text);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }

    async fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.lines.pop_front())
    }

    async fn read_secret(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.secrets.pop_front())
    }

    async fn command(&mut self, command: String) -> io::Result<()> {
        self.commands.push(command);
        Ok(())
    }
}
