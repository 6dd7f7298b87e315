//! Demonstration service shipped with the `ct-server` binary
//!
//! Greets the user, optionally runs the challenge-response handshake
//! against the configured public key, then serves a tiny command shell.

use async_trait::async_trait;

use ct_core::auth::PublicKey;
use ct_core::config::ServerConfig;
use ct_core::CtError;

use crate::service::Service;
use crate::session::Session;

/// Authentication attempts before the session is closed
pub const MAX_AUTH_ATTEMPTS: usize = 3;

const HELP: &[&str] = &[
    "help          show this message",
    "echo TEXT     print TEXT back",
    "whoami        print the name you gave",
    "run COMMAND   send COMMAND as a command block",
    "passwd        prompt for a password",
    "exit          close the session",
];

/// Greeter plus a small line-oriented shell
pub struct DemoService {
    banner: String,
    authorized_key: Option<PublicKey>,
}

impl DemoService {
    /// Create a service; `authorized_key` enables the auth step
    pub fn new(banner: impl Into<String>, authorized_key: Option<PublicKey>) -> Self {
        Self {
            banner: banner.into(),
            authorized_key,
        }
    }

    /// Build from server configuration
    ///
    /// A malformed `authorized_key` is a [`CtError::Auth`].
    pub fn from_config(config: &ServerConfig) -> Result<Self, CtError> {
        let authorized_key = match config.authorized_key.as_deref() {
            Some(text) => Some(PublicKey::from_base64(text)?),
            None => None,
        };
        Ok(Self::new(config.banner.clone(), authorized_key))
    }

    async fn authenticate(&self, session: &mut Session, key: &PublicKey) -> Result<bool, CtError> {
        for attempt in 1..=MAX_AUTH_ATTEMPTS {
            session.println("Enter your passphrase to authenticate").await?;
            if session.authenticate(key).await? {
                return Ok(true);
            }
            tracing::debug!("Auth attempt {} of {} failed", attempt, MAX_AUTH_ATTEMPTS);
            session.println("Authentication failed").await?;
        }
        Ok(false)
    }

    async fn shell(&self, session: &mut Session, name: &str) -> Result<(), CtError> {
        loop {
            let line = session.shell_wait().await?;
            let line = line.trim();
            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

            match command {
                "help" => session.print_block(HELP.iter(), "\n", "\n").await?,
                "echo" => session.println(rest).await?,
                "whoami" => session.println(name).await?,
                "run" if !rest.is_empty() => {
                    session.command_block(rest).await?;
                    session.println("Command sent").await?;
                }
                "passwd" => {
                    let digest = session.pass_wait().await?;
                    tracing::debug!("Received {} byte password digest", digest.len());
                    session.println("Password received").await?;
                }
                "exit" | "quit" => {
                    session.println("Bye").await?;
                    return Ok(());
                }
                _ => {
                    session
                        .print_block(["Unknown command:", command], " ", "\n")
                        .await?
                }
            }
        }
    }
}

#[async_trait]
impl Service for DemoService {
    async fn service(&self, session: &mut Session) -> Result<(), CtError> {
        session.println(&self.banner).await?;
        session.send_text("Name: ").await?;
        session.flush().await?;
        let name = session.key_wait().await?;
        let name = name.trim().to_string();

        if let Some(key) = &self.authorized_key {
            if !self.authenticate(session, key).await? {
                session.println("Too many failed attempts").await?;
                return session.close().await;
            }
            session.println("Authenticated").await?;
        }

        session
            .print_block(["Hello,", name.as_str(), "- type 'help' for commands"], " ", "\n")
            .await?;
        self.shell(session, &name).await?;
        session.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_core::auth::SecretKey;

    #[test]
    fn test_from_config_without_key() {
        let service = DemoService::from_config(&ServerConfig::default()).unwrap();
        assert!(service.authorized_key.is_none());
        assert_eq!(service.banner, "Welcome to ctlterm");
    }

    #[test]
    fn test_from_config_parses_key() {
        let public = SecretKey::from_passphrase("pw").public_key();
        let config = ServerConfig {
            authorized_key: Some(public.to_base64()),
            ..ServerConfig::default()
        };

        let service = DemoService::from_config(&config).unwrap();
        assert_eq!(service.authorized_key, Some(public));
    }

    #[test]
    fn test_from_config_rejects_bad_key() {
        let config = ServerConfig {
            authorized_key: Some("not base64!".to_string()),
            ..ServerConfig::default()
        };

        assert!(matches!(
            DemoService::from_config(&config),
            Err(CtError::Auth(_))
        ));
    }
}
