//! Listening socket and accept loop
//!
//! The accept loop is the only owner of the worker registry, a `JoinSet`
//! scoped to the loop's lifetime. Finished workers are reaped as they
//! complete; on shutdown the loop stops accepting and joins every
//! outstanding worker before the listening socket is released.
//!
//! `max_connections` is checked against the number of live sessions, not
//! the registry size: rejected connections and finished-but-unreaped
//! workers never hold a slot.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use ct_core::config::ServerConfig;

use super::worker::{self, SessionSlot};
use crate::service::Service;
use crate::session::SessionOptions;

/// Bound listening socket
pub struct Listener {
    listener: TcpListener,
    config: ServerConfig,
}

impl Listener {
    /// Bind to `config.bind_address`
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .with_context(|| format!("Failed to bind to {}", config.bind_address))?;

        Ok(Self { listener, config })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `cancel` fires, then join all workers
    pub async fn serve(self, service: Arc<dyn Service>, cancel: CancellationToken) -> Result<()> {
        let local_addr = self.listener.local_addr()?;
        tracing::info!("Session server listening on {}", local_addr);

        let options = SessionOptions::from(&self.config);
        let mut workers: JoinSet<()> = JoinSet::new();
        let live = Arc::new(AtomicUsize::new(0));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Session server shutting down");
                    break;
                }

                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    log_join(joined);
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => {
                            let at_capacity = self
                                .config
                                .max_connections
                                .is_some_and(|max| live.load(Ordering::SeqCst) >= max);

                            if at_capacity {
                                workers.spawn(worker::reject(socket, peer_addr));
                            } else {
                                workers.spawn(worker::run(
                                    socket,
                                    peer_addr,
                                    Arc::clone(&service),
                                    options.clone(),
                                    cancel.child_token(),
                                    SessionSlot::acquire(&live),
                                ));
                            }
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        if !workers.is_empty() {
            tracing::info!("Waiting for {} connection(s) to finish", workers.len());
        }
        while let Some(joined) = workers.join_next().await {
            log_join(joined);
        }

        tracing::info!("Session server on {} stopped", local_addr);
        Ok(())
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!("Connection worker panicked: {}", e);
        }
    }
}
