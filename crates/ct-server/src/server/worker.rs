//! Per-connection worker

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use ct_core::{CtError, SessionError};

use crate::service::Service;
use crate::session::{Session, SessionOptions};

/// One live session counted against `max_connections`
///
/// Taken by the accept loop before the worker is spawned and released as
/// soon as the service returns.
pub(crate) struct SessionSlot {
    live: Arc<AtomicUsize>,
}

impl SessionSlot {
    pub(crate) fn acquire(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            live: Arc::clone(live),
        }
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serve one accepted connection end to end
///
/// Failures are contained here; nothing propagates back to the accept loop.
pub(crate) async fn run(
    socket: TcpStream,
    peer_addr: SocketAddr,
    service: Arc<dyn Service>,
    options: SessionOptions,
    cancel: CancellationToken,
    slot: SessionSlot,
) {
    tracing::info!("New connection from {}", peer_addr);

    if let Err(e) = socket.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
    }

    let mut session = Session::new(socket)
        .with_peer(peer_addr)
        .with_options(options)
        .with_cancel(cancel);

    let result = service.service(&mut session).await;
    drop(slot);
    session.shutdown().await;

    match result {
        Ok(()) => {
            tracing::info!("Connection from {} closed normally", peer_addr);
        }
        Err(e) if e.is_disconnect() => {
            tracing::debug!("Connection from {} dropped: {}", peer_addr, e);
        }
        Err(CtError::Session(SessionError::Cancelled)) => {
            tracing::debug!("Connection from {} cancelled by shutdown", peer_addr);
        }
        Err(e) => {
            tracing::warn!("Connection from {} closed with error: {}", peer_addr, e);
        }
    }
}

/// Turn away a connection when the server is at capacity
pub(crate) async fn reject(socket: TcpStream, peer_addr: SocketAddr) {
    tracing::warn!("Rejecting connection from {}: server busy", peer_addr);

    let mut session = Session::new(socket).with_peer(peer_addr);
    let result = async {
        session.println("Server busy, try again later").await?;
        session.close().await
    }
    .await;
    session.shutdown().await;

    if let Err(e) = result {
        tracing::debug!("Failed to notify {} of rejection: {}", peer_addr, e);
    }
}
