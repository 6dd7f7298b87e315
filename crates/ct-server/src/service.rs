//! Per-connection service hook

use async_trait::async_trait;

use ct_core::CtError;

use crate::session::Session;

/// Behaviour run once for every accepted connection
///
/// The worker owns the transport: it shuts the session down after
/// `service` returns, whether it succeeded or failed, so implementations
/// only need to emit the close frame when they want the client to exit.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Drive one session to completion
    async fn service(&self, session: &mut Session) -> Result<(), CtError>;
}
