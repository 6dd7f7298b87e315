//! ct-server: ctlterm session server
//!
//! The server accepts TCP connections and runs one worker per connection.
//! Each worker wraps its socket in a [`Session`] and hands it to the
//! configured [`Service`], which drives the remote terminal through the
//! session's protocol operations.

pub mod demo;
pub mod server;
pub mod service;
pub mod session;

pub use server::Listener;
pub use service::Service;
pub use session::{Session, SessionOptions, Transport};
