//! Connection manager

mod listener;
mod worker;

pub use listener::Listener;
