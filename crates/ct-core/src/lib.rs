//! ct-core: Core abstractions and configuration for ctlterm
//!
//! This crate provides the error taxonomy, configuration structures and the
//! challenge-response primitives shared by the server and the client.

pub mod auth;
pub mod config;
pub mod error;

pub use auth::{Challenge, PublicKey, SecretKey, Signer, Verifier};
pub use error::{ConnectionError, CtError, SessionError};
