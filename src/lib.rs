#![forbid(unsafe_code)]

//! `farside` drives a long-lived executor process over line-delimited JSON.
//!
//! The host side ([`host`]) issues requests and holds opaque [`Reference`]s
//! to values that live inside the executor. The executor side ([`executor`])
//! evaluates requests with a small Rust-syntax [`runtime`] and keeps
//! referenced values in a table until the host releases them.

pub mod config;
pub mod errors;
pub mod executor;
pub mod host;
pub mod protocol;
pub mod runtime;

pub use config::BridgeConfig;
pub use errors::{BridgeError, RemoteError, Result};
pub use host::{Arg, Bridge, Pending, Reference};
