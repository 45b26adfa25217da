//! # Realm Server
//!
//! Headless host for the Realm simulation core.
//!
//! Owns the [`World`](realm_core::world::World), feeds it client intents
//! from an ingress queue, advances it on a fixed period and publishes the
//! resulting events. The transport in front of it speaks the JSON-lines
//! [`protocol`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod driver;
pub mod error;
pub mod protocol;

pub use config::ServerConfig;
pub use driver::{run, Server};
pub use error::{Result, ServerError};
pub use protocol::{Command, Response};
