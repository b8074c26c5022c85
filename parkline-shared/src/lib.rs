//! # Parkline Shared Library
//!
//! This crate contains the connection, delivery and presence-tracking layer
//! shared by the Parkline worker and generator processes.
//!
//! ## Module Organization
//!
//! - `connector`: Bounded exponential backoff for broker and store connections
//! - `messaging`: Broker connection, event publisher and event consumer
//! - `presence`: Presence sets and timed hashes on top of the key/value store
//! - `events`: Entry/exit domain events and their JSON wire format
//! - `config`: Configuration loaded from the environment
//! - `telemetry`: Tracing subscriber setup and the injected `Logger`
//! - `fatal`: Severity classification and the top-level fatal policy
//! - `context`: Per-call cancellation and timeouts

pub mod config;
pub mod connector;
pub mod context;
pub mod events;
pub mod fatal;
pub mod messaging;
pub mod presence;
pub mod telemetry;

pub use connector::{BackoffPolicy, ConnectError, OnExhausted, ResilientConnector};
pub use context::{CallContext, Interrupted};
pub use fatal::{FatalPolicy, Severity};
pub use telemetry::Logger;

/// Current version of the Parkline shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
