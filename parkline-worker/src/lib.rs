//! # Parkline Worker Library
//!
//! Message handlers and traffic generation for the Parkline pipeline. The
//! `parkline-worker` binary wires the handlers to the entry and exit queues;
//! `parkline-generator` publishes synthetic traffic for it to consume.
//!
//! ## Modules
//!
//! - `config`: Queue names, policies and generator settings
//! - `handlers`: Entry/exit handlers that maintain presence state
//! - `generator`: Synthetic entry/exit event generator
//!
//! ## Example
//!
//! ```no_run
//! use parkline_shared::presence::{MemoryStore, PresenceTracker};
//! use parkline_shared::telemetry::Logger;
//! use parkline_worker::handlers::EntryHandler;
//! use std::sync::Arc;
//!
//! let tracker = Arc::new(PresenceTracker::new(MemoryStore::new(), Logger::disabled()));
//! let handler = EntryHandler::new(tracker, "vehicles_parked", Logger::new("entry"));
//! # drop(handler);
//! ```

pub mod config;
pub mod generator;
pub mod handlers;
