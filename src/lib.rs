// src/lib.rs
//! Bridges a live chat document to a local JSON-RPC tool service.
//!
//! The [`watcher`] observes the host through [`host::ChangeFeed`], the
//! [`bridge`] extracts tool calls, sends them with the [`client`], writes the
//! results back through the [`injector`] and optionally submits them. The
//! [`importer`] turns the service's tool catalog into host declarations.

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod extractor;
pub mod host;
pub mod importer;
pub mod injector;
pub mod logging;
pub mod protocol;
pub mod settings;
pub mod watcher;

pub use bridge::{Bridge, CallOutcome};
pub use error::{BridgeError, ProtocolError, RpcError, TransportError};
