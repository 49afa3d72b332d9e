//! fleet-state: the node registry.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage of node records with optimistic, version-checked writes.
//!
//! # Architecture
//!
//! Nodes are JSON-serialized into redb's `&[u8]` value column, keyed by
//! hostname. Every record carries a `version`; [`NodeRegistry::write`]
//! succeeds only when the caller's copy still has the stored version, and
//! the stored version is bumped on each write. Callers re-read instead of
//! holding records across ticks.
//!
//! The `NodeStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across tasks.

pub mod error;
pub mod registry;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use registry::NodeRegistry;
pub use store::NodeStore;
pub use types::*;
