//! Fleet resource limits: zone-dependent minimum node shapes.
//!
//! Validates the node resources applications ask for before anything is
//! allocated. Limits exist in two spaces:
//!
//! - **advertised**: the shape a tenant requests
//! - **real**: what remains on the node after fixed platform overhead
//!
//! # Components
//!
//! - **`minimums`**: Pure table of minimums keyed by zone and cluster type
//! - **`limits`**: `NodeResourceLimits`, which validates and enlarges shapes
//!
//! An unspecified shape ([`NodeResources::UNSPECIFIED`](fleet_core::NodeResources::UNSPECIFIED))
//! defers to the host default and passes every check.

pub mod error;
pub mod limits;
pub mod minimums;

pub use error::LimitError;
pub use limits::NodeResourceLimits;
pub use minimums::Minimums;
