//! Fleet node retirement: drain nodes the operator wants gone without
//! dropping any cluster below its redundancy.
//!
//! # Components
//!
//! - **`policy`**: Which nodes to retire (flavor, address range, closures)
//! - **`quota`**: Per-flavor limit on unallocated nodes parked per tick
//! - **`controller`**: Retirement of unallocated and allocated nodes
//! - **`parker`**: Parks flagged nodes once their cluster can spare them
//! - **`maintainer`**: Periodic driver for all of the above

pub mod controller;
pub mod maintainer;
pub mod parker;
pub mod policy;
pub mod quota;

pub use controller::{
    DEFAULT_REDUNDANCY, RetirementController, RetirementSummary, allowed_to_retire,
};
pub use maintainer::{RetirementMaintainer, TickReport};
pub use parker::RetiredParker;
pub use policy::{AnyOf, FlavorRetirement, IpPrefixRetirement, PolicyConfig, RetirementPolicy};
pub use quota::FlavorQuotas;
