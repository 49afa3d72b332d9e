//! fleet-metrics: recent resource utilization per node.
//!
//! Keeps a short, bounded history of per-node utilization samples that
//! autoscaling reads as windows. Long-range history belongs to an external
//! metrics pipeline; here samples older than the retention horizon are
//! dropped by `gc`.
//!
//! # Architecture
//!
//! ```text
//! NodeMetricsDb
//!   ├── add()        ← telemetry ingestion, batches of MetricValue
//!   ├── get_window() → MetricWindow for (since, resource, nodes)
//!   ├── gc()         ← drop samples older than the retention horizon
//!   └── run_gc()     → periodic gc loop
//! ```
//!
//! Ingestion, queries and gc may run concurrently. A query observes some
//! prefix of a concurrently appended batch.

pub mod db;
pub mod types;

pub use db::NodeMetricsDb;
pub use types::{MetricValue, MetricWindow, Resource};
