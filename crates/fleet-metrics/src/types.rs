//! Sample and window types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A resource whose utilization is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Cpu,
    Memory,
    Disk,
}

impl Resource {
    /// Map a telemetry metric name to the resource it measures.
    pub fn from_metric(name: &str) -> Option<Self> {
        match name {
            "cpu.util" => Some(Resource::Cpu),
            "mem.util" | "memory.util" => Some(Resource::Memory),
            "disk.util" => Some(Resource::Disk),
            _ => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Cpu => "cpu",
            Resource::Memory => "memory",
            Resource::Disk => "disk",
        })
    }
}

/// One utilization sample from one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub hostname: String,
    /// Telemetry metric name, e.g. `cpu.util`.
    pub name: String,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    pub value: f64,
}

impl MetricValue {
    pub fn new(hostname: &str, name: &str, timestamp: u64, value: f64) -> Self {
        Self {
            hostname: hostname.to_string(),
            name: name.to_string(),
            timestamp,
            value,
        }
    }
}

/// Aggregate of the samples inside a query window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricWindow {
    pub measurement_count: usize,
    /// Mean sample value, 0.0 when the window is empty.
    pub average: f64,
}

impl MetricWindow {
    pub fn is_empty(&self) -> bool {
        self.measurement_count == 0
    }
}
