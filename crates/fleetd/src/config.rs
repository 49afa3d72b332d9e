//! `fleetd.toml`: zone, maintenance schedule and retirement policy.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fleet_core::{ConfigError, Zone, parse_duration};
use fleet_retire::{DEFAULT_REDUNDANCY, FlavorQuotas, PolicyConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub zone: Zone,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub retirement: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_retire_interval")]
    pub retire_interval: String,
    #[serde(default = "default_gc_interval")]
    pub gc_interval: String,
    #[serde(default = "default_redundancy")]
    pub redundancy: usize,
    #[serde(default = "default_unallocated_quota")]
    pub unallocated_quota: FlavorQuotas,
    /// Per-flavor cap on allocated nodes flagged per tick. Unlimited when absent.
    #[serde(default)]
    pub allocated_quota: Option<FlavorQuotas>,
}

fn default_retire_interval() -> String {
    "5m".to_string()
}

fn default_gc_interval() -> String {
    "10m".to_string()
}

fn default_redundancy() -> usize {
    DEFAULT_REDUNDANCY
}

fn default_unallocated_quota() -> FlavorQuotas {
    FlavorQuotas::new(1)
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            retire_interval: default_retire_interval(),
            gc_interval: default_gc_interval(),
            redundancy: default_redundancy(),
            unallocated_quota: default_unallocated_quota(),
            allocated_quota: None,
        }
    }
}

impl MaintenanceConfig {
    pub fn retire_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.retire_interval)
    }

    pub fn gc_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.gc_interval)
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        // Fail at startup rather than on the first tick.
        config.maintenance.retire_interval()?;
        config.maintenance.gc_interval()?;
        Ok(config)
    }
}
