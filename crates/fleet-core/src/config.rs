//! Zone configuration parser.
//!
//! A zone is read once at startup from a TOML document and consulted
//! read-only afterwards.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration: {0:?}")]
    Duration(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Dev,
    Test,
    Staging,
    Perf,
    #[default]
    Prod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemName {
    Dev,
    Cd,
    #[default]
    Main,
    Public,
    PublicCd,
}

/// Capabilities of the cloud hosting a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cloud {
    #[serde(default = "default_cloud_name")]
    pub name: String,
    /// Whether several tenant nodes may share one host.
    #[serde(default)]
    pub allow_host_sharing: bool,
    /// Whether hosts are provisioned on demand.
    #[serde(default)]
    pub dynamic_provisioning: bool,
}

fn default_cloud_name() -> String {
    "default".to_string()
}

impl Default for Cloud {
    fn default() -> Self {
        Self {
            name: default_cloud_name(),
            allow_host_sharing: false,
            dynamic_provisioning: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub system: SystemName,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub cloud: Cloud,
}

fn default_region() -> String {
    "default".to_string()
}

impl Zone {
    pub fn new(environment: Environment, system: SystemName, cloud: Cloud) -> Self {
        Self {
            environment,
            system,
            region: default_region(),
            cloud,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}.{} in {:?} ({})",
            self.environment, self.region, self.system, self.cloud.name
        )
    }
}

/// Top-level document holding a `[zone]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneConfig {
    #[serde(default)]
    pub zone: Zone,
}

impl ZoneConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Parse a duration string like "30s", "5m", "1h" or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let (digits, unit) = match s.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((i, _)) => s.split_at(i),
        None => (s, "s"),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| ConfigError::Duration(s.to_string()))?;
    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(ConfigError::Duration(s.to_string())),
    };
    let secs = value
        .checked_mul(scale)
        .ok_or_else(|| ConfigError::Duration(s.to_string()))?;
    Ok(Duration::from_secs(secs))
}
