//! Shared node and cluster types used across fleet crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hostname of a node; the registry key.
pub type Hostname = String;

/// Identifies the owner of an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId {
    pub tenant: String,
    pub application: String,
    pub instance: String,
}

impl ApplicationId {
    pub fn new(tenant: &str, application: &str) -> Self {
        Self::with_instance(tenant, application, "default")
    }

    pub fn with_instance(tenant: &str, application: &str, instance: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            application: application.to_string(),
            instance: instance.to_string(),
        }
    }

    /// `tenant.application`, with `.instance` appended unless it is `default`.
    pub fn short_string(&self) -> String {
        if self.instance == "default" {
            format!("{}.{}", self.tenant, self.application)
        } else {
            format!("{}.{}.{}", self.tenant, self.application, self.instance)
        }
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.tenant, self.application, self.instance)
    }
}

/// Hardware class of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flavor(String);

impl Flavor {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Flavor {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Resources ─────────────────────────────────────────────────────

/// Kind of disk backing a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// No preference.
    #[default]
    Any,
    Local,
    Remote,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageType::Any => "any",
            StorageType::Local => "local",
            StorageType::Remote => "remote",
        })
    }
}

/// A node resource shape.
///
/// [`NodeResources::UNSPECIFIED`] means "use the host default"; every limit
/// check treats it as legal. It is distinct from any explicit shape,
/// including an explicit all-zero one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeResources {
    pub vcpu: f64,
    pub memory_gb: f64,
    pub disk_gb: f64,
    #[serde(default)]
    pub storage_type: StorageType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    unspecified: bool,
}

impl NodeResources {
    pub const UNSPECIFIED: NodeResources = NodeResources {
        vcpu: 0.0,
        memory_gb: 0.0,
        disk_gb: 0.0,
        storage_type: StorageType::Any,
        unspecified: true,
    };

    pub fn new(vcpu: f64, memory_gb: f64, disk_gb: f64, storage_type: StorageType) -> Self {
        Self {
            vcpu,
            memory_gb,
            disk_gb,
            storage_type,
            unspecified: false,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        self.unspecified
    }

    // Setting any dimension makes the shape explicit.

    pub fn with_vcpu(self, vcpu: f64) -> Self {
        Self {
            vcpu,
            unspecified: false,
            ..self
        }
    }

    pub fn with_memory_gb(self, memory_gb: f64) -> Self {
        Self {
            memory_gb,
            unspecified: false,
            ..self
        }
    }

    pub fn with_disk_gb(self, disk_gb: f64) -> Self {
        Self {
            disk_gb,
            unspecified: false,
            ..self
        }
    }

    pub fn with_storage_type(self, storage_type: StorageType) -> Self {
        Self {
            storage_type,
            unspecified: false,
            ..self
        }
    }
}

impl Default for NodeResources {
    fn default() -> Self {
        Self::UNSPECIFIED
    }
}

impl fmt::Display for NodeResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unspecified() {
            return f.write_str("[unspecified]");
        }
        write!(
            f,
            "[vcpu: {:.1}, memory: {:.1} Gb, disk {:.1} Gb, storage type: {}]",
            self.vcpu, self.memory_gb, self.disk_gb, self.storage_type
        )
    }
}

// ── Clusters ──────────────────────────────────────────────────────

/// Role of a cluster within an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    Admin,
    Container,
    Content,
    Combined,
}

impl ClusterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::Admin => "admin",
            ClusterType::Container => "container",
            ClusterType::Content => "content",
            ClusterType::Combined => "combined",
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClusterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(ClusterType::Admin),
            "container" => Ok(ClusterType::Container),
            "content" => Ok(ClusterType::Content),
            "combined" => Ok(ClusterType::Combined),
            other => Err(format!("unknown cluster type: {other}")),
        }
    }
}

/// A cluster as declared by an application deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub cluster_type: ClusterType,
    pub id: String,
    #[serde(default)]
    pub resources: NodeResources,
}

impl ClusterSpec {
    pub fn new(cluster_type: ClusterType, id: &str) -> Self {
        Self {
            cluster_type,
            id: id.to_string(),
            resources: NodeResources::UNSPECIFIED,
        }
    }

    pub fn with_resources(self, resources: NodeResources) -> Self {
        Self { resources, ..self }
    }
}
