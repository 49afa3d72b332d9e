//! Domain types for the node registry.
//!
//! A [`Node`] is an owned snapshot. Components read snapshots, derive a
//! modified copy with the `with_*` builders, and submit it back through
//! [`NodeRegistry::write`](crate::NodeRegistry::write) carrying the version
//! they read.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use fleet_core::{ApplicationId, ClusterSpec, Flavor, Hostname, NodeResources};

// ── Lifecycle ─────────────────────────────────────────────────────

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Provisioned,
    Ready,
    Reserved,
    Active,
    Inactive,
    Failed,
    Parked,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Provisioned => "provisioned",
            NodeState::Ready => "ready",
            NodeState::Reserved => "reserved",
            NodeState::Active => "active",
            NodeState::Inactive => "inactive",
            NodeState::Failed => "failed",
            NodeState::Parked => "parked",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable status flags of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeStatus {
    /// The node should be moved off its allocation.
    #[serde(default)]
    pub want_to_retire: bool,
    /// The node should be removed from the fleet once retired.
    #[serde(default)]
    pub want_to_deprovision: bool,
}

impl NodeStatus {
    pub fn with_want_to_retire(self, want_to_retire: bool) -> Self {
        Self {
            want_to_retire,
            ..self
        }
    }

    pub fn with_want_to_deprovision(self, want_to_deprovision: bool) -> Self {
        Self {
            want_to_deprovision,
            ..self
        }
    }
}

/// Who caused a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agent {
    System,
    Operator,
    Application,
    /// Retirement of unallocated nodes.
    NodeRetirer,
    /// Completion of allocated retirements.
    Retirer,
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub state: NodeState,
    pub agent: Agent,
    pub reason: String,
    /// Unix timestamp (seconds).
    pub at: u64,
}

// ── Node ──────────────────────────────────────────────────────────

/// Assignment of a node to an application cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub owner: ApplicationId,
    pub cluster: ClusterSpec,
    pub resources: NodeResources,
}

impl Allocation {
    pub fn new(owner: ApplicationId, cluster: ClusterSpec) -> Self {
        let resources = cluster.resources;
        Self {
            owner,
            cluster,
            resources,
        }
    }
}

/// A node record as stored in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub hostname: Hostname,
    pub flavor: Flavor,
    pub state: NodeState,
    #[serde(default)]
    pub allocation: Option<Allocation>,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub ip_addresses: BTreeSet<String>,
    /// Generation stamp for optimistic writes. Assigned by the registry.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
}

impl Node {
    /// A freshly provisioned, unallocated node.
    pub fn new(hostname: &str, flavor: Flavor) -> Self {
        Self {
            hostname: hostname.to_string(),
            flavor,
            state: NodeState::Provisioned,
            allocation: None,
            status: NodeStatus::default(),
            ip_addresses: BTreeSet::new(),
            version: 0,
            history: Vec::new(),
        }
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_allocation(mut self, allocation: Allocation) -> Self {
        self.allocation = Some(allocation);
        self
    }

    pub fn with_ip_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ip_addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Owning application, if allocated.
    pub fn owner(&self) -> Option<&ApplicationId> {
        self.allocation.as_ref().map(|a| &a.owner)
    }

    /// Cluster id within the owning application, if allocated.
    pub fn cluster_id(&self) -> Option<&str> {
        self.allocation.as_ref().map(|a| a.cluster.id.as_str())
    }

    /// Active and not on its way out.
    pub fn is_active_and_serving(&self) -> bool {
        self.state == NodeState::Active && !self.status.want_to_retire
    }

    /// The most recent state change, if any.
    pub fn last_event(&self) -> Option<&HistoryEvent> {
        self.history.last()
    }
}
