//! The registry interface consumed by the fleet controllers.

use fleet_core::ApplicationId;

use crate::error::StateResult;
use crate::types::{Agent, Node, NodeState};

/// Read/write access to node records with compare-and-set semantics.
///
/// Every failure is scoped to the node named in the call.
pub trait NodeRegistry: Send + Sync {
    /// All nodes, ordered by hostname.
    fn nodes(&self) -> StateResult<Vec<Node>>;

    fn node(&self, hostname: &str) -> StateResult<Option<Node>>;

    /// Store a new node. Its version is reset to 0.
    fn add(&self, node: &Node) -> StateResult<Node>;

    /// Replace a node if `node.version` still matches the stored version.
    ///
    /// Returns the stored record with its new version.
    fn write(&self, node: &Node) -> StateResult<Node>;

    /// Move a node to `state` regardless of version, recording who and why.
    fn set_state(
        &self,
        hostname: &str,
        state: NodeState,
        agent: Agent,
        reason: &str,
    ) -> StateResult<Node>;

    fn nodes_in_state(&self, state: NodeState) -> StateResult<Vec<Node>> {
        Ok(self
            .nodes()?
            .into_iter()
            .filter(|n| n.state == state)
            .collect())
    }

    fn nodes_of_application(&self, application: &ApplicationId) -> StateResult<Vec<Node>> {
        Ok(self
            .nodes()?
            .into_iter()
            .filter(|n| n.owner() == Some(application))
            .collect())
    }

    fn park(&self, hostname: &str, agent: Agent, reason: &str) -> StateResult<Node> {
        self.set_state(hostname, NodeState::Parked, agent, reason)
    }

    fn fail(&self, hostname: &str, agent: Agent, reason: &str) -> StateResult<Node> {
        self.set_state(hostname, NodeState::Failed, agent, reason)
    }
}
