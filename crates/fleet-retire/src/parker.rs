//! Completes allocated retirements by parking flagged nodes once their
//! cluster can spare them.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use fleet_core::ApplicationId;
use fleet_state::{Agent, Node, NodeRegistry, NodeState, StateResult};

use crate::controller::DEFAULT_REDUNDANCY;

/// Parks active `want_to_retire` nodes while their cluster keeps at least
/// `redundancy` active nodes that are not retiring.
pub struct RetiredParker {
    registry: Arc<dyn NodeRegistry>,
    redundancy: usize,
}

impl RetiredParker {
    pub fn new(registry: Arc<dyn NodeRegistry>) -> Self {
        Self {
            registry,
            redundancy: DEFAULT_REDUNDANCY,
        }
    }

    pub fn with_redundancy(mut self, redundancy: usize) -> Self {
        self.redundancy = redundancy;
        self
    }

    /// Park what can be parked now. Returns the number of nodes parked.
    ///
    /// A node that cannot be parked is left for a later tick.
    pub fn run_once(&self) -> StateResult<usize> {
        let mut clusters: BTreeMap<(ApplicationId, String), Vec<Node>> = BTreeMap::new();
        for node in self.registry.nodes_in_state(NodeState::Active)? {
            if let (Some(owner), Some(cluster)) = (node.owner(), node.cluster_id()) {
                let key = (owner.clone(), cluster.to_string());
                clusters.entry(key).or_default().push(node);
            }
        }

        let mut parked = 0;
        for ((application, cluster), nodes) in clusters {
            let serving = nodes.iter().filter(|n| n.is_active_and_serving()).count();
            let retiring: Vec<&Node> = nodes.iter().filter(|n| n.status.want_to_retire).collect();
            if retiring.is_empty() {
                continue;
            }
            if serving < self.redundancy {
                debug!(
                    application = %application,
                    %cluster,
                    serving,
                    waiting = retiring.len(),
                    "cluster below redundancy, not parking"
                );
                continue;
            }
            for node in retiring {
                match self
                    .registry
                    .park(&node.hostname, Agent::Retirer, "retirement completed")
                {
                    Ok(_) => {
                        parked += 1;
                        info!(hostname = %node.hostname, application = %application, %cluster, "parked retired node");
                    }
                    Err(e) => {
                        warn!(hostname = %node.hostname, error = %e, "failed to park retired node");
                    }
                }
            }
        }
        Ok(parked)
    }
}
