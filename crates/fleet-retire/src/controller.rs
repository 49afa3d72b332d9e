//! Retirement controller: moves nodes out of the fleet without losing
//! redundancy.
//!
//! Two passes, each run once per maintenance tick on a fresh read of the
//! registry:
//!
//! - [`RetirementController::retire_unallocated`] parks `ready` nodes the
//!   policy matches, at most a per-flavor quota per tick.
//! - [`RetirementController::retire_allocated`] flags `active` nodes with
//!   `want_to_retire`, within a per-cluster budget. Parking them is left to
//!   [`RetiredParker`](crate::RetiredParker).
//!
//! Writes are version-checked. A node that changed since it was read is
//! skipped for this tick and picked up again on the next one.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use fleet_core::{ApplicationId, Flavor, Hostname};
use fleet_state::{Agent, Node, NodeRegistry, NodeState, StateError, StateResult};

use crate::policy::RetirementPolicy;
use crate::quota::FlavorQuotas;

/// Redundancy used when none is configured.
pub const DEFAULT_REDUNDANCY: usize = 2;

/// Outcome of one [`RetirementController::retire_allocated`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetirementSummary {
    /// Nodes flagged with `want_to_retire` in this pass.
    pub marked: Vec<Hostname>,
    /// Nodes skipped because they changed under us or could not be written.
    pub skipped: Vec<Hostname>,
}

/// Drives retirement of unallocated and allocated nodes.
pub struct RetirementController {
    registry: Arc<dyn NodeRegistry>,
    policy: Arc<dyn RetirementPolicy>,
    redundancy: usize,
    /// Per-flavor cap on allocated nodes flagged in one pass. `None` is unlimited.
    allocated_quotas: Option<FlavorQuotas>,
}

impl RetirementController {
    pub fn new(registry: Arc<dyn NodeRegistry>, policy: Arc<dyn RetirementPolicy>) -> Self {
        Self {
            registry,
            policy,
            redundancy: DEFAULT_REDUNDANCY,
            allocated_quotas: None,
        }
    }

    /// Set the cluster redundancy (see [`allowed_to_retire`]).
    pub fn with_redundancy(mut self, redundancy: usize) -> Self {
        self.redundancy = redundancy;
        self
    }

    pub fn redundancy(&self) -> usize {
        self.redundancy
    }

    /// Cap how many allocated nodes of each flavor one
    /// [`retire_allocated`](Self::retire_allocated) pass may flag.
    pub fn with_allocated_quotas(mut self, quotas: FlavorQuotas) -> Self {
        self.allocated_quotas = Some(quotas);
        self
    }

    // ── Unallocated ────────────────────────────────────────────────

    /// Park `ready` nodes the policy wants retired, at most `quotas` per flavor.
    ///
    /// Nodes of a flavor are taken in hostname order. Each gets
    /// `want_to_deprovision` before being parked.
    ///
    /// Returns `true` when no matching `ready` node is left behind, `false`
    /// when some flavor still has nodes waiting for a later tick.
    pub fn retire_unallocated(&self, quotas: &FlavorQuotas) -> StateResult<bool> {
        let mut candidates: BTreeMap<Flavor, Vec<(Node, String)>> = BTreeMap::new();
        for node in self.registry.nodes_in_state(NodeState::Ready)? {
            if let Some(reason) = self.policy.should_retire(&node) {
                candidates
                    .entry(node.flavor.clone())
                    .or_default()
                    .push((node, reason));
            }
        }

        let mut unfinished_flavors = 0;
        for (flavor, nodes) in candidates {
            let quota = quotas.for_flavor(&flavor);
            let mut parked = 0;
            let mut remaining = Vec::new();

            for (node, reason) in nodes {
                if parked >= quota {
                    remaining.push(node.hostname);
                    continue;
                }
                match self.retire_unallocated_node(&node, &reason) {
                    Ok(()) => parked += 1,
                    Err(e) => {
                        warn!(hostname = %node.hostname, %flavor, error = %e, "skipping unallocated node");
                        remaining.push(node.hostname);
                    }
                }
            }

            info!(%flavor, parked, remaining = remaining.len(), quota, "retired unallocated nodes");
            if !remaining.is_empty() {
                unfinished_flavors += 1;
                info!(
                    %flavor,
                    hosts = %remaining.join(", "),
                    "nodes left for a later tick"
                );
            }
        }

        Ok(unfinished_flavors == 0)
    }

    fn retire_unallocated_node(&self, node: &Node, reason: &str) -> StateResult<()> {
        let flagged = node
            .clone()
            .with_status(node.status.with_want_to_deprovision(true));
        self.registry.write(&flagged)?;
        self.registry.park(&node.hostname, Agent::NodeRetirer, reason)?;
        debug!(hostname = %node.hostname, flavor = %node.flavor, %reason, "parked unallocated node");
        Ok(())
    }

    // ── Allocated ──────────────────────────────────────────────────

    /// Flag retireable `active` nodes with `want_to_retire`.
    ///
    /// Applications are visited largest first (see
    /// [`active_application_ids`](Self::active_application_ids)); within an
    /// application each cluster gets its own budget from
    /// [`allowed_to_retire`]. Nodes of a cluster are taken in hostname order.
    /// With allocated quotas set, a flavor whose quota is used up for this
    /// pass is passed over.
    pub fn retire_allocated(&self) -> StateResult<RetirementSummary> {
        let nodes = self.registry.nodes()?;
        let mut summary = RetirementSummary::default();
        let mut flavor_budget: BTreeMap<Flavor, usize> = BTreeMap::new();

        for application in self.active_application_ids(&nodes) {
            let mut clusters: BTreeMap<&str, Vec<Node>> = BTreeMap::new();
            for node in nodes.iter().filter(|n| n.owner() == Some(&application)) {
                if let Some(cluster) = node.cluster_id() {
                    clusters.entry(cluster).or_default().push(node.clone());
                }
            }

            for (cluster, cluster_nodes) in clusters {
                let retireable = self.retireable_nodes(&cluster_nodes);
                if retireable.is_empty() {
                    continue;
                }
                let allowed = allowed_to_retire(&cluster_nodes, self.redundancy);
                debug!(
                    application = %application,
                    %cluster,
                    retireable = retireable.len(),
                    allowed,
                    "retirement budget"
                );

                let mut marked = 0;
                for node in retireable {
                    if marked >= allowed {
                        break;
                    }
                    let left = match &self.allocated_quotas {
                        Some(quotas) => *flavor_budget
                            .entry(node.flavor.clone())
                            .or_insert_with(|| quotas.for_flavor(&node.flavor)),
                        None => usize::MAX,
                    };
                    if left == 0 {
                        debug!(hostname = %node.hostname, flavor = %node.flavor, "flavor quota used up");
                        continue;
                    }
                    match self.mark_want_to_retire(&node) {
                        Ok(true) => {
                            if let Some(left) = flavor_budget.get_mut(&node.flavor) {
                                *left -= 1;
                            }
                            marked += 1;
                            summary.marked.push(node.hostname);
                        }
                        Ok(false) => {
                            debug!(hostname = %node.hostname, "node no longer retireable");
                            summary.skipped.push(node.hostname);
                        }
                        Err(e @ StateError::Conflict { .. }) => {
                            warn!(hostname = %node.hostname, error = %e, "node changed since read, skipping");
                            summary.skipped.push(node.hostname);
                        }
                        Err(e) => {
                            warn!(hostname = %node.hostname, error = %e, "skipping allocated node");
                            summary.skipped.push(node.hostname);
                        }
                    }
                }
            }
        }

        info!(
            marked = summary.marked.len(),
            skipped = summary.skipped.len(),
            "retire allocated pass done"
        );
        Ok(summary)
    }

    /// Re-read `node` and flag it if it is still an eligible member of the
    /// same application. Returns `false` when it no longer qualifies.
    fn mark_want_to_retire(&self, node: &Node) -> StateResult<bool> {
        let Some(current) = self.registry.node(&node.hostname)? else {
            return Ok(false);
        };
        if current.state != NodeState::Active
            || current.status.want_to_retire
            || current.owner() != node.owner()
        {
            return Ok(false);
        }
        let Some(reason) = self.policy.should_retire(&current) else {
            return Ok(false);
        };

        let flagged = current.clone().with_status(
            current
                .status
                .with_want_to_retire(true)
                .with_want_to_deprovision(true),
        );
        self.registry.write(&flagged)?;
        info!(
            hostname = %current.hostname,
            flavor = %current.flavor,
            application = ?current.owner().map(ApplicationId::short_string),
            %reason,
            "set want to retire"
        );
        Ok(true)
    }

    /// Applications owning active nodes the policy matches, most such nodes
    /// first. Ties keep the order in which applications first appear in
    /// `nodes`.
    pub fn active_application_ids(&self, nodes: &[Node]) -> Vec<ApplicationId> {
        let mut counts: Vec<(ApplicationId, usize)> = Vec::new();
        for node in nodes {
            if node.state != NodeState::Active || self.policy.should_retire(node).is_none() {
                continue;
            }
            let Some(owner) = node.owner() else { continue };
            match counts.iter_mut().find(|(app, _)| app == owner) {
                Some((_, count)) => *count += 1,
                None => counts.push((owner.clone(), 1)),
            }
        }
        // Stable: equal counts keep first-appearance order.
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts.into_iter().map(|(app, _)| app).collect()
    }

    /// Nodes in `nodes` that may be flagged for retirement now: active, not
    /// already retiring, and still matched by the policy.
    pub fn retireable_nodes(&self, nodes: &[Node]) -> Vec<Node> {
        nodes
            .iter()
            .filter(|n| n.state == NodeState::Active)
            .filter(|n| !n.status.want_to_retire)
            .filter(|n| self.policy.should_retire(n).is_some())
            .cloned()
            .collect()
    }
}

/// How many more nodes of one cluster may be flagged for retirement.
///
/// `redundancy` bounds both the number of retirements in flight (flagged but
/// not yet parked) and, from below, the number of active nodes that are not
/// retiring. Parked nodes count towards neither.
pub fn allowed_to_retire(nodes: &[Node], redundancy: usize) -> usize {
    let in_flight = nodes
        .iter()
        .filter(|n| n.status.want_to_retire && n.state != NodeState::Parked)
        .count();
    let serving = nodes.iter().filter(|n| n.is_active_and_serving()).count();

    redundancy
        .saturating_sub(in_flight)
        .min(serving.saturating_sub(redundancy))
}
