//! Periodic driver for the retirement passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::controller::{RetirementController, RetirementSummary};
use crate::parker::RetiredParker;
use crate::quota::FlavorQuotas;

/// Result of one maintenance tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// No unallocated node matching the policy was left in `ready`.
    pub unallocated_done: bool,
    pub allocated: RetirementSummary,
    pub parked: usize,
    /// Passes that failed as a whole, e.g. because the registry could not be read.
    pub failed_passes: Vec<&'static str>,
}

/// Runs unallocated retirement, allocated retirement, and parking in turn.
pub struct RetirementMaintainer {
    controller: Arc<RetirementController>,
    parker: RetiredParker,
    quotas: FlavorQuotas,
}

impl RetirementMaintainer {
    pub fn new(
        controller: Arc<RetirementController>,
        parker: RetiredParker,
        quotas: FlavorQuotas,
    ) -> Self {
        Self {
            controller,
            parker,
            quotas,
        }
    }

    /// One maintenance pass. A failing step is logged and the next one
    /// still runs.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        match self.controller.retire_unallocated(&self.quotas) {
            Ok(done) => report.unallocated_done = done,
            Err(e) => {
                warn!(error = %e, "retire unallocated failed");
                report.failed_passes.push("retire_unallocated");
            }
        }
        match self.controller.retire_allocated() {
            Ok(summary) => report.allocated = summary,
            Err(e) => {
                warn!(error = %e, "retire allocated failed");
                report.failed_passes.push("retire_allocated");
            }
        }
        match self.parker.run_once() {
            Ok(parked) => report.parked = parked,
            Err(e) => {
                warn!(error = %e, "parking retired nodes failed");
                report.failed_passes.push("park_retired");
            }
        }
        report
    }

    /// Tick every `interval` until shutdown signal.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            redundancy = self.controller.redundancy(),
            "retirement maintainer started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let report = self.tick();
                    info!(
                        unallocated_done = report.unallocated_done,
                        marked = report.allocated.marked.len(),
                        parked = report.parked,
                        failed = ?report.failed_passes,
                        "retirement tick"
                    );
                }
                _ = shutdown.changed() => {
                    info!("retirement maintainer shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use fleet_core::{ApplicationId, ClusterSpec, ClusterType, Flavor};
    use fleet_state::{
        Agent, Allocation, Node, NodeRegistry, NodeState, NodeStore, StateError, StateResult,
    };

    use crate::policy::FlavorRetirement;

    fn maintainer(store: &Arc<NodeStore>) -> RetirementMaintainer {
        let policy = Arc::new(FlavorRetirement::new([Flavor::new("old")]));
        let controller = Arc::new(RetirementController::new(store.clone(), policy));
        RetirementMaintainer::new(
            controller,
            RetiredParker::new(store.clone()),
            FlavorQuotas::new(1),
        )
    }

    fn active(hostname: &str, flavor: &str) -> Node {
        Node::new(hostname, Flavor::new(flavor))
            .with_state(NodeState::Active)
            .with_allocation(Allocation::new(
                ApplicationId::new("tenant", "app"),
                ClusterSpec::new(ClusterType::Content, "storage"),
            ))
    }

    #[test]
    fn ticks_drain_old_flavor_without_losing_redundancy() {
        let store = Arc::new(NodeStore::open_in_memory().unwrap());
        for i in 0..3 {
            store.add(&active(&format!("old{i}"), "old")).unwrap();
        }
        for i in 0..2 {
            store.add(&active(&format!("new{i}"), "new")).unwrap();
        }
        store
            .add(&Node::new("spare", Flavor::new("old")).with_state(NodeState::Ready))
            .unwrap();
        let maintainer = maintainer(&store);

        let mut ticks = 0;
        while store
            .nodes()
            .unwrap()
            .iter()
            .any(|n| n.flavor.name() == "old" && n.state != NodeState::Parked)
        {
            let report = maintainer.tick();
            assert!(report.unallocated_done);
            assert!(report.failed_passes.is_empty());
            let serving = store
                .nodes_in_state(NodeState::Active)
                .unwrap()
                .iter()
                .filter(|n| n.is_active_and_serving())
                .count();
            assert!(serving >= 2);
            ticks += 1;
            assert!(ticks < 10, "retirement did not converge");
        }

        let active = store.nodes_in_state(NodeState::Active).unwrap();
        let hostnames: Vec<&str> = active.iter().map(|n| n.hostname.as_str()).collect();
        assert_eq!(hostnames, vec!["new0", "new1"]);
    }

    /// Registry whose first full read fails.
    struct FlakyRead {
        inner: Arc<NodeStore>,
        reads: AtomicUsize,
    }

    impl NodeRegistry for FlakyRead {
        fn nodes(&self) -> StateResult<Vec<Node>> {
            if self.reads.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(StateError::NotFound("registry unavailable".to_string()));
            }
            self.inner.nodes()
        }

        fn node(&self, hostname: &str) -> StateResult<Option<Node>> {
            self.inner.node(hostname)
        }

        fn add(&self, node: &Node) -> StateResult<Node> {
            self.inner.add(node)
        }

        fn write(&self, node: &Node) -> StateResult<Node> {
            self.inner.write(node)
        }

        fn set_state(
            &self,
            hostname: &str,
            state: NodeState,
            agent: Agent,
            reason: &str,
        ) -> StateResult<Node> {
            self.inner.set_state(hostname, state, agent, reason)
        }
    }

    #[test]
    fn failed_step_does_not_stop_the_tick() {
        let store = Arc::new(NodeStore::open_in_memory().unwrap());
        for i in 0..5 {
            store.add(&active(&format!("old{i}"), "old")).unwrap();
        }
        let registry = Arc::new(FlakyRead {
            inner: store.clone(),
            reads: AtomicUsize::new(0),
        });
        let policy = Arc::new(FlavorRetirement::new([Flavor::new("old")]));
        let controller = Arc::new(RetirementController::new(registry.clone(), policy));
        let maintainer =
            RetirementMaintainer::new(controller, RetiredParker::new(registry), FlavorQuotas::new(1));

        let report = maintainer.tick();
        assert_eq!(report.failed_passes, vec!["retire_unallocated"]);
        assert_eq!(report.allocated.marked, vec!["old0", "old1"]);
        assert_eq!(report.parked, 2);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let store = Arc::new(NodeStore::open_in_memory().unwrap());
        let maintainer = Arc::new(maintainer(&store));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let maintainer = maintainer.clone();
            tokio::spawn(async move { maintainer.run(Duration::from_secs(3600), rx).await })
        };
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
