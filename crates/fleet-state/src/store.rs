//! NodeStore: redb-backed node registry.
//!
//! All values are JSON-serialized into redb's `&[u8]` value column. The
//! version check and the update of a node happen inside one redb write
//! transaction, so two writers holding the same snapshot cannot both win.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, Table};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::registry::NodeRegistry;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe node registry backed by redb.
#[derive(Clone)]
pub struct NodeStore {
    db: Arc<Database>,
}

impl NodeStore {
    /// Open (or create) a persistent registry at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "node store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory registry (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory node store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Read-modify-write of one node inside a single write transaction.
    fn update<F>(&self, hostname: &str, f: F) -> StateResult<Node>
    where
        F: FnOnce(Node) -> StateResult<Node>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            let current = get_in(&table, hostname)?
                .ok_or_else(|| StateError::NotFound(hostname.to_string()))?;
            let version = current.version;
            let mut next = f(current.clone())?;
            check_transition(&current, &next)?;
            next.version = version + 1;
            put_in(&mut table, &next)?;
            stored = next;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(stored)
    }
}

impl NodeRegistry for NodeStore {
    fn nodes(&self) -> StateResult<Vec<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let node: Node =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(node);
        }
        Ok(results)
    }

    fn node(&self, hostname: &str) -> StateResult<Option<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        match table.get(hostname).map_err(map_err!(Read))? {
            Some(guard) => {
                let node: Node =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    fn add(&self, node: &Node) -> StateResult<Node> {
        let mut stored = node.clone();
        stored.version = 0;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            if get_in(&table, &node.hostname)?.is_some() {
                return Err(StateError::AlreadyExists(node.hostname.clone()));
            }
            put_in(&mut table, &stored)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(hostname = %node.hostname, flavor = %node.flavor, "node added");
        Ok(stored)
    }

    fn write(&self, node: &Node) -> StateResult<Node> {
        let stored = self.update(&node.hostname, |current| {
            if current.version != node.version {
                return Err(StateError::Conflict {
                    hostname: node.hostname.clone(),
                    expected: node.version,
                    actual: current.version,
                });
            }
            Ok(node.clone())
        })?;
        debug!(hostname = %stored.hostname, version = stored.version, "node written");
        Ok(stored)
    }

    fn set_state(
        &self,
        hostname: &str,
        state: NodeState,
        agent: Agent,
        reason: &str,
    ) -> StateResult<Node> {
        let stored = self.update(hostname, |mut node| {
            node.state = state;
            node.history.push(HistoryEvent {
                state,
                agent,
                reason: reason.to_string(),
                at: epoch_secs(),
            });
            Ok(node)
        })?;
        debug!(%hostname, %state, ?agent, %reason, "node moved");
        Ok(stored)
    }
}

fn get_in(
    table: &Table<'_, &'static str, &'static [u8]>,
    hostname: &str,
) -> StateResult<Option<Node>> {
    match table.get(hostname).map_err(map_err!(Read))? {
        Some(guard) => {
            let node: Node =
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(node))
        }
        None => Ok(None),
    }
}

fn put_in(table: &mut Table<'_, &'static str, &'static [u8]>, node: &Node) -> StateResult<()> {
    let value = serde_json::to_vec(node).map_err(map_err!(Serialize))?;
    table
        .insert(node.hostname.as_str(), value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

/// Reject writes that would undo a retirement.
fn check_transition(current: &Node, next: &Node) -> StateResult<()> {
    let illegal = |reason| StateError::IllegalTransition {
        hostname: current.hostname.clone(),
        from: current.state,
        to: next.state,
        reason,
    };
    if next.state == NodeState::Ready
        && current.state != NodeState::Ready
        && (current.status.want_to_deprovision || next.status.want_to_deprovision)
    {
        return Err(illegal("node is marked for deprovisioning"));
    }
    if current.status.want_to_deprovision && !next.status.want_to_deprovision {
        return Err(illegal("deprovisioning cannot be revoked"));
    }
    if current.state == NodeState::Parked && next.state == NodeState::Active {
        return Err(illegal("parked nodes cannot be reactivated"));
    }
    Ok(())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
