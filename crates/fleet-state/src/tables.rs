//! redb table definitions for the node registry.

use redb::TableDefinition;

/// Node records keyed by hostname.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");
