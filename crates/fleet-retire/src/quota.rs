//! Per-flavor retirement quotas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use fleet_core::Flavor;

/// Maximum number of nodes of each flavor that may be retired in one tick.
///
/// Flavors without an explicit entry use `default`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorQuotas {
    #[serde(default)]
    pub default: usize,
    #[serde(flatten)]
    pub per_flavor: BTreeMap<Flavor, usize>,
}

impl FlavorQuotas {
    pub fn new(default: usize) -> Self {
        Self {
            default,
            per_flavor: BTreeMap::new(),
        }
    }

    pub fn with(mut self, flavor: Flavor, quota: usize) -> Self {
        self.per_flavor.insert(flavor, quota);
        self
    }

    pub fn for_flavor(&self, flavor: &Flavor) -> usize {
        self.per_flavor.get(flavor).copied().unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_entries_override_default() {
        let quotas = FlavorQuotas::new(1).with(Flavor::new("big"), 5);
        assert_eq!(quotas.for_flavor(&Flavor::new("big")), 5);
        assert_eq!(quotas.for_flavor(&Flavor::new("small")), 1);
    }

    #[test]
    fn parses_flattened_toml_table() {
        let quotas: FlavorQuotas = toml::from_str(
            r#"
default = 2
"d-2-8-50" = 6
"#,
        )
        .unwrap();
        assert_eq!(quotas.default, 2);
        assert_eq!(quotas.for_flavor(&Flavor::new("d-2-8-50")), 6);
    }
}
