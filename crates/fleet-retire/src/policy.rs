//! Retirement policies: which nodes an operator wants out of the fleet.
//!
//! A policy is a predicate over a node snapshot that also says why. Policies
//! compose with [`AnyOf`]; closures of the right shape are policies too.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use fleet_core::Flavor;
use fleet_state::Node;

/// Decides whether a node should be retired.
pub trait RetirementPolicy: Send + Sync {
    /// The reason to retire `node`, or `None` to keep it.
    fn should_retire(&self, node: &Node) -> Option<String>;
}

impl<F> RetirementPolicy for F
where
    F: Fn(&Node) -> Option<String> + Send + Sync,
{
    fn should_retire(&self, node: &Node) -> Option<String> {
        self(node)
    }
}

/// Retire every node of a deprecated flavor.
#[derive(Debug, Clone)]
pub struct FlavorRetirement {
    flavors: BTreeSet<Flavor>,
}

impl FlavorRetirement {
    pub fn new(flavors: impl IntoIterator<Item = Flavor>) -> Self {
        Self {
            flavors: flavors.into_iter().collect(),
        }
    }
}

impl RetirementPolicy for FlavorRetirement {
    fn should_retire(&self, node: &Node) -> Option<String> {
        self.flavors
            .contains(&node.flavor)
            .then(|| format!("flavor {} is retired", node.flavor))
    }
}

/// Retire nodes holding an address in a range being migrated away from.
#[derive(Debug, Clone)]
pub struct IpPrefixRetirement {
    prefixes: Vec<String>,
}

impl IpPrefixRetirement {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }
}

impl RetirementPolicy for IpPrefixRetirement {
    fn should_retire(&self, node: &Node) -> Option<String> {
        node.ip_addresses.iter().find_map(|ip| {
            self.prefixes
                .iter()
                .find(|p| ip.starts_with(p.as_str()))
                .map(|p| format!("address {ip} is in retired range {p}"))
        })
    }
}

/// Retire a node if any member policy says so. The first reason wins.
#[derive(Default)]
pub struct AnyOf {
    policies: Vec<Box<dyn RetirementPolicy>>,
}

impl AnyOf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy: impl RetirementPolicy + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl RetirementPolicy for AnyOf {
    fn should_retire(&self, node: &Node) -> Option<String> {
        self.policies.iter().find_map(|p| p.should_retire(node))
    }
}

/// Declarative policy, as read from the `[retirement]` config table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub retired_flavors: Vec<String>,
    #[serde(default)]
    pub retired_ip_prefixes: Vec<String>,
}

impl PolicyConfig {
    /// Build the composed policy. An empty config retires nothing.
    pub fn build(&self) -> AnyOf {
        let mut policy = AnyOf::new();
        if !self.retired_flavors.is_empty() {
            policy = policy.with(FlavorRetirement::new(
                self.retired_flavors.iter().map(|f| Flavor::new(f)),
            ));
        }
        if !self.retired_ip_prefixes.is_empty() {
            policy = policy.with(IpPrefixRetirement::new(self.retired_ip_prefixes.clone()));
        }
        policy
    }
}
