//! Node resource limits for a zone.
//!
//! Consulted synchronously on the allocation path, before a node is bound
//! to a request.

use tracing::debug;

use fleet_core::{ClusterSpec, ClusterType, NodeResources, Zone};

use crate::error::LimitError;
use crate::minimums::Minimums;

/// Validates and adjusts requested node shapes against zone minimums.
#[derive(Debug, Clone)]
pub struct NodeResourceLimits {
    zone: Zone,
}

impl NodeResourceLimits {
    pub fn new(zone: Zone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    /// Minimums applying to `resources` in a cluster of `cluster_type`.
    pub fn minimums(&self, resources: &NodeResources, cluster_type: ClusterType) -> Minimums {
        Minimums::for_zone(&self.zone, cluster_type, resources.storage_type)
    }

    /// Validate the resources an application asks for (advertised space).
    ///
    /// `subject` names what was requested ("node", "group", ...) and is
    /// only used in the error message.
    pub fn ensure_within_advertised_limits(
        &self,
        subject: &str,
        requested: &NodeResources,
        cluster: &ClusterSpec,
    ) -> Result<(), LimitError> {
        if requested.is_unspecified() {
            return Ok(());
        }

        let min = self.minimums(requested, cluster.cluster_type);
        let checks = [
            ("vcpu", "", requested.vcpu, min.advertised_vcpu),
            ("memoryGb", " Gb", requested.memory_gb, min.advertised_memory_gb),
            ("diskGb", " Gb", requested.disk_gb, min.advertised_disk_gb),
        ];
        for (resource, unit, requested, minimum) in checks {
            if requested < minimum {
                return Err(LimitError::BelowMinimum {
                    cluster_type: cluster.cluster_type,
                    cluster_id: cluster.id.clone(),
                    subject: subject.to_string(),
                    resource,
                    unit,
                    requested,
                    minimum,
                });
            }
        }
        Ok(())
    }

    /// Whether the real resources of a candidate node are usable.
    pub fn is_within_real_limits(&self, real: &NodeResources, cluster_type: ClusterType) -> bool {
        if real.is_unspecified() {
            return true;
        }

        let min = self.minimums(real, cluster_type);
        real.vcpu >= min.real_vcpu
            && real.memory_gb >= min.real_memory_gb
            && real.disk_gb >= min.real_disk_gb
    }

    /// Raise every dimension of `requested` to at least its advertised minimum.
    pub fn enlarge_to_legal(
        &self,
        requested: &NodeResources,
        cluster_type: ClusterType,
    ) -> NodeResources {
        if requested.is_unspecified() {
            return *requested;
        }

        let min = self.minimums(requested, cluster_type);
        let legal = requested
            .with_vcpu(requested.vcpu.max(min.advertised_vcpu))
            .with_memory_gb(requested.memory_gb.max(min.advertised_memory_gb))
            .with_disk_gb(requested.disk_gb.max(min.advertised_disk_gb));
        if legal != *requested {
            debug!(%requested, %legal, %cluster_type, "enlarged resources to zone minimum");
        }
        legal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{Cloud, Environment, StorageType, SystemName};

    fn limits(environment: Environment, system: SystemName) -> NodeResourceLimits {
        NodeResourceLimits::new(Zone::new(environment, system, Cloud::default()))
    }

    fn dynamic_limits(system: SystemName) -> NodeResourceLimits {
        NodeResourceLimits::new(Zone::new(
            Environment::Prod,
            system,
            Cloud {
                name: "aws".to_string(),
                allow_host_sharing: false,
                dynamic_provisioning: true,
            },
        ))
    }

    fn resources(vcpu: f64, memory_gb: f64, disk_gb: f64) -> NodeResources {
        NodeResources::new(vcpu, memory_gb, disk_gb, StorageType::Remote)
    }

    fn cluster(cluster_type: ClusterType) -> ClusterSpec {
        ClusterSpec::new(cluster_type, "test")
    }

    #[test]
    fn unspecified_always_passes() {
        let limits = limits(Environment::Prod, SystemName::Main);
        let unspecified = NodeResources::UNSPECIFIED;

        assert!(limits
            .ensure_within_advertised_limits("node", &unspecified, &cluster(ClusterType::Content))
            .is_ok());
        assert!(limits.is_within_real_limits(&unspecified, ClusterType::Content));
        assert_eq!(
            limits.enlarge_to_legal(&unspecified, ClusterType::Content),
            unspecified
        );
    }

    #[test]
    fn explicit_zero_shape_is_validated() {
        let limits = limits(Environment::Prod, SystemName::Main);
        let zero = NodeResources::new(0.0, 0.0, 0.0, StorageType::Any);

        let err = limits
            .ensure_within_advertised_limits("node", &zero, &cluster(ClusterType::Content))
            .unwrap_err();
        assert!(err.to_string().contains("vcpu size is 0.00"));
        assert!(!limits.is_within_real_limits(&zero, ClusterType::Content));
        assert_ne!(limits.enlarge_to_legal(&zero, ClusterType::Content), zero);
    }

    #[test]
    fn admin_memory_below_dev_minimum_fails() {
        let limits = limits(Environment::Prod, SystemName::Dev);
        let err = limits
            .ensure_within_advertised_limits(
                "node",
                &resources(1.0, 0.5, 50.0),
                &cluster(ClusterType::Admin),
            )
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "admin cluster 'test': node memoryGb size is 0.50 Gb but must be at least 1.00 Gb"
        );
    }

    #[test]
    fn non_dev_system_raises_memory_minimum() {
        let limits = limits(Environment::Prod, SystemName::Main);
        let requested = resources(1.0, 1.5, 50.0);

        let admin = limits
            .ensure_within_advertised_limits("node", &requested, &cluster(ClusterType::Admin))
            .unwrap_err();
        assert!(matches!(admin, LimitError::BelowMinimum { minimum, .. } if minimum == 2.0));

        let content = limits
            .ensure_within_advertised_limits("node", &requested, &cluster(ClusterType::Content))
            .unwrap_err();
        assert!(matches!(content, LimitError::BelowMinimum { minimum, .. } if minimum == 4.0));
    }

    #[test]
    fn vcpu_is_checked_first_without_unit() {
        let limits = limits(Environment::Prod, SystemName::Main);
        let err = limits
            .ensure_within_advertised_limits(
                "group",
                &resources(0.25, 0.5, 1.0),
                &cluster(ClusterType::Container),
            )
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "container cluster 'test': group vcpu size is 0.25 but must be at least 0.50"
        );
    }

    #[test]
    fn local_disk_on_dynamic_cloud() {
        let limits = dynamic_limits(SystemName::Main);
        let local = resources(2.0, 8.0, 50.0).with_storage_type(StorageType::Local);

        let err = limits
            .ensure_within_advertised_limits("node", &local, &cluster(ClusterType::Content))
            .unwrap_err();
        assert!(err.to_string().contains("diskGb size is 50.00 Gb but must be at least 61.00 Gb"));

        let remote = local.with_storage_type(StorageType::Remote);
        assert!(limits
            .ensure_within_advertised_limits("node", &remote, &cluster(ClusterType::Content))
            .is_ok());

        let public = dynamic_limits(SystemName::Public);
        assert!(public
            .ensure_within_advertised_limits("node", &local, &cluster(ClusterType::Content))
            .is_ok());
    }

    #[test]
    fn real_limits_allow_overhead() {
        let limits = limits(Environment::Prod, SystemName::Main);

        // 4 Gb advertised leaves about 2.3 Gb real.
        assert!(limits.is_within_real_limits(&resources(0.5, 2.31, 6.0), ClusterType::Content));
        assert!(!limits.is_within_real_limits(&resources(0.5, 2.2, 6.0), ClusterType::Content));
        assert!(!limits.is_within_real_limits(&resources(0.4, 8.0, 6.0), ClusterType::Content));
        assert!(!limits.is_within_real_limits(&resources(0.5, 8.0, 5.9), ClusterType::Content));
    }

    #[test]
    fn enlarge_raises_to_minimums() {
        let limits = limits(Environment::Prod, SystemName::Main);
        let enlarged = limits.enlarge_to_legal(&resources(0.1, 1.0, 1.0), ClusterType::Admin);

        assert_eq!(enlarged, resources(0.5, 2.0, 10.0));
        assert!(limits
            .ensure_within_advertised_limits("node", &enlarged, &cluster(ClusterType::Admin))
            .is_ok());
    }

    #[test]
    fn enlarge_never_lowers_or_alters_legal_shapes() {
        let limits = limits(Environment::Dev, SystemName::Dev);
        let shapes = [
            resources(0.01, 0.1, 0.1),
            resources(0.5, 0.5, 100.0),
            resources(16.0, 0.9, 2.0),
            resources(64.0, 256.0, 1800.0),
        ];

        for cluster_type in [ClusterType::Admin, ClusterType::Container, ClusterType::Content] {
            for shape in shapes {
                let enlarged = limits.enlarge_to_legal(&shape, cluster_type);
                assert!(enlarged.vcpu >= shape.vcpu);
                assert!(enlarged.memory_gb >= shape.memory_gb);
                assert!(enlarged.disk_gb >= shape.disk_gb);
                assert!(limits
                    .ensure_within_advertised_limits("node", &enlarged, &cluster(cluster_type))
                    .is_ok());
                assert_eq!(limits.enlarge_to_legal(&enlarged, cluster_type), enlarged);
            }
        }
    }
}
