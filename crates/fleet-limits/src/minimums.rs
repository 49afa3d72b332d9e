//! Minimum node shapes per zone and cluster type.

use fleet_core::{ClusterType, Environment, StorageType, SystemName, Zone};

/// Disk reserved on every node for the OS and platform processes.
pub const MIN_REAL_DISK_GB: f64 = 6.0;

/// Memory taken by platform processes on every node.
pub const MEMORY_OVERHEAD_GB: f64 = 1.7;

/// Minimum shape for one (zone, cluster type, storage type) combination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimums {
    pub advertised_vcpu: f64,
    pub advertised_memory_gb: f64,
    pub advertised_disk_gb: f64,
    pub real_vcpu: f64,
    pub real_memory_gb: f64,
    pub real_disk_gb: f64,
}

impl Minimums {
    pub fn for_zone(zone: &Zone, cluster_type: ClusterType, storage_type: StorageType) -> Self {
        let advertised_vcpu =
            if zone.environment == Environment::Dev && zone.cloud.allow_host_sharing {
                0.1
            } else {
                0.5
            };

        let advertised_memory_gb = if zone.system == SystemName::Dev {
            // Small containers are fine in dev systems.
            1.0
        } else if cluster_type == ClusterType::Admin {
            2.0
        } else {
            4.0
        };

        let local_on_dynamic =
            storage_type == StorageType::Local && zone.cloud.dynamic_provisioning;
        let advertised_disk_gb = match (local_on_dynamic, zone.system) {
            (true, SystemName::Public) => 10.0 + MIN_REAL_DISK_GB,
            (true, _) => 55.0 + MIN_REAL_DISK_GB,
            (false, _) => 4.0 + MIN_REAL_DISK_GB,
        };

        Self {
            advertised_vcpu,
            advertised_memory_gb,
            advertised_disk_gb,
            real_vcpu: advertised_vcpu,
            real_memory_gb: advertised_memory_gb - MEMORY_OVERHEAD_GB,
            real_disk_gb: MIN_REAL_DISK_GB,
        }
    }
}
