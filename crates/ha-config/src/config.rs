use std::collections::HashMap;

use ha_domain::ZoneId;

/// A per-zone boolean setting with a global default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneOverride {
    default: bool,
    zones: HashMap<ZoneId, bool>,
}

impl ZoneOverride {
    pub fn constant(default: bool) -> Self {
        ZoneOverride {
            default,
            zones: HashMap::new(),
        }
    }

    pub fn with_zones(default: bool, zones: HashMap<ZoneId, bool>) -> Self {
        ZoneOverride { default, zones }
    }

    pub fn get(&self, zone: &ZoneId) -> bool {
        self.zones.get(zone).copied().unwrap_or(self.default)
    }
}

/// The coordinator's fully-resolved, typed configuration surface (see the
/// external-interfaces configuration table). Produced by `loader::load_ha_config`
/// from a `RawHaConfig`; every field here has a concrete value, defaults already applied.
#[derive(Debug, Clone)]
pub struct HaConfig {
    pub ha_workers: u32,
    pub time_to_sleep: u64,
    pub migration_max_retries: u32,
    pub time_between_failures: u64,
    pub time_between_cleanup: u64,
    pub stop_retry_interval: u64,
    pub restart_retry_interval: u64,
    pub migrate_retry_interval: u64,
    pub investigate_retry_interval: u64,
    pub force_ha: bool,
    pub vm_ha_enabled: ZoneOverride,
    pub vm_ha_alerts_enabled: ZoneOverride,
    pub instance: String,
    pub ha_tag: Option<String>,
    /// Hypervisor families whose host stack already handles restart; the
    /// restart flow skips HA entirely for VMs on these hosts.
    pub hypervisors_with_host_side_ha: Vec<String>,
}

impl Default for HaConfig {
    fn default() -> Self {
        HaConfig {
            ha_workers: 1,
            time_to_sleep: 60,
            migration_max_retries: 5,
            time_between_failures: 3600,
            time_between_cleanup: 86400,
            stop_retry_interval: 120,
            restart_retry_interval: 600,
            migrate_retry_interval: 300,
            investigate_retry_interval: 60,
            force_ha: false,
            vm_ha_enabled: ZoneOverride::constant(true),
            vm_ha_alerts_enabled: ZoneOverride::constant(true),
            instance: "HACOORD".to_string(),
            ha_tag: None,
            hypervisors_with_host_side_ha: Vec::new(),
        }
    }
}

impl HaConfig {
    pub fn vm_ha_enabled(&self, zone: &ZoneId) -> bool {
        self.vm_ha_enabled.get(zone)
    }

    pub fn vm_ha_alerts_enabled(&self, zone: &ZoneId) -> bool {
        self.vm_ha_alerts_enabled.get(zone)
    }

    pub fn has_host_side_ha(&self, hypervisor: &str) -> bool {
        self.hypervisors_with_host_side_ha
            .iter()
            .any(|h| h.eq_ignore_ascii_case(hypervisor))
    }
}
