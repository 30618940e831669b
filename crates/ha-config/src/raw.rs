use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw YAML representation of the coordinator's configuration file.
/// Every field is optional so that a partial or empty document still parses;
/// `loader::convert` fills in the documented defaults.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawHaConfig {
    pub ha_workers: Option<u32>,
    pub time_to_sleep: Option<u64>,
    #[serde(alias = "max_retries")]
    pub migration_max_retries: Option<u32>,
    pub time_between_failures: Option<u64>,
    pub time_between_cleanup: Option<u64>,
    pub stop_retry_interval: Option<u64>,
    pub restart_retry_interval: Option<u64>,
    pub migrate_retry_interval: Option<u64>,
    pub investigate_retry_interval: Option<u64>,
    pub force_ha: Option<bool>,
    pub vm_ha_enabled: Option<RawZoneOverride>,
    pub vm_ha_alerts_enabled: Option<RawZoneOverride>,
    pub instance: Option<String>,
    pub ha_tag: Option<String>,
    pub hypervisors_with_host_side_ha: Option<Vec<String>>,
}

/// A per-zone boolean setting: a global default plus explicit per-zone overrides.
/// Accepts a bare boolean in YAML as shorthand for "this default, no overrides".
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawZoneOverride {
    Default(bool),
    PerZone {
        #[serde(default = "default_true")]
        default: bool,
        #[serde(default)]
        zones: HashMap<String, bool>,
    },
}

fn default_true() -> bool {
    true
}
