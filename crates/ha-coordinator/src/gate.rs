use std::sync::Arc;

use ha_config::HaConfig;
use ha_domain::ZoneId;

/// Per-zone switch deciding whether HA scheduling and alerting are active.
/// Thin wrapper over `HaConfig`'s zone overrides so callers in this crate
/// never reach into config internals directly.
#[derive(Clone)]
pub struct FeatureGate {
    config: Arc<HaConfig>,
}

impl FeatureGate {
    pub fn new(config: Arc<HaConfig>) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self, zone_id: &ZoneId) -> bool {
        self.config.vm_ha_enabled(zone_id)
    }

    pub fn alerts_enabled(&self, zone_id: &ZoneId) -> bool {
        self.config.vm_ha_alerts_enabled(zone_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_config::ZoneOverride;

    #[test]
    fn disabled_zone_is_reported_disabled() {
        let mut config = HaConfig::default();
        config.vm_ha_enabled = ZoneOverride::with_zones(true, [(ZoneId::new("quiet"), false)].into());
        let gate = FeatureGate::new(Arc::new(config));

        assert!(!gate.is_enabled(&ZoneId::new("quiet")));
        assert!(gate.is_enabled(&ZoneId::new("other")));
    }
}
