use std::collections::HashMap;
use std::path::Path;

use ha_domain::ZoneId;
use tracing::debug;

use crate::config::{HaConfig, ZoneOverride};
use crate::error::ConfigError;
use crate::raw::{RawHaConfig, RawZoneOverride};

/// Load the coordinator's configuration from a single YAML file.
///
/// A missing field falls back to the documented default; a missing or empty
/// file loads as an all-defaults `HaConfig`.
pub fn load_ha_config(path: &Path) -> Result<HaConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    debug!("loading ha config from {}", path.display());
    let raw: RawHaConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;

    convert(raw, path)
}

fn convert(raw: RawHaConfig, path: &Path) -> Result<HaConfig, ConfigError> {
    let defaults = HaConfig::default();

    Ok(HaConfig {
        ha_workers: nonzero_or(raw.ha_workers, defaults.ha_workers, "ha_workers", path)?,
        time_to_sleep: raw.time_to_sleep.unwrap_or(defaults.time_to_sleep),
        migration_max_retries: nonzero_or(
            raw.migration_max_retries,
            defaults.migration_max_retries,
            "migration_max_retries",
            path,
        )?,
        time_between_failures: raw
            .time_between_failures
            .unwrap_or(defaults.time_between_failures),
        time_between_cleanup: raw
            .time_between_cleanup
            .unwrap_or(defaults.time_between_cleanup),
        stop_retry_interval: raw
            .stop_retry_interval
            .unwrap_or(defaults.stop_retry_interval),
        restart_retry_interval: raw
            .restart_retry_interval
            .unwrap_or(defaults.restart_retry_interval),
        migrate_retry_interval: raw
            .migrate_retry_interval
            .unwrap_or(defaults.migrate_retry_interval),
        investigate_retry_interval: raw
            .investigate_retry_interval
            .unwrap_or(defaults.investigate_retry_interval),
        force_ha: raw.force_ha.unwrap_or(defaults.force_ha),
        vm_ha_enabled: convert_override(raw.vm_ha_enabled, true),
        vm_ha_alerts_enabled: convert_override(raw.vm_ha_alerts_enabled, true),
        instance: raw.instance.unwrap_or(defaults.instance),
        ha_tag: raw.ha_tag,
        hypervisors_with_host_side_ha: raw
            .hypervisors_with_host_side_ha
            .unwrap_or(defaults.hypervisors_with_host_side_ha),
    })
}

fn convert_override(raw: Option<RawZoneOverride>, default: bool) -> ZoneOverride {
    match raw {
        None => ZoneOverride::constant(default),
        Some(RawZoneOverride::Default(b)) => ZoneOverride::constant(b),
        Some(RawZoneOverride::PerZone { default, zones }) => {
            let mut map: HashMap<ZoneId, bool> = HashMap::with_capacity(zones.len());
            for (zone, enabled) in zones {
                map.insert(ZoneId::new(zone), enabled);
            }
            ZoneOverride::with_zones(default, map)
        }
    }
}

fn nonzero_or(
    value: Option<u32>,
    default: u32,
    field: &str,
    path: &Path,
) -> Result<u32, ConfigError> {
    match value {
        None => Ok(default),
        Some(0) => Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!("{field} must be greater than zero"),
        }),
        Some(v) => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    struct TempFile(PathBuf);

    impl TempFile {
        fn new(contents: &str) -> Self {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let mut path = std::env::temp_dir();
            path.push(format!("ha-config-test-{}-{n}.yml", std::process::id()));
            std::fs::File::create(&path)
                .unwrap()
                .write_all(contents.as_bytes())
                .unwrap();
            TempFile(path)
        }

        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn write_temp(contents: &str) -> TempFile {
        TempFile::new(contents)
    }

    #[test]
    fn empty_document_loads_all_defaults() {
        let tmp = write_temp("{}\n");
        let cfg = load_ha_config(tmp.path()).unwrap();
        assert_eq!(cfg.ha_workers, 1);
        assert_eq!(cfg.restart_retry_interval, 600);
        assert!(cfg.vm_ha_enabled(&ZoneId::new("zone-1")));
    }

    #[test]
    fn per_zone_override_wins_over_default() {
        let tmp = write_temp(
            "ha_workers: 4\n\
             vm_ha_enabled:\n\
             \x20\x20default: true\n\
             \x20\x20zones:\n\
             \x20\x20\x20\x20zone-bad: false\n",
        );
        let cfg = load_ha_config(tmp.path()).unwrap();
        assert_eq!(cfg.ha_workers, 4);
        assert!(!cfg.vm_ha_enabled(&ZoneId::new("zone-bad")));
        assert!(cfg.vm_ha_enabled(&ZoneId::new("zone-good")));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let tmp = write_temp("ha_workers: 0\n");
        let err = load_ha_config(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Conversion { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_ha_config(Path::new("/nonexistent/ha-config.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
