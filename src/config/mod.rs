//! Configuration loading.

use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

pub mod types;

pub use types::DaemonConfig;

/// Read and parse the configuration file. Any failure here means the daemon
/// cannot start; the caller maps it to the config exit code.
pub fn load(path: &Path) -> Result<DaemonConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::ConfigInvalid(format!("cannot read configuration file {}: {e}", path.display()))
    })?;
    let config: DaemonConfig = toml::from_str(&content).map_err(|e| {
        Error::ConfigInvalid(format!("cannot parse configuration file {}: {e}", path.display()))
    })?;
    debug!("configuration loaded from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::TempCalc;

    const SAMPLE: &str = r#"
[Paths]
ipmitool_path = "/usr/local/bin/ipmitool"

[Ipmi]
fan_mode_delay = 8
swapped_zones = true

["CPU zone"]
enabled = true
sensor_spec = ["CPU", "VRM"]
steps = 5
min_temp = 40.0
max_temp = 80.0

["HD zone"]
enabled = true
sensor_spec = "PCH, Peripheral"
temp_calc = 2
parse_limits = true
max_temp_hdd = 45.0
"#;

    #[test]
    fn sections_and_keys_parse() {
        let config: DaemonConfig = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.paths.ipmitool_path, "/usr/local/bin/ipmitool");
        assert_eq!(config.paths.smartctl_path, "/usr/bin/smartctl");
        assert_eq!(config.ipmi.fan_mode_delay, 8);
        assert_eq!(config.ipmi.fan_level_delay, 2);
        assert!(config.ipmi.swapped_zones);
        assert!(!config.ipmi.impi_alternate_mode);

        assert!(config.cpu_zone.enabled);
        assert_eq!(config.cpu_zone.sensor_spec, ["CPU", "VRM"]);
        assert_eq!(config.cpu_zone.steps, 5);

        assert!(config.hd_zone.parse_limits);
        assert_eq!(config.hd_zone.disk_limits().hdd, (10.0, 45.0));
        assert_eq!(config.hd_zone.disk_limits().ssd, (10.0, 70.0));
    }

    #[test]
    fn sensor_spec_accepts_a_comma_separated_string() {
        let config: DaemonConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.hd_zone.sensor_spec, ["PCH", "Peripheral"]);
    }

    #[test]
    fn empty_file_gives_pure_defaults() {
        let config: DaemonConfig = toml::from_str("").unwrap();
        assert!(!config.cpu_zone.enabled);
        assert!(!config.hd_zone.enabled);
        assert_eq!(config.cpu_zone.steps, 6);
        assert_eq!(config.cpu_zone.sensitivity, 0.05);
        assert_eq!(config.cpu_zone.polling, 2.0);
        assert_eq!(config.cpu_zone.min_level, 35);
        assert_eq!(config.hd_zone.steps, 4);
        assert_eq!(config.hd_zone.sensitivity, 0.02);
        assert_eq!(config.hd_zone.polling, 10.0);
        assert_eq!(config.ipmi.fan_mode_delay, 10);
    }

    #[test]
    fn zone_config_conversion_resolves_temp_calc() {
        let config: DaemonConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.cpu_zone.zone_config().unwrap().temp_calc, TempCalc::Avg);
        assert_eq!(config.hd_zone.zone_config().unwrap().temp_calc, TempCalc::Max);
    }

    #[test]
    fn out_of_range_temp_calc_is_rejected_at_conversion() {
        let config: DaemonConfig = toml::from_str("[\"CPU zone\"]\ntemp_calc = 9\n").unwrap();
        assert!(config.cpu_zone.zone_config().is_err());
    }

    #[test]
    fn threshold_override_is_absent_unless_a_bound_is_set() {
        let defaults: DaemonConfig = toml::from_str("").unwrap();
        assert!(defaults.cpu_zone.threshold_override().is_none());

        let config: DaemonConfig = toml::from_str(SAMPLE).unwrap();
        let over = config.cpu_zone.threshold_override().unwrap();
        assert!(over.is_valid());
        assert_eq!(over.min, Some(40.0));
    }

    #[test]
    fn negative_delay_fails_to_parse() {
        assert!(toml::from_str::<DaemonConfig>("[Ipmi]\nfan_mode_delay = -3\n").is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<DaemonConfig>("[Ipmi]\nfan_mode_dealy = 3\n").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load(Path::new("/nonexistent/zonefand.toml")).is_err());
    }
}
