//! Daemon configuration structs and defaults.
//!
//! Section and key names mirror the historical configuration surface,
//! including the `impi_alternate_mode` spelling operators already have in
//! their files.

use serde::Deserialize;

use crate::bmc::{BmcConfig, FanZone};
use crate::control::zone::ZoneConfig;
use crate::control::TempCalc;
use crate::error::Result;
use crate::sensor::disk::DiskLimits;
use crate::sensor::types::ThresholdOverride;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(rename = "Paths", default)]
    pub paths: Paths,
    #[serde(rename = "Ipmi", default)]
    pub ipmi: IpmiSection,
    #[serde(rename = "CPU zone", default)]
    pub cpu_zone: CpuZoneSection,
    #[serde(rename = "HD zone", default)]
    pub hd_zone: HdZoneSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Paths {
    pub ipmitool_path: String,
    pub smartctl_path: String,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            ipmitool_path: "/usr/bin/ipmitool".to_string(),
            smartctl_path: "/usr/bin/smartctl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IpmiSection {
    pub fan_mode_delay: u64,
    pub fan_level_delay: u64,
    pub swapped_zones: bool,
    pub impi_alternate_mode: bool,
}

impl Default for IpmiSection {
    fn default() -> Self {
        Self {
            fan_mode_delay: 10,
            fan_level_delay: 2,
            swapped_zones: false,
            impi_alternate_mode: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CpuZoneSection {
    pub enabled: bool,
    #[serde(deserialize_with = "string_or_list")]
    pub sensor_spec: Vec<String>,
    pub temp_calc: u8,
    pub steps: u32,
    pub sensitivity: f64,
    pub polling: f64,
    pub min_level: u8,
    pub max_level: u8,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
}

impl Default for CpuZoneSection {
    fn default() -> Self {
        Self {
            enabled: false,
            sensor_spec: Vec::new(),
            temp_calc: 1,
            steps: 6,
            sensitivity: 0.05,
            polling: 2.0,
            min_level: 35,
            max_level: 100,
            min_temp: None,
            max_temp: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HdZoneSection {
    pub enabled: bool,
    #[serde(deserialize_with = "string_or_list")]
    pub sensor_spec: Vec<String>,
    pub temp_calc: u8,
    pub steps: u32,
    pub sensitivity: f64,
    pub polling: f64,
    pub min_level: u8,
    pub max_level: u8,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub parse_limits: bool,
    pub min_temp_hdd: f64,
    pub max_temp_hdd: f64,
    pub min_temp_ssd: f64,
    pub max_temp_ssd: f64,
}

impl Default for HdZoneSection {
    fn default() -> Self {
        Self {
            enabled: false,
            sensor_spec: Vec::new(),
            temp_calc: 1,
            steps: 4,
            sensitivity: 0.02,
            polling: 10.0,
            min_level: 35,
            max_level: 100,
            min_temp: None,
            max_temp: None,
            parse_limits: false,
            min_temp_hdd: 10.0,
            max_temp_hdd: 50.0,
            min_temp_ssd: 10.0,
            max_temp_ssd: 70.0,
        }
    }
}

/// `sensor_spec` accepts either a TOML array or one comma-separated string.
fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;

    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a string of comma-separated substrings or a list of strings")
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
            Ok(v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect())
        }

        fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: serde::de::SeqAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                out.push(item);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn threshold_override(min: Option<f64>, max: Option<f64>) -> Option<ThresholdOverride> {
    if min.is_none() && max.is_none() {
        None
    } else {
        Some(ThresholdOverride::new(min, max))
    }
}

impl DaemonConfig {
    pub fn bmc_config(&self, dry_run: bool) -> BmcConfig {
        BmcConfig {
            command_path: self.paths.ipmitool_path.clone(),
            fan_mode_delay: self.ipmi.fan_mode_delay,
            fan_level_delay: self.ipmi.fan_level_delay,
            swapped_zones: self.ipmi.swapped_zones,
            alternate_set_level: self.ipmi.impi_alternate_mode,
            dry_run,
        }
    }
}

impl CpuZoneSection {
    pub fn zone_config(&self) -> Result<ZoneConfig> {
        Ok(ZoneConfig {
            zone: FanZone::Cpu,
            name: "CPU zone".to_string(),
            temp_calc: TempCalc::try_from(self.temp_calc)?,
            steps: self.steps,
            sensitivity: self.sensitivity,
            polling: self.polling,
            min_level: self.min_level,
            max_level: self.max_level,
        })
    }

    pub fn threshold_override(&self) -> Option<ThresholdOverride> {
        threshold_override(self.min_temp, self.max_temp)
    }
}

impl HdZoneSection {
    pub fn zone_config(&self) -> Result<ZoneConfig> {
        Ok(ZoneConfig {
            zone: FanZone::Hd,
            name: "HD zone".to_string(),
            temp_calc: TempCalc::try_from(self.temp_calc)?,
            steps: self.steps,
            sensitivity: self.sensitivity,
            polling: self.polling,
            min_level: self.min_level,
            max_level: self.max_level,
        })
    }

    pub fn threshold_override(&self) -> Option<ThresholdOverride> {
        threshold_override(self.min_temp, self.max_temp)
    }

    pub fn disk_limits(&self) -> DiskLimits {
        DiskLimits {
            hdd: (self.min_temp_hdd, self.max_temp_hdd),
            ssd: (self.min_temp_ssd, self.max_temp_ssd),
            ..DiskLimits::default()
        }
    }
}
