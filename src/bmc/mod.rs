//! BMC fan controller: global fan mode and per-zone PWM levels over
//! ipmitool raw commands.
//!
//! Two motherboard quirks are handled here and nowhere else: some boards
//! wire the CPU and HD headers to the opposite zones (`swapped_zones`), and
//! some use a different OEM opcode with a 0..255 duty scale
//! (`alternate_set_level`). Every set-call is followed by a mandatory settle
//! delay so the BMC is never hammered.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::system::CommandRunner;

/// Global BMC fan mode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    Standard,
    Full,
    Optimal,
    HeavyIo,
    Unknown,
}

impl FanMode {
    pub fn from_raw(value: i64) -> Self {
        match value {
            0 => FanMode::Standard,
            1 => FanMode::Full,
            2 => FanMode::Optimal,
            4 => FanMode::HeavyIo,
            _ => FanMode::Unknown,
        }
    }

    fn raw(self) -> Option<u8> {
        match self {
            FanMode::Standard => Some(0),
            FanMode::Full => Some(1),
            FanMode::Optimal => Some(2),
            FanMode::HeavyIo => Some(4),
            FanMode::Unknown => None,
        }
    }
}

impl std::fmt::Display for FanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FanMode::Standard => "STANDARD",
            FanMode::Full => "FULL",
            FanMode::Optimal => "OPTIMAL",
            FanMode::HeavyIo => "HEAVY IO",
            FanMode::Unknown => "UNKNOWN",
        };
        write!(f, "{name}")
    }
}

/// BMC fan zone selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanZone {
    Cpu,
    Hd,
}

impl FanZone {
    fn index(self) -> u8 {
        match self {
            FanZone::Cpu => 0,
            FanZone::Hd => 1,
        }
    }
}

impl std::fmt::Display for FanZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FanZone::Cpu => write!(f, "CPU zone"),
            FanZone::Hd => write!(f, "HD zone"),
        }
    }
}

/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct BmcConfig {
    pub command_path: String,
    pub fan_mode_delay: u64,
    pub fan_level_delay: u64,
    pub swapped_zones: bool,
    pub alternate_set_level: bool,
    pub dry_run: bool,
}

pub struct Bmc {
    config: BmcConfig,
    runner: Arc<dyn CommandRunner>,
}

impl Bmc {
    pub fn new(config: BmcConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    fn argv(&self, raw: &[String]) -> Vec<String> {
        let mut argv = Vec::with_capacity(raw.len() + 2);
        argv.push(self.config.command_path.clone());
        argv.push("raw".to_string());
        argv.extend_from_slice(raw);
        argv
    }

    /// Read the current global fan mode.
    pub async fn get_fan_mode(&self) -> Result<FanMode> {
        let argv = self.argv(&["0x30".into(), "0x45".into(), "0x00".into()]);
        let out = self.runner.run(&argv).await?;
        if !out.success() {
            return Err(Error::BmcProtocol(format!(
                "fan mode query exited with {}: {}",
                out.exit_code,
                out.stderr_text().trim()
            )));
        }

        let text = out.stdout_text();
        let value = text
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::BmcProtocol(format!("unexpected fan mode response '{}'", text.trim())))?;
        Ok(FanMode::from_raw(value))
    }

    /// Set the global fan mode and wait out the mode settle delay. The delay
    /// applies regardless of how the command exited; the BMC may already be
    /// transitioning.
    pub async fn set_fan_mode(&self, mode: FanMode) -> Result<()> {
        let raw = mode
            .raw()
            .ok_or_else(|| Error::ConfigInvalid(format!("cannot set fan mode {mode}")))?;

        let argv = self.argv(&[
            "0x30".into(),
            "0x45".into(),
            "0x01".into(),
            format!("0x{raw:02x}"),
        ]);

        if self.config.dry_run {
            info!("dry run: {}", argv.join(" "));
        } else {
            let out = self.runner.run(&argv).await?;
            if !out.success() {
                error!(
                    "set fan mode {mode} exited with {}: {}",
                    out.exit_code,
                    out.stderr_text().trim()
                );
            } else {
                info!("BMC fan mode set to {mode}");
            }
        }

        sleep(Duration::from_secs(self.config.fan_mode_delay)).await;
        Ok(())
    }

    /// Set one zone's PWM level in percent and wait out the level settle
    /// delay. A non-zero exit is logged, not retried; the next poll
    /// converges or re-issues.
    pub async fn set_fan_level(&self, zone: FanZone, level: u8) -> Result<()> {
        if level > 100 {
            return Err(Error::ConfigInvalid(format!("fan level {level} out of range")));
        }

        let mut index = zone.index();
        if self.config.swapped_zones {
            index = 1 - index;
        }

        let raw = if self.config.alternate_set_level {
            let scaled = (255.0 * f64::from(level) / 100.0).round() as u8;
            vec![
                "0x30".to_string(),
                "0x91".to_string(),
                "0x5A".to_string(),
                "0x03".to_string(),
                format!("0x{:02x}", 0x10 + index),
                format!("0x{scaled:02x}"),
            ]
        } else {
            vec![
                "0x30".to_string(),
                "0x70".to_string(),
                "0x66".to_string(),
                "0x01".to_string(),
                format!("0x{index:02x}"),
                format!("0x{level:02x}"),
            ]
        };
        let argv = self.argv(&raw);

        if self.config.dry_run {
            info!("dry run: {}", argv.join(" "));
        } else {
            let out = self.runner.run(&argv).await?;
            if !out.success() {
                error!(
                    "set {zone} level {level}% exited with {}: {}",
                    out.exit_code,
                    out.stderr_text().trim()
                );
            } else {
                debug!("{zone} level set to {level}%");
            }
        }

        sleep(Duration::from_secs(self.config.fan_level_delay)).await;
        Ok(())
    }
}
