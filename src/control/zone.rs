//! Per-zone fan control loop.
//!
//! Each zone maps its sensor population to one relative temperature, then to
//! a discrete fan level. Quantization into `steps` avoids hunting,
//! `sensitivity` suppresses writes for noise, `polling` bounds the query
//! rate. Writes reach the BMC only when the quantized level changed.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::bmc::{Bmc, FanZone};
use crate::error::{Error, Result};
use crate::sensor::disk::DiskLimits;
use crate::sensor::types::{Reading, ThresholdOverride};
use crate::sensor::{disk, ipmi};
use crate::system::CommandRunner;

/// How a zone folds its readings into one relative temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempCalc {
    Min,
    Avg,
    Max,
    First,
}

impl TryFrom<u8> for TempCalc {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(TempCalc::Min),
            1 => Ok(TempCalc::Avg),
            2 => Ok(TempCalc::Max),
            3 => Ok(TempCalc::First),
            _ => Err(Error::ConfigInvalid(format!(
                "temp_calc {value} is not one of 0 (min), 1 (avg), 2 (max), 3 (first)"
            ))),
        }
    }
}

impl TempCalc {
    /// Aggregate relative temperatures. NaN readings are skipped for
    /// min/avg/max; an empty or all-NaN population aggregates to NaN.
    pub fn aggregate(self, readings: &[Reading]) -> f64 {
        let rels = || readings.iter().map(Reading::rel_temp).filter(|v| !v.is_nan());
        match self {
            TempCalc::Min => rels().fold(f64::NAN, f64::min),
            TempCalc::Max => rels().fold(f64::NAN, f64::max),
            TempCalc::Avg => {
                let (count, sum) = rels().fold((0u32, 0.0), |(n, s), v| (n + 1, s + v));
                if count == 0 {
                    f64::NAN
                } else {
                    sum / f64::from(count)
                }
            }
            TempCalc::First => readings.first().map(Reading::rel_temp).unwrap_or(f64::NAN),
        }
    }
}

/// Where a zone's readings come from. Sources re-query on every call; there
/// is no persistent device registry, so devices come and go between polls.
#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn read(&self) -> Vec<Reading>;
}

/// CPU zone source: IPMI sensors matching the configured name substrings.
pub struct IpmiSource {
    runner: Arc<dyn CommandRunner>,
    ipmitool_path: String,
    patterns: Vec<String>,
    limits: Option<ThresholdOverride>,
}

impl IpmiSource {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        ipmitool_path: String,
        patterns: Vec<String>,
        limits: Option<ThresholdOverride>,
    ) -> Self {
        Self {
            runner,
            ipmitool_path,
            patterns,
            limits,
        }
    }
}

#[async_trait]
impl SensorSource for IpmiSource {
    async fn read(&self) -> Vec<Reading> {
        ipmi::query_temps(
            self.runner.as_ref(),
            &self.ipmitool_path,
            &self.patterns,
            self.limits.as_ref(),
        )
        .await
    }
}

/// HD zone source: IPMI substring matches plus SMART temperatures for every
/// attached disk, so chipset or HBA sensors can ride along with the drives.
pub struct HdSource {
    runner: Arc<dyn CommandRunner>,
    ipmitool_path: String,
    smartctl_path: String,
    patterns: Vec<String>,
    limits: Option<ThresholdOverride>,
    parse_limits: bool,
    disk_limits: DiskLimits,
}

impl HdSource {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        ipmitool_path: String,
        smartctl_path: String,
        patterns: Vec<String>,
        limits: Option<ThresholdOverride>,
        parse_limits: bool,
        disk_limits: DiskLimits,
    ) -> Self {
        Self {
            runner,
            ipmitool_path,
            smartctl_path,
            patterns,
            limits,
            parse_limits,
            disk_limits,
        }
    }
}

#[async_trait]
impl SensorSource for HdSource {
    async fn read(&self) -> Vec<Reading> {
        let mut readings = ipmi::query_temps(
            self.runner.as_ref(),
            &self.ipmitool_path,
            &self.patterns,
            self.limits.as_ref(),
        )
        .await;
        readings.extend(
            disk::query_disk_temps(
                self.runner.as_ref(),
                &self.smartctl_path,
                self.parse_limits,
                &self.disk_limits,
            )
            .await,
        );
        readings
    }
}

/// Static zone parameters, validated once at construction.
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    pub zone: FanZone,
    pub name: String,
    pub temp_calc: TempCalc,
    pub steps: u32,
    pub sensitivity: f64,
    pub polling: f64,
    pub min_level: u8,
    pub max_level: u8,
}

impl ZoneConfig {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::ConfigInvalid("zone name is empty".into()));
        }
        if self.steps == 0 {
            return Err(Error::ConfigInvalid(format!("{}: steps must be > 0", self.name)));
        }
        if !(self.sensitivity > 0.0 && self.sensitivity <= 1.0) {
            return Err(Error::ConfigInvalid(format!(
                "{}: sensitivity {} outside (0, 1]",
                self.name, self.sensitivity
            )));
        }
        if !(self.polling >= 0.0) {
            return Err(Error::ConfigInvalid(format!(
                "{}: polling {} must be >= 0",
                self.name, self.polling
            )));
        }
        if self.min_level > self.max_level || self.max_level > 100 {
            return Err(Error::ConfigInvalid(format!(
                "{}: fan levels {}..{} invalid",
                self.name, self.min_level, self.max_level
            )));
        }
        Ok(())
    }
}

/// The control loop for one fan zone. State lives for the process lifetime;
/// readings are recreated on every poll.
pub struct ZoneController {
    config: ZoneConfig,
    temp_step: f64,
    level_step: f64,
    last_poll: Option<Instant>,
    last_rel: f64,
    last_level: u8,
    bmc: Arc<Bmc>,
    source: Box<dyn SensorSource>,
}

impl ZoneController {
    pub fn new(config: ZoneConfig, bmc: Arc<Bmc>, source: Box<dyn SensorSource>) -> Result<Self> {
        config.validate()?;
        let temp_step = 1.0 / f64::from(config.steps);
        let level_step = f64::from(config.max_level - config.min_level) / f64::from(config.steps);
        Ok(Self {
            config,
            temp_step,
            level_step,
            last_poll: None,
            last_rel: 0.0,
            last_level: 0,
            bmc,
            source,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn polling(&self) -> f64 {
        self.config.polling
    }

    /// Map a relative temperature to a fan level through the step grid.
    fn level_for(&self, rel: f64) -> u8 {
        let step = (rel / self.temp_step).round().clamp(0.0, f64::from(self.config.steps));
        let level = (step * self.level_step).round() as i64 + i64::from(self.config.min_level);
        level.clamp(
            i64::from(self.config.min_level),
            i64::from(self.config.max_level),
        ) as u8
    }

    /// One control iteration: rate gate, sample, aggregate, hysteresis gate,
    /// quantize, actuate on change. Never fails; degraded data means a
    /// logged, skipped iteration.
    pub async fn tick(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_poll {
            if now.duration_since(last).as_secs_f64() < self.config.polling {
                return;
            }
        }
        self.last_poll = Some(now);

        let readings = self.source.read().await;
        for r in &readings {
            debug!(
                "{}: {} = {:.1} {} [{:?}] rel {:.3}",
                self.config.name,
                r.name,
                r.temperature,
                r.unit,
                r.status,
                r.rel_temp()
            );
        }

        let current = self.config.temp_calc.aggregate(&readings);
        if current.is_nan() {
            error!("{}: no usable temperature readings this poll", self.config.name);
            return;
        }
        debug!(
            "{}: aggregate relative temperature {:.3} over {} readings",
            self.config.name,
            current,
            readings.len()
        );

        if (current - self.last_rel).abs() < self.config.sensitivity {
            return;
        }
        self.last_rel = current;

        let level = self.level_for(current);
        if level == self.last_level {
            return;
        }
        self.last_level = level;

        if let Err(e) = self.bmc.set_fan_level(self.config.zone, level).await {
            error!("{}: failed to set fan level: {e}", self.config.name);
            return;
        }
        info!(
            "{}: fan level -> {}% (rel temp {:.3})",
            self.config.name, level, current
        );
    }
}
