//! Sensor acquisition: the reading model plus the IPMI and disk backends.

pub mod disk;
pub mod ipmi;
pub mod types;

pub use types::{Reading, ReadingKind, SensorStatus, TempUnit, ThresholdOverride, Thresholds};
