//! Zone fan controllers and their sensor sources.

pub mod zone;

pub use zone::{HdSource, IpmiSource, SensorSource, TempCalc, ZoneConfig, ZoneController};
