//! Temperature reading model shared by the IPMI and disk acquisition paths.

/// Where a reading came from, and for disks, what kind of device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingKind {
    Ipmi,
    DiskHdd,
    DiskSsd,
    DiskUnknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempUnit {
    Celsius,
    Fahrenheit,
    NotAvailable,
}

impl std::fmt::Display for TempUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TempUnit::Celsius => write!(f, "Celsius"),
            TempUnit::Fahrenheit => write!(f, "Fahrenheit"),
            TempUnit::NotAvailable => write!(f, "N/A"),
        }
    }
}

/// Health state as reported by the sensor backend. `Other` carries whatever
/// string IPMI printed ("na", "nc", vendor oddities).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorStatus {
    Ok,
    Fail,
    Other(String),
}

impl SensorStatus {
    pub fn from_ipmi(raw: &str) -> Self {
        match raw.trim() {
            s if s.eq_ignore_ascii_case("ok") => SensorStatus::Ok,
            s if s.eq_ignore_ascii_case("fail") => SensorStatus::Fail,
            s => SensorStatus::Other(s.to_string()),
        }
    }
}

/// The six IPMI threshold bounds, `lnr <= lcr <= lnc <= unc <= ucr <= unr`.
/// Unknown bounds are NaN. Only `lnc`/`unc` drive the control loop; the rest
/// are carried for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub lnr: f64,
    pub lcr: f64,
    pub lnc: f64,
    pub unc: f64,
    pub ucr: f64,
    pub unr: f64,
}

impl Thresholds {
    /// Flat bounds: the whole lower triple at `min`, the upper at `max`.
    pub fn flat(min: f64, max: f64) -> Self {
        Self {
            lnr: min,
            lcr: min,
            lnc: min,
            unc: max,
            ucr: max,
            unr: max,
        }
    }
}

/// Operator-supplied replacement for the non-critical bounds, used when the
/// BMC reports limits that are too lenient for the installed hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdOverride {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ThresholdOverride {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// Usable only when both bounds are present, finite, and ordered.
    pub fn is_valid(&self) -> bool {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) => lo.is_finite() && hi.is_finite() && lo < hi,
            _ => false,
        }
    }

    /// Replace `lnc`/`unc` and pull the outer bounds in where they would
    /// otherwise sit beyond the new non-critical limits.
    pub fn apply(&self, th: &mut Thresholds) {
        if !self.is_valid() {
            return;
        }
        if let Some(lo) = self.min {
            th.lnc = lo;
            if lo < th.lcr {
                th.lcr = lo;
            }
            if lo < th.lnr {
                th.lnr = lo;
            }
        }
        if let Some(hi) = self.max {
            th.unc = hi;
            if hi < th.ucr {
                th.ucr = hi;
            }
            if hi < th.unr {
                th.unr = hi;
            }
        }
    }
}

/// One temperature observation, short-lived: produced per poll, aggregated,
/// and discarded.
#[derive(Debug, Clone)]
pub struct Reading {
    pub name: String,
    pub kind: ReadingKind,
    pub temperature: f64,
    pub unit: TempUnit,
    pub status: SensorStatus,
    pub thresholds: Thresholds,
}

impl Reading {
    pub fn new(
        name: String,
        kind: ReadingKind,
        temperature: f64,
        unit: TempUnit,
        status: SensorStatus,
        thresholds: Thresholds,
    ) -> Self {
        // A reading without a value is a failed reading, whatever the
        // backend claimed.
        let status = if temperature.is_nan() {
            SensorStatus::Fail
        } else {
            status
        };
        Self {
            name,
            kind,
            temperature,
            unit,
            status,
            thresholds,
        }
    }

    /// Temperature mapped into [0, 1] between `lnc` and `unc`.
    ///
    /// NaN temperature stays NaN so aggregation can skip it. A degenerate or
    /// unknown span reads as 1.0: a sensor we cannot place is treated as hot.
    pub fn rel_temp(&self) -> f64 {
        if self.temperature.is_nan() {
            return f64::NAN;
        }
        let span = self.thresholds.unc - self.thresholds.lnc;
        if !span.is_finite() || span <= 0.0 {
            return 1.0;
        }
        ((self.temperature - self.thresholds.lnc) / span).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temp: f64, lnc: f64, unc: f64) -> Reading {
        Reading::new(
            "CPU Temp".into(),
            ReadingKind::Ipmi,
            temp,
            TempUnit::Celsius,
            SensorStatus::Ok,
            Thresholds::flat(lnc, unc),
        )
    }

    #[test]
    fn rel_temp_is_linear_between_bounds() {
        assert_eq!(reading(50.0, 30.0, 70.0).rel_temp(), 0.5);
        assert_eq!(reading(40.0, 30.0, 70.0).rel_temp(), 0.25);
    }

    #[test]
    fn rel_temp_clamps_to_unit_interval() {
        assert_eq!(reading(5.0, 30.0, 70.0).rel_temp(), 0.0);
        assert_eq!(reading(120.0, 30.0, 70.0).rel_temp(), 1.0);
        // Boundary cases: lnc maps to 0, unc and above to 1.
        assert_eq!(reading(30.0, 30.0, 70.0).rel_temp(), 0.0);
        assert_eq!(reading(70.0, 30.0, 70.0).rel_temp(), 1.0);
    }

    #[test]
    fn degenerate_span_reads_hot() {
        assert_eq!(reading(42.0, 50.0, 50.0).rel_temp(), 1.0);
        assert_eq!(reading(42.0, f64::NAN, 70.0).rel_temp(), 1.0);
        assert_eq!(reading(42.0, 30.0, f64::NAN).rel_temp(), 1.0);
    }

    #[test]
    fn nan_temperature_propagates_and_fails_status() {
        let r = reading(f64::NAN, 30.0, 70.0);
        assert!(r.rel_temp().is_nan());
        assert_eq!(r.status, SensorStatus::Fail);
    }

    #[test]
    fn override_requires_both_finite_ordered_bounds() {
        assert!(ThresholdOverride::new(Some(10.0), Some(50.0)).is_valid());
        assert!(!ThresholdOverride::new(Some(10.0), None).is_valid());
        assert!(!ThresholdOverride::new(None, Some(50.0)).is_valid());
        assert!(!ThresholdOverride::new(Some(50.0), Some(10.0)).is_valid());
        assert!(!ThresholdOverride::new(Some(f64::NAN), Some(50.0)).is_valid());
    }

    #[test]
    fn override_tightens_outer_bounds() {
        let mut th = Thresholds {
            lnr: 0.0,
            lcr: 5.0,
            lnc: 10.0,
            unc: 80.0,
            ucr: 85.0,
            unr: 90.0,
        };
        ThresholdOverride::new(Some(3.0), Some(60.0)).apply(&mut th);
        assert_eq!(th.lnc, 3.0);
        assert_eq!(th.lcr, 3.0); // was 5.0, above the new lower bound
        assert_eq!(th.lnr, 0.0); // already below, untouched
        assert_eq!(th.unc, 60.0);
        assert_eq!(th.ucr, 60.0);
        assert_eq!(th.unr, 60.0);
    }

    #[test]
    fn invalid_override_is_a_no_op() {
        let mut th = Thresholds::flat(10.0, 50.0);
        ThresholdOverride::new(Some(40.0), Some(20.0)).apply(&mut th);
        assert_eq!(th.lnc, 10.0);
        assert_eq!(th.unc, 50.0);
    }
}
