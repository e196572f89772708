//! IPMI sensor-table acquisition.
//!
//! `ipmitool sensor` prints one pipe-delimited record per sensor:
//!
//! `name | value | unit | status | lnr | lcr | lnc | unc | ucr | unr`
//!
//! We keep temperature rows matching the configured name substrings and turn
//! them into `Reading`s. Ill-formed rows are dropped; a failed query yields
//! an empty list and an ERROR log, never a propagated error.

use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::sensor::types::{
    Reading, ReadingKind, SensorStatus, TempUnit, ThresholdOverride, Thresholds,
};
use crate::system::CommandRunner;

const FIELD_COUNT: usize = 10;

fn parse_field(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}

fn parse_unit(raw: &str) -> TempUnit {
    let raw = raw.trim();
    if raw.contains('C') {
        TempUnit::Celsius
    } else if raw.contains('F') {
        TempUnit::Fahrenheit
    } else {
        TempUnit::NotAvailable
    }
}

/// Parse one sensor record. Returns `None` unless the row has exactly ten
/// pipe-delimited fields.
fn parse_sensor_line(line: &str, limits: Option<&ThresholdOverride>) -> Option<Reading> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() != FIELD_COUNT {
        return None;
    }

    let name = fields[0].trim();
    if name.is_empty() {
        return None;
    }

    let mut thresholds = Thresholds {
        lnr: parse_field(fields[4]),
        lcr: parse_field(fields[5]),
        lnc: parse_field(fields[6]),
        unc: parse_field(fields[7]),
        ucr: parse_field(fields[8]),
        unr: parse_field(fields[9]),
    };
    if let Some(limits) = limits {
        limits.apply(&mut thresholds);
    }

    Some(Reading::new(
        name.to_string(),
        ReadingKind::Ipmi,
        parse_field(fields[1]),
        parse_unit(fields[2]),
        SensorStatus::from_ipmi(fields[3]),
        thresholds,
    ))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Filter and parse a full `ipmitool sensor` table. Keeps rows whose name
/// contains "temp" and at least one of `patterns` (both case-insensitive).
pub fn parse_sensor_table(
    table: &str,
    patterns: &[String],
    limits: Option<&ThresholdOverride>,
) -> Vec<Reading> {
    table
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| {
            let name = line.split('|').next().unwrap_or("");
            contains_ignore_case(name, "temp")
                && patterns.iter().any(|p| contains_ignore_case(name, p))
        })
        .filter_map(|line| parse_sensor_line(line, limits))
        .collect()
}

/// Query the BMC sensor table and return matching temperature readings.
/// Boundary rule: failures are logged and produce an empty result.
pub async fn query_temps(
    runner: &dyn CommandRunner,
    ipmitool_path: &str,
    patterns: &[String],
    limits: Option<&ThresholdOverride>,
) -> Vec<Reading> {
    match query_temps_inner(runner, ipmitool_path, patterns, limits).await {
        Ok(readings) => readings,
        Err(e) => {
            error!("IPMI sensor query failed: {e}");
            Vec::new()
        }
    }
}

async fn query_temps_inner(
    runner: &dyn CommandRunner,
    ipmitool_path: &str,
    patterns: &[String],
    limits: Option<&ThresholdOverride>,
) -> Result<Vec<Reading>> {
    let argv = vec![ipmitool_path.to_string(), "sensor".to_string()];
    let out = runner.run(&argv).await?;
    if !out.success() {
        return Err(Error::Parse(format!(
            "'{} sensor' exited with {}: {}",
            ipmitool_path,
            out.exit_code,
            out.stderr_text().trim()
        )));
    }

    let readings = parse_sensor_table(&out.stdout_text(), patterns, limits);
    debug!("IPMI query matched {} temperature sensors", readings.len());
    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::mock::MockRunner;

    const TABLE: &str = "\
CPU Temp         | 54.000     | degrees C  | ok    | 5.000     | 5.000     | 10.000    | 90.000    | 95.000    | 100.000
System Temp      | 31.000     | degrees C  | ok    | -9.000    | -7.000    | -5.000    | 80.000    | 85.000    | 90.000
Peripheral Temp  | 41.000     | degrees C  | ok    | -9.000    | -7.000    | -5.000    | 80.000    | 85.000    | 90.000
VRM Temp         | na         | degrees C  | na    | na        | na        | na        | 95.000    | 100.000   | 105.000
FAN1             | 5400.000   | RPM        | ok    | 300.000   | 500.000   | 700.000   | 25300.000 | 25400.000 | 25500.000
12V              | 12.192     | Volts      | ok    | 10.173    | 10.299    | 10.740    | 12.945    | 13.260    | 13.386
";

    fn spec(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keeps_only_matching_temperature_rows() {
        let readings = parse_sensor_table(TABLE, &spec(&["cpu", "system"]), None);
        let names: Vec<&str> = readings.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["CPU Temp", "System Temp"]);
    }

    #[test]
    fn fan_and_voltage_rows_are_ignored_even_with_broad_patterns() {
        let readings = parse_sensor_table(TABLE, &spec(&["fan1", "12v", "temp"]), None);
        assert!(readings.iter().all(|r| r.name.contains("Temp")));
    }

    #[test]
    fn parses_all_ten_fields() {
        let readings = parse_sensor_table(TABLE, &spec(&["cpu"]), None);
        let r = &readings[0];
        assert_eq!(r.temperature, 54.0);
        assert_eq!(r.unit, TempUnit::Celsius);
        assert_eq!(r.status, SensorStatus::Ok);
        assert_eq!(r.thresholds.lnr, 5.0);
        assert_eq!(r.thresholds.lnc, 10.0);
        assert_eq!(r.thresholds.unc, 90.0);
        assert_eq!(r.thresholds.unr, 100.0);
    }

    #[test]
    fn unparseable_value_becomes_nan_and_fails() {
        let readings = parse_sensor_table(TABLE, &spec(&["vrm"]), None);
        let r = &readings[0];
        assert!(r.temperature.is_nan());
        assert_eq!(r.status, SensorStatus::Fail);
        assert!(r.thresholds.lnc.is_nan());
        assert_eq!(r.thresholds.unc, 95.0);
    }

    #[test]
    fn malformed_rows_are_discarded() {
        let table = "CPU Temp | 54.000 | degrees C | ok | 5.000\ngarbage without pipes\n";
        assert!(parse_sensor_table(table, &spec(&["cpu"]), None).is_empty());
    }

    #[test]
    fn override_replaces_noncritical_bounds() {
        let limits = ThresholdOverride::new(Some(20.0), Some(70.0));
        let readings = parse_sensor_table(TABLE, &spec(&["cpu"]), Some(&limits));
        let th = &readings[0].thresholds;
        assert_eq!(th.lnc, 20.0);
        assert_eq!(th.unc, 70.0);
        assert_eq!(th.ucr, 70.0);
        assert_eq!(th.unr, 70.0);
    }

    // Re-rendering the ten parsed fields of a row and parsing them again
    // must not lose numeric information, NaN included.
    #[test]
    fn ten_field_round_trip_preserves_numbers() {
        fn render(r: &Reading) -> String {
            let num = |v: f64| {
                if v.is_nan() {
                    "na".to_string()
                } else {
                    format!("{v:.3}")
                }
            };
            format!(
                "{} | {} | degrees C | {} | {} | {} | {} | {} | {} | {}",
                r.name,
                num(r.temperature),
                if r.status == SensorStatus::Ok { "ok" } else { "na" },
                num(r.thresholds.lnr),
                num(r.thresholds.lcr),
                num(r.thresholds.lnc),
                num(r.thresholds.unc),
                num(r.thresholds.ucr),
                num(r.thresholds.unr),
            )
        }

        let original = parse_sensor_table(TABLE, &spec(&["cpu", "vrm"]), None);
        assert_eq!(original.len(), 2);
        for r in &original {
            let reparsed = parse_sensor_line(&render(r), None).unwrap();
            let pairs = [
                (r.temperature, reparsed.temperature),
                (r.thresholds.lnr, reparsed.thresholds.lnr),
                (r.thresholds.lcr, reparsed.thresholds.lcr),
                (r.thresholds.lnc, reparsed.thresholds.lnc),
                (r.thresholds.unc, reparsed.thresholds.unc),
                (r.thresholds.ucr, reparsed.thresholds.ucr),
                (r.thresholds.unr, reparsed.thresholds.unr),
            ];
            for (a, b) in pairs {
                assert!(a == b || (a.is_nan() && b.is_nan()), "{a} != {b}");
            }
        }
    }

    #[tokio::test]
    async fn query_failure_yields_empty_list() {
        let runner = MockRunner::new();
        runner.push_output(1, "");
        let readings = query_temps(&runner, "/usr/bin/ipmitool", &spec(&["cpu"]), None).await;
        assert!(readings.is_empty());
    }

    #[tokio::test]
    async fn query_parses_mocked_table() {
        let runner = MockRunner::new();
        runner.push_output(0, TABLE);
        let readings = query_temps(&runner, "/usr/bin/ipmitool", &spec(&["peripheral"]), None).await;
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].temperature, 41.0);
        assert_eq!(
            runner.recorded_calls()[0],
            vec!["/usr/bin/ipmitool".to_string(), "sensor".to_string()]
        );
    }
}
