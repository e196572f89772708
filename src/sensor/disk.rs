//! Block-device enumeration and SMART temperature acquisition.
//!
//! Enumeration is OS-specific (lsblk on Linux, GEOM on FreeBSD); the SMART
//! text parsing is shared and pure so it can be tested anywhere. smartctl's
//! exit code is a status bitmask and is deliberately ignored; whatever it
//! printed is parsed as-is.

use std::sync::Once;

use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::sensor::types::{Reading, ReadingKind, SensorStatus, TempUnit, Thresholds};
use crate::system::CommandRunner;

/// One enumerated block device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub name: String,
    pub kind: ReadingKind,
}

/// Per-kind threshold defaults applied when SMART does not supply limits.
#[derive(Debug, Clone, Copy)]
pub struct DiskLimits {
    pub hdd: (f64, f64),
    pub ssd: (f64, f64),
    pub unknown: (f64, f64),
}

impl Default for DiskLimits {
    fn default() -> Self {
        Self {
            hdd: (10.0, 50.0),
            ssd: (10.0, 70.0),
            unknown: (10.0, 60.0),
        }
    }
}

impl DiskLimits {
    fn thresholds_for(&self, kind: ReadingKind) -> Thresholds {
        let (min, max) = match kind {
            ReadingKind::DiskSsd => self.ssd,
            ReadingKind::DiskHdd => self.hdd,
            _ => self.unknown,
        };
        Thresholds::flat(min, max)
    }
}

// ---------------------------------------------------------------------------
// Enumeration
// ---------------------------------------------------------------------------

/// Parse `lsblk -nido KNAME,ROTA,MODEL` rows. ROTA 0 marks an SSD.
fn parse_lsblk_table(table: &str) -> Vec<Disk> {
    table
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_ascii_whitespace();
            let name = tokens.next()?;
            let rota = tokens.next()?;
            if rota.len() != 1 || !rota.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let kind = if rota == "0" {
                ReadingKind::DiskSsd
            } else {
                ReadingKind::DiskHdd
            };
            Some(Disk {
                name: name.to_string(),
                kind,
            })
        })
        .collect()
}

/// Text between the first `<tag>`/`</tag>` pair inside `block`.
fn tag_text<'a>(block: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = block.find(&open)? + open.len();
    let end = block[start..].find(&close)? + start;
    Some(block[start..end].trim())
}

/// Walk the GEOM configuration XML: every provider of the DISK class is a
/// disk, `rotationrate` 0 marking an SSD. Returns `None` whenever the
/// structure is not what we expect, so the caller can fall back to the flat
/// disk list.
fn parse_geom_confxml(xml: &str) -> Option<Vec<Disk>> {
    let mut disks = Vec::new();
    let mut found_disk_class = false;

    let mut rest = xml;
    while let Some(pos) = rest.find("<class") {
        let from_open = &rest[pos..];
        let end = from_open.find("</class>")?;
        let class_block = &from_open[..end];

        if tag_text(class_block, "name") == Some("DISK") {
            found_disk_class = true;
            let mut providers = class_block;
            while let Some(ppos) = providers.find("<provider") {
                let pfrom = &providers[ppos..];
                let pend = pfrom.find("</provider>")?;
                let provider = &pfrom[..pend];

                let name = tag_text(provider, "name")?;
                let rate = tag_text(provider, "rotationrate")?;
                let kind = if rate == "0" {
                    ReadingKind::DiskSsd
                } else {
                    ReadingKind::DiskHdd
                };
                disks.push(Disk {
                    name: name.to_string(),
                    kind,
                });

                providers = &pfrom[pend..];
            }
        }

        rest = &from_open[end..];
    }

    if found_disk_class {
        Some(disks)
    } else {
        None
    }
}

/// Parse the flat `kern.disks` list; device kinds are unknown here.
fn parse_kern_disks(list: &str) -> Vec<Disk> {
    list.split_ascii_whitespace()
        .map(|name| Disk {
            name: name.to_string(),
            kind: ReadingKind::DiskUnknown,
        })
        .collect()
}

async fn enumerate_linux(runner: &dyn CommandRunner) -> Result<Vec<Disk>> {
    let argv: Vec<String> = ["lsblk", "-nido", "KNAME,ROTA,MODEL"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let out = runner.run(&argv).await?;
    if !out.success() {
        return Err(Error::Parse(format!(
            "lsblk exited with {}: {}",
            out.exit_code,
            out.stderr_text().trim()
        )));
    }
    Ok(parse_lsblk_table(&out.stdout_text()))
}

async fn enumerate_freebsd(runner: &dyn CommandRunner) -> Result<Vec<Disk>> {
    let geom: Vec<String> = ["sysctl", "-n", "kern.geom.confxml"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let out = runner.run(&geom).await?;
    if out.success() {
        if let Some(disks) = parse_geom_confxml(&out.stdout_text()) {
            return Ok(disks);
        }
        warn!("could not interpret GEOM configuration, falling back to kern.disks");
    }

    let flat: Vec<String> = ["sysctl", "-n", "kern.disks"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let out = runner.run(&flat).await?;
    if !out.success() {
        return Err(Error::Parse(format!(
            "sysctl kern.disks exited with {}: {}",
            out.exit_code,
            out.stderr_text().trim()
        )));
    }
    Ok(parse_kern_disks(&out.stdout_text()))
}

/// Enumerate the block devices attached right now. No registry is kept;
/// callers re-enumerate on every poll.
pub async fn enumerate_disks(runner: &dyn CommandRunner) -> Result<Vec<Disk>> {
    match std::env::consts::OS {
        "linux" => enumerate_linux(runner).await,
        "freebsd" => enumerate_freebsd(runner).await,
        os => Err(Error::UnsupportedOs(os)),
    }
}

// ---------------------------------------------------------------------------
// SMART parsing
// ---------------------------------------------------------------------------

/// First whitespace token on `s` that is entirely an integer literal.
fn first_integer_token(s: &str) -> Option<f64> {
    s.split_ascii_whitespace()
        .find(|tok| !tok.is_empty() && tok.chars().all(|c| c.is_ascii_digit()))
        .and_then(|tok| tok.parse::<f64>().ok())
}

/// Raw value (column ten) of a SMART attribute row with the given id.
fn attribute_row_value(line: &str, id: &str) -> Option<f64> {
    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    if tokens.len() < 10 || tokens[0] != id {
        return None;
    }
    tokens[9].parse::<f64>().ok()
}

fn unit_on_line(line: &str) -> TempUnit {
    // Long forms first, then the vendor short forms seen on Samsung drives.
    if line.contains("Celsius") || line.contains("Cel") {
        TempUnit::Celsius
    } else if line.contains("Fahrenheit") || line.contains("Fah") {
        TempUnit::Fahrenheit
    } else {
        TempUnit::NotAvailable
    }
}

/// Run the extractor chain over a full smartctl dump: attribute 194, then
/// attribute 190, then the first line naming a temperature. The unit comes
/// from the same line that supplied the value.
fn extract_temperature(text: &str) -> Option<(f64, TempUnit)> {
    for id in ["194", "190"] {
        for line in text.lines() {
            if let Some(v) = attribute_row_value(line, id) {
                return Some((v, unit_on_line(line)));
            }
        }
    }
    for line in text.lines() {
        let idx = match line.find("Temperature").or_else(|| line.find("temperature")) {
            Some(idx) => idx,
            None => continue,
        };
        if let Some(v) = first_integer_token(&line[idx..]) {
            return Some((v, unit_on_line(line)));
        }
    }
    None
}

/// Overwrite threshold triples from the drive's declared operating limits.
fn apply_limit_lines(text: &str, th: &mut Thresholds) {
    for line in text.lines() {
        let is_max = (line.contains("Warning") && line.contains("Comp. Temp. Threshold"))
            || line.contains("Specified Maximum Operating Temperature");
        let is_min = line.contains("Specified Minimum Operating Temperature");

        if is_max {
            if let Some(v) = first_integer_token(line) {
                th.unc = v;
                th.ucr = v;
                th.unr = v;
            }
        } else if is_min {
            if let Some(v) = first_integer_token(line) {
                th.lnc = v;
                th.lcr = v;
                th.lnr = v;
            }
        }
    }
}

/// Build a `Reading` from one smartctl dump.
fn parse_smart_output(
    disk: &Disk,
    text: &str,
    parse_limits: bool,
    limits: &DiskLimits,
) -> Reading {
    let mut thresholds = limits.thresholds_for(disk.kind);
    if parse_limits {
        apply_limit_lines(text, &mut thresholds);
    }

    let (temperature, unit) = extract_temperature(text).unwrap_or((f64::NAN, TempUnit::NotAvailable));

    Reading::new(
        disk.name.clone(),
        disk.kind,
        temperature,
        unit,
        SensorStatus::Ok,
        thresholds,
    )
}

static UNSUPPORTED_OS_WARNED: Once = Once::new();

/// Temperature readings for every attached disk. Boundary rule as for IPMI:
/// failures degrade to an empty list, never an error. An unsupported
/// platform is reported once and is silent afterwards.
pub async fn query_disk_temps(
    runner: &dyn CommandRunner,
    smartctl_path: &str,
    parse_limits: bool,
    limits: &DiskLimits,
) -> Vec<Reading> {
    let disks = match enumerate_disks(runner).await {
        Ok(disks) => disks,
        Err(Error::UnsupportedOs(os)) => {
            UNSUPPORTED_OS_WARNED
                .call_once(|| warn!("disk enumeration is not supported on {os}, skipping disks"));
            return Vec::new();
        }
        Err(e) => {
            error!("disk enumeration failed: {e}");
            return Vec::new();
        }
    };

    let flag = if parse_limits { "-x" } else { "-A" };
    let mut readings = Vec::with_capacity(disks.len());

    for disk in &disks {
        let argv = vec![
            smartctl_path.to_string(),
            flag.to_string(),
            format!("/dev/{}", disk.name),
        ];
        match runner.run(&argv).await {
            Ok(out) => {
                readings.push(parse_smart_output(disk, &out.stdout_text(), parse_limits, limits));
            }
            Err(e) => {
                error!("SMART query for {} failed: {e}", disk.name);
            }
        }
    }

    debug!("disk query produced {} readings", readings.len());
    readings
}
