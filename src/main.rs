//! zonefand: IPMI fan-zone control daemon.
//!
//! Reads temperatures from on-board IPMI sensors and attached disks, maps
//! them onto a relative scale per zone, and drives the BMC's fan-zone PWM
//! levels in discrete steps. One cooperative loop ticks the CPU zone, then
//! the HD zone, then sleeps; the BMC is the only shared actuator and is
//! reached exclusively through the `bmc` module.

mod app;
mod bmc;
mod config;
mod control;
mod error;
mod sensor;
mod system;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

use crate::app::cli::Args;
use crate::bmc::{Bmc, FanMode};
use crate::config::DaemonConfig;
use crate::control::zone::ZoneController;
use crate::control::{HdSource, IpmiSource};
use crate::system::{CommandRunner, SystemRunner};

const EXIT_BAD_LOGGING: u8 = 5;
const EXIT_BAD_CONFIG: u8 = 6;
const EXIT_BMC_INIT: u8 = 7;
const EXIT_NO_ZONE: u8 = 8;

fn build_zones(
    config: &DaemonConfig,
    runner: &Arc<dyn CommandRunner>,
    bmc: &Arc<Bmc>,
) -> error::Result<Vec<ZoneController>> {
    let mut zones = Vec::new();

    if config.cpu_zone.enabled {
        let source = IpmiSource::new(
            runner.clone(),
            config.paths.ipmitool_path.clone(),
            config.cpu_zone.sensor_spec.clone(),
            config.cpu_zone.threshold_override(),
        );
        zones.push(ZoneController::new(
            config.cpu_zone.zone_config()?,
            bmc.clone(),
            Box::new(source),
        )?);
    }

    if config.hd_zone.enabled {
        let source = HdSource::new(
            runner.clone(),
            config.paths.ipmitool_path.clone(),
            config.paths.smartctl_path.clone(),
            config.hd_zone.sensor_spec.clone(),
            config.hd_zone.threshold_override(),
            config.hd_zone.parse_limits,
            config.hd_zone.disk_limits(),
        );
        zones.push(ZoneController::new(
            config.hd_zone.zone_config()?,
            bmc.clone(),
            Box::new(source),
        )?);
    }

    Ok(zones)
}

/// Put the fan mode back the way we found it. Best effort; the operator can
/// always restore by hand.
async fn restore_fan_mode(bmc: &Bmc, startup_mode: FanMode) {
    if startup_mode == FanMode::Full || startup_mode == FanMode::Unknown {
        return;
    }
    info!("restoring BMC fan mode {startup_mode}");
    if let Err(e) = bmc.set_fan_mode(startup_mode).await {
        error!("could not restore fan mode: {e}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = app::logging::init(&args.log_level, &args.log_output) {
        eprintln!("ERROR: {e}");
        return ExitCode::from(EXIT_BAD_LOGGING);
    }

    info!("zonefand {} starting", env!("CARGO_PKG_VERSION"));
    if args.dry_run {
        warn!("dry run: BMC set-calls will be logged, not issued");
    }

    let config = match config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_BAD_CONFIG);
        }
    };

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());
    let bmc = Arc::new(Bmc::new(config.bmc_config(args.dry_run), runner.clone()));

    // First BMC contact doubles as the init check: a missing ipmitool or a
    // BMC that will not answer is fatal here, never later.
    let startup_mode = match bmc.get_fan_mode().await {
        Ok(mode) => mode,
        Err(e) => {
            error!("BMC initialization failed: {e}");
            return ExitCode::from(EXIT_BMC_INIT);
        }
    };
    debug!("BMC fan mode at startup: {startup_mode}");

    if startup_mode != FanMode::Full {
        if let Err(e) = bmc.set_fan_mode(FanMode::Full).await {
            error!("BMC initialization failed: {e}");
            return ExitCode::from(EXIT_BMC_INIT);
        }
    }

    let mut zones = match build_zones(&config, &runner, &bmc) {
        Ok(zones) => zones,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_BAD_CONFIG);
        }
    };
    if zones.is_empty() {
        error!("neither fan zone is enabled, nothing to control");
        return ExitCode::from(EXIT_NO_ZONE);
    }
    for zone in &zones {
        info!("{} enabled, polling every {}s", zone.name(), zone.polling());
    }

    let wait = zones
        .iter()
        .map(ZoneController::polling)
        .fold(f64::INFINITY, f64::min)
        / 2.0;
    debug!("main loop wait time {wait}s");

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("cannot install SIGTERM handler: {e}");
            None
        }
    };

    loop {
        for zone in &mut zones {
            zone.tick().await;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(wait)) => {}
            _ = tokio::signal::ctrl_c() => break,
            _ = async {
                match sigterm.as_mut() {
                    Some(stream) => { stream.recv().await; }
                    None => std::future::pending::<()>().await,
                }
            } => break,
        }
    }

    info!("shutdown requested");
    restore_fan_mode(&bmc, startup_mode).await;
    ExitCode::SUCCESS
}
