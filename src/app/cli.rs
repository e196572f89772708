//! Command-line argument definitions (clap).

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "zonefand")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "IPMI fan-zone control daemon", long_about = None)]
pub struct Args {
    /// Configuration file
    #[arg(short = 'c', long, value_name = "FILE", default_value = "zonefand.toml")]
    pub config: PathBuf,

    /// Log filter: error, warn, info, debug, trace, or a tracing filter spec
    #[arg(long = "log-level", value_name = "FILTER", default_value = "info")]
    pub log_level: String,

    /// Log destination: stdout or stderr
    #[arg(long = "log-output", value_name = "SINK", default_value = "stderr")]
    pub log_output: String,

    /// Log BMC set-calls instead of executing them
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}
