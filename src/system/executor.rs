//! Production subprocess executor built on tokio.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::trace;

use super::{CmdOutput, CommandRunner};
use crate::error::{Error, Result};

/// Spawns real processes. Holds no state; the daemon shares one instance
/// between the BMC controller and the sensor sources.
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_error(binary: &str, source: std::io::Error) -> Error {
    Error::BinaryMissing {
        binary: binary.to_string(),
        source,
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, argv: &[String]) -> Result<CmdOutput> {
        let (binary, args) = argv
            .split_first()
            .ok_or_else(|| Error::ConfigInvalid("empty command line".into()))?;

        trace!("executing: {}", argv.join(" "));

        let output = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error(binary, e))?;

        Ok(CmdOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn run_pipeline(&self, stages: &[Vec<String>]) -> Result<CmdOutput> {
        if stages.is_empty() {
            return Err(Error::ConfigInvalid("empty pipeline".into()));
        }

        let mut piped: Option<Vec<u8>> = None;
        let mut last: Option<CmdOutput> = None;

        for argv in stages {
            let (binary, args) = argv
                .split_first()
                .ok_or_else(|| Error::ConfigInvalid("empty pipeline stage".into()))?;

            trace!("pipeline stage: {}", argv.join(" "));

            let mut cmd = Command::new(binary);
            cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
            if piped.is_some() {
                cmd.stdin(Stdio::piped());
            } else {
                cmd.stdin(Stdio::null());
            }

            let mut child = cmd.spawn().map_err(|e| spawn_error(binary, e))?;

            if let Some(bytes) = piped.take() {
                if let Some(mut stdin) = child.stdin.take() {
                    // A stage that closes stdin early is fine; the write
                    // error carries no information we act on.
                    let _ = stdin.write_all(&bytes).await;
                }
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| spawn_error(binary, e))?;

            piped = Some(output.stdout.clone());
            last = Some(CmdOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(last.expect("pipeline has at least one stage"))
    }
}
