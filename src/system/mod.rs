//! External command adapter: the seam between the daemon and the binaries it
//! drives (ipmitool, smartctl, disk enumeration helpers).

use async_trait::async_trait;

use crate::error::Result;

pub mod executor;

pub use executor::SystemRunner;

/// Captured result of one external command.
///
/// A non-zero exit code is data, not an error; callers decide what it means.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs external binaries. The only component allowed to spawn processes;
/// everything above it consumes `CmdOutput` and can be tested against a
/// scripted implementation.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv[0]` with `argv[1..]` and wait for completion. Fails only
    /// when the process cannot be spawned.
    async fn run(&self, argv: &[String]) -> Result<CmdOutput>;

    /// Shell-free pipeline: stdout of stage `i` feeds stdin of stage `i+1`.
    /// Returns the last stage's output.
    async fn run_pipeline(&self, stages: &[Vec<String>]) -> Result<CmdOutput>;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{CmdOutput, CommandRunner};
    use crate::error::{Error, Result};

    /// Scripted `CommandRunner`: hands out canned outputs in order and
    /// records every argv it was asked to run.
    pub struct MockRunner {
        outputs: Mutex<VecDeque<CmdOutput>>,
        pub calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockRunner {
        pub fn new() -> Self {
            Self {
                outputs: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn push_output(&self, exit_code: i32, stdout: &str) {
            self.outputs.lock().unwrap().push_back(CmdOutput {
                exit_code,
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
            });
        }

        pub fn recorded_calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        async fn run(&self, argv: &[String]) -> Result<CmdOutput> {
            self.calls.lock().unwrap().push(argv.to_vec());
            match self.outputs.lock().unwrap().pop_front() {
                Some(out) => Ok(out),
                // Script exhausted: behave like a successful, silent command.
                None => Ok(CmdOutput {
                    exit_code: 0,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                }),
            }
        }

        async fn run_pipeline(&self, stages: &[Vec<String>]) -> Result<CmdOutput> {
            let last = stages
                .last()
                .ok_or_else(|| Error::ConfigInvalid("empty pipeline".into()))?;
            self.run(last).await
        }
    }
}
