//! One-shot process adapter for the inference engine.
//!
//! Every call spawns a fresh process, passes the serialized features as the
//! last argument, drains stdout and stderr concurrently while waiting for
//! exit, and enforces a deadline. Nothing is pooled or reused.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::{Child, Command};
use tracing::{debug, error, warn};

use crate::capture::read_capped;
use crate::{Predictor, PredictorError, PredictorInput};

/// How many bytes of malformed output to include in log lines.
const LOG_PREVIEW_BYTES: usize = 512;

/// Configuration for launching the inference engine.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Executable to launch (e.g. a virtualenv's python interpreter).
    pub program: PathBuf,
    /// Arguments placed before the JSON payload (e.g. the script path).
    pub args: Vec<String>,
    /// Working directory for the child; inherits ours when `None`.
    pub working_dir: Option<PathBuf>,
    /// Deadline for one invocation, spawn to exit.
    pub timeout: Duration,
    /// Cap on captured bytes per output stream.
    pub max_output_bytes: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("python3"),
            args: vec!["predict_and_explain.py".to_string()],
            working_dir: None,
            timeout: Duration::from_secs(120),
            max_output_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Everything captured from one run of the inference engine.
///
/// Produced once per dispatch and consumed once by [`into_output`].
///
/// [`into_output`]: PredictorInvocation::into_output
#[derive(Debug, Clone)]
pub struct PredictorInvocation {
    pub payload: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl PredictorInvocation {
    /// Classify the run: failure exit, unparseable output, or a JSON document.
    pub fn into_output(self) -> Result<Value, PredictorError> {
        if !self.success {
            return Err(PredictorError::ExitNonzero {
                code: self.exit_code,
                stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
            });
        }

        if !self.stderr.is_empty() {
            debug!(
                "predictor wrote {} bytes to stderr on success: {}",
                self.stderr.len(),
                preview(&self.stderr)
            );
        }

        serde_json::from_slice(&self.stdout).map_err(|e| {
            error!(
                "predictor stdout is not JSON ({}); output was: {}",
                e,
                preview(&self.stdout)
            );
            PredictorError::OutputMalformed {
                reason: e.to_string(),
                raw: String::from_utf8_lossy(&self.stdout).into_owned(),
            }
        })
    }
}

fn preview(bytes: &[u8]) -> String {
    let end = bytes.len().min(LOG_PREVIEW_BYTES);
    let mut text = String::from_utf8_lossy(&bytes[..end]).into_owned();
    if bytes.len() > end {
        text.push_str("...");
    }
    text
}

/// Runs the inference engine as a child process per call.
#[derive(Debug, Clone)]
pub struct ProcessPredictor {
    config: ProcessConfig,
}

impl ProcessPredictor {
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Spawn the engine with `payload` as its final argument and capture its run.
    pub async fn invoke(&self, payload: String) -> Result<PredictorInvocation, PredictorError> {
        let started = Instant::now();

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg(&payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| PredictorError::Spawn {
            program: self.config.program.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(pid = ?child.id(), "spawned predictor process");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("predictor stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("predictor stderr was not captured"))?;

        let limit = self.config.max_output_bytes;
        let run = async {
            tokio::try_join!(
                read_capped(stdout, limit, "stdout"),
                read_capped(stderr, limit, "stderr"),
                async { child.wait().await.map_err(PredictorError::from) },
            )
        };

        let outcome = tokio::time::timeout(self.config.timeout, run).await;
        let (stdout, stderr, status) = match outcome {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) => {
                warn!(error = %e, "predictor run aborted, terminating child");
                terminate(&mut child).await;
                return Err(e);
            }
            Err(_) => {
                warn!(
                    "predictor exceeded its {:?} deadline, terminating child",
                    self.config.timeout
                );
                terminate(&mut child).await;
                return Err(PredictorError::Timeout(self.config.timeout));
            }
        };

        let invocation = PredictorInvocation {
            payload,
            exit_code: status.code(),
            success: status.success(),
            stdout,
            stderr,
            elapsed: started.elapsed(),
        };
        debug!(
            exit_code = ?invocation.exit_code,
            stdout_bytes = invocation.stdout.len(),
            stderr_bytes = invocation.stderr.len(),
            "predictor finished in {:.2?}",
            invocation.elapsed
        );
        Ok(invocation)
    }
}

/// Kill and reap a child that is still running.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill predictor process");
    }
}

#[async_trait]
impl Predictor for ProcessPredictor {
    fn name(&self) -> &str {
        "process"
    }

    async fn predict(&self, input: &PredictorInput) -> Result<Value, PredictorError> {
        let payload = input.to_argument()?;
        self.invoke(payload).await?.into_output()
    }
}
