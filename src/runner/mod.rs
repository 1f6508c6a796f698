pub mod capture;
pub mod group;

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ToolLocation;
use crate::consts::{
    DEFAULT_IR_MARKER, DEFAULT_MAX_CONCURRENT, DEFAULT_TIMEOUT_SECS, MAX_OUTPUT_BYTES,
};
use crate::error::PlaygroundError;
use crate::stager::{StagedArtifact, Stager};

use capture::{StreamReader, append_note, collect, extract_ir};
use group::ProcessGroup;

/// What the user asked to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Execute and show everything the tool prints.
    #[default]
    Run,
    /// Show only the intermediate representation.
    Ir,
}

/// How the tool invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own. `code` is `None` when a signal ended it.
    Exited { code: Option<i32> },
    /// The process outlived its budget and was killed.
    TimedOut,
    /// The process could not be started at all.
    FailedToStart,
}

/// Captured output of one tool invocation. The tool failing is data, not an
/// error.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub termination: Termination,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn timed_out(&self) -> bool {
        self.termination == Termination::TimedOut
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited { code } => code,
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code() == Some(0)
    }
}

/// Settings for invoking the tool.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub timeout: Duration,
    /// Flag placed before the source path in IR mode, if the tool has one.
    pub ir_flag: Option<String>,
    /// Without `ir_flag`, IR mode keeps only stdout after this line.
    pub ir_marker: String,
    /// Cap per output stream.
    pub max_output_bytes: usize,
    /// Invocations allowed at once. `1` serializes the tool.
    pub max_concurrent: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            ir_flag: None,
            ir_marker: DEFAULT_IR_MARKER.to_string(),
            max_output_bytes: MAX_OUTPUT_BYTES,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Stages submissions and runs the external tool against them.
pub struct Runner {
    tool: ToolLocation,
    stager: Stager,
    config: RunnerConfig,
    slots: Semaphore,
}

impl Runner {
    pub fn new(tool: ToolLocation, stager: Stager, config: RunnerConfig) -> Self {
        let slots = Semaphore::new(config.max_concurrent.max(1));
        Self {
            tool,
            stager,
            config,
            slots,
        }
    }

    pub fn tool(&self) -> &ToolLocation {
        &self.tool
    }

    pub fn stager(&self) -> &Stager {
        &self.stager
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Stage `source`, run the tool on it, and clean up.
    ///
    /// Fails only when the tool is unavailable or the source cannot be
    /// staged. The artifact is released on every path once staged.
    pub async fn run_source(
        &self,
        source: &str,
        mode: Mode,
    ) -> Result<ExecutionResult, PlaygroundError> {
        let tool = self.tool.executable()?;

        // Wait for a slot before touching the disk so queued requests hold
        // no artifacts.
        let _slot = self.slot().await?;

        let artifact = self.stager.stage(source).await?;
        let result = self.invoke(tool, &artifact, mode).await;
        self.stager.release(artifact).await;
        Ok(result)
    }

    /// Run the tool against an already staged artifact. The caller keeps
    /// ownership and releases it afterwards.
    pub async fn execute(
        &self,
        artifact: &StagedArtifact,
        mode: Mode,
    ) -> Result<ExecutionResult, PlaygroundError> {
        let tool = self.tool.executable()?;
        let _slot = self.slot().await?;
        Ok(self.invoke(tool, artifact, mode).await)
    }

    /// One of the `max_concurrent` invocation slots, held until dropped.
    async fn slot(&self) -> Result<SemaphorePermit<'_>, PlaygroundError> {
        self.slots
            .acquire()
            .await
            .map_err(|_| PlaygroundError::Io("runner is shutting down".to_string()))
    }

    /// Command-line arguments for one invocation. The source path is always
    /// the only positional argument.
    pub fn arguments(&self, source_path: &Path, mode: Mode) -> Vec<OsString> {
        let mut args = Vec::with_capacity(2);
        if let (Mode::Ir, Some(flag)) = (mode, &self.config.ir_flag) {
            args.push(OsString::from(flag));
        }
        args.push(source_path.as_os_str().to_os_string());
        args
    }

    async fn invoke(&self, tool: &Path, artifact: &StagedArtifact, mode: Mode) -> ExecutionResult {
        let started = Instant::now();

        let mut command = Command::new(tool);
        command
            .args(self.arguments(artifact.source_path(), mode))
            .current_dir(artifact.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Lead a fresh group so the whole tree can be killed at once.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(tool = %tool.display(), error = %e, "failed to start tool");
                return ExecutionResult {
                    stdout: String::new(),
                    stderr: format!("failed to start {}: {}", tool.display(), e),
                    termination: Termination::FailedToStart,
                    elapsed: started.elapsed(),
                };
            }
        };
        debug!(pid = child.id(), ?mode, "tool started");
        // Dropped before `child`, so a cancelled request kills the group too.
        let mut group = ProcessGroup::new(child.id());

        let max = self.config.max_output_bytes;
        let stdout_reader = child
            .stdout
            .take()
            .map(|out| StreamReader::spawn(out, max));
        let stderr_reader = child
            .stderr
            .take()
            .map(|err| StreamReader::spawn(err, max));

        let mut notes = Vec::new();
        let termination = match timeout(self.config.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                if let Some(note) = describe_failure(status) {
                    notes.push(note);
                }
                Termination::Exited {
                    code: status.code(),
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "failed to wait for tool");
                group.kill();
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill tool");
                }
                notes.push(format!("failed to wait for tool: {e}"));
                Termination::Exited { code: None }
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "tool timed out; killing"
                );
                group.kill();
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed-out tool");
                }
                notes.push(format!(
                    "timed out after {:.1}s: process killed",
                    self.config.timeout.as_secs_f64()
                ));
                Termination::TimedOut
            }
        };

        // Anything the tool left running would keep the pipes open.
        group.kill();

        let mut stdout = collect(stdout_reader).await.into_text();
        let mut stderr = collect(stderr_reader).await.into_text();
        for note in &notes {
            append_note(&mut stderr, note);
        }

        if mode == Mode::Ir && self.config.ir_flag.is_none() {
            stdout = extract_ir(&stdout, &self.config.ir_marker);
        }

        let elapsed = started.elapsed();
        info!(
            ?termination,
            elapsed_ms = elapsed.as_millis() as u64,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "tool finished"
        );

        ExecutionResult {
            stdout,
            stderr,
            termination,
            elapsed,
        }
    }
}

/// Text appended to stderr when the tool did not exit cleanly.
fn describe_failure(status: ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    if let Some(code) = status.code() {
        return Some(format!("process exited with code {code}"));
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(format!("process terminated by signal {signal}"));
        }
    }

    Some(format!("process ended abnormally: {status}"))
}
