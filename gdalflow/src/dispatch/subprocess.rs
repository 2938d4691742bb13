//! Out-of-process invocation of the engine executable.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use super::{BackendKind, ExecutionBackend, InvocationPlan, RawOutcome};
use crate::errors::ExecutionError;
use crate::job::StreamFormat;

/// Invokes the engine executable with the rendered token list as its
/// argument vector and the merged environment as its process environment.
#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    engine_path: PathBuf,
}

impl SubprocessBackend {
    /// Creates a backend for the engine executable at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            engine_path: path.into(),
        }
    }
}

impl Default for SubprocessBackend {
    fn default() -> Self {
        Self::new("gdal")
    }
}

impl ExecutionBackend for SubprocessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Subprocess
    }

    fn invoke(&self, plan: &InvocationPlan) -> Result<RawOutcome, ExecutionError> {
        let mut command = Command::new(&self.engine_path);
        command.args(&plan.argv).envs(&plan.env);
        command.stdin(if plan.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stdout(match plan.stream_out {
            StreamFormat::Stdout => Stdio::inherit(),
            StreamFormat::None => Stdio::null(),
            StreamFormat::Text | StreamFormat::Raw | StreamFormat::Json => Stdio::piped(),
        });
        command.stderr(Stdio::piped());

        debug!(engine = %self.engine_path.display(), args = plan.argv.len(), "spawning engine process");
        let mut child = command.spawn().map_err(|err| {
            ExecutionError::new(
                BackendKind::Subprocess,
                format!("failed to spawn '{}': {err}", self.engine_path.display()),
            )
        })?;

        if let Some(payload) = &plan.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(payload).map_err(|err| {
                    ExecutionError::new(
                        BackendKind::Subprocess,
                        format!("failed to write input stream: {err}"),
                    )
                })?;
                // Dropping the handle closes the pipe so the engine sees EOF.
            }
        }

        let output = child.wait_with_output().map_err(|err| {
            ExecutionError::new(
                BackendKind::Subprocess,
                format!("failed to collect process output: {err}"),
            )
        })?;

        if !output.status.success() {
            let diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(
                ExecutionError::new(BackendKind::Subprocess, diagnostic)
                    .with_exit_code(output.status.code().unwrap_or(-1)),
            );
        }
        Ok(RawOutcome {
            stdout: output.stdout,
        })
    }
}
