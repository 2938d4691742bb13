//! Cross-language bridge backend.
//!
//! Drives the engine's own Python bindings through an external
//! interpreter, passing the command path and a name→value keyword mapping
//! as a JSON document. Opt-in only: never auto-selected.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use super::{BackendKind, ExecutionBackend, InvocationPlan, RawOutcome};
use crate::errors::ExecutionError;

const BRIDGE_PROGRAM: &str = r#"
import json, sys
from osgeo import gdal

gdal.UseExceptions()
spec = json.loads(sys.argv[1])
result = gdal.Run(spec["commandPath"], spec["arguments"])
output = result.Output() if hasattr(result, "Output") else None
if isinstance(output, (str, bytes)):
    sys.stdout.write(output if isinstance(output, str) else output.decode())
"#;

/// Executes jobs through the engine's Python bindings.
#[derive(Debug, Clone)]
pub struct BridgeBackend {
    interpreter: PathBuf,
}

impl BridgeBackend {
    /// Creates a bridge over the given Python interpreter.
    #[must_use]
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl Default for BridgeBackend {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl ExecutionBackend for BridgeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Bridge
    }

    fn invoke(&self, plan: &InvocationPlan) -> Result<RawOutcome, ExecutionError> {
        if plan.stdin.is_some() {
            warn!("input streaming is unsupported on the bridge backend; payload ignored");
        }
        let spec = serde_json::json!({
            "commandPath": &plan.command_path,
            "arguments": &plan.kwargs,
        });
        let spec_text = spec.to_string();
        debug!(interpreter = %self.interpreter.display(), "dispatching through bridge");

        let output = Command::new(&self.interpreter)
            .arg("-c")
            .arg(BRIDGE_PROGRAM)
            .arg(&spec_text)
            .envs(&plan.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| {
                ExecutionError::new(
                    BackendKind::Bridge,
                    format!(
                        "failed to start interpreter '{}': {err}",
                        self.interpreter.display()
                    ),
                )
            })?;

        if !output.status.success() {
            let diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(ExecutionError::new(BackendKind::Bridge, diagnostic)
                .with_exit_code(output.status.code().unwrap_or(-1)));
        }
        Ok(RawOutcome {
            stdout: output.stdout,
        })
    }
}
