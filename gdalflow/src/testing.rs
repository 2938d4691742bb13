//! Test fixtures and mocks for dispatcher and capability tests.
//!
//! Compiled into the crate (not `cfg(test)`) so downstream users can
//! drive the dispatcher against scripted backends in their own tests.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::capabilities::{Version, VersionProbe};
use crate::dispatch::{BackendKind, ExecutionBackend, InvocationPlan, RawOutcome};
use crate::errors::ExecutionError;

/// A backend that records every invocation plan and returns scripted
/// outcomes in order. With an empty script, every call succeeds with no
/// output.
pub struct MockBackend {
    kind: BackendKind,
    script: Mutex<VecDeque<Result<RawOutcome, ExecutionError>>>,
    calls: Mutex<Vec<InvocationPlan>>,
}

impl MockBackend {
    /// Creates a mock posing as the subprocess backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_kind(BackendKind::Subprocess)
    }

    /// Creates a mock posing as the given backend kind.
    #[must_use]
    pub fn with_kind(kind: BackendKind) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a successful outcome with the given stdout bytes.
    pub fn push_success(&self, stdout: impl Into<Vec<u8>>) {
        self.script.lock().push_back(Ok(RawOutcome {
            stdout: stdout.into(),
        }));
    }

    /// Queues a failure carrying the given diagnostic text.
    pub fn push_failure(&self, diagnostic: impl Into<String>) {
        self.script
            .lock()
            .push_back(Err(
                ExecutionError::new(self.kind, diagnostic).with_exit_code(1)
            ));
    }

    /// Number of invocations so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// The recorded invocation plans, in call order.
    #[must_use]
    pub fn recorded_plans(&self) -> Vec<InvocationPlan> {
        self.calls.lock().clone()
    }

    /// Clears recorded calls and any remaining script.
    pub fn reset(&self) {
        self.calls.lock().clear();
        self.script.lock().clear();
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn invoke(&self, plan: &InvocationPlan) -> Result<RawOutcome, ExecutionError> {
        self.calls.lock().push(plan.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(RawOutcome::default()))
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("kind", &self.kind)
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

/// A version probe with fixed answers.
#[derive(Debug, Clone)]
pub struct ScriptedProbe {
    engine: Option<Version>,
    binding: Option<Version>,
}

impl ScriptedProbe {
    /// Creates a probe reporting the given versions.
    #[must_use]
    pub fn new(engine: Option<Version>, binding: Option<Version>) -> Self {
        Self { engine, binding }
    }

    /// A probe for a current engine with matching bindings.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Some(Version::new(3, 11, 0)), Some(Version::new(3, 11, 0)))
    }
}

impl VersionProbe for ScriptedProbe {
    fn engine_version(&self) -> Option<Version> {
        self.engine
    }

    fn binding_version(&self) -> Option<Version> {
        self.binding
    }
}
