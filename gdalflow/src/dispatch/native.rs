//! In-process native-binding backend.
//!
//! The binding itself is injected behind the [`NativeEngine`] trait; this
//! crate ships the seam, not the linkage. Auto-selection prefers a
//! registered binding that meets [`MIN_BINDING_VERSION`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use super::{BackendKind, ExecutionBackend, InvocationPlan, RawOutcome};
use crate::capabilities::Version;
use crate::errors::ExecutionError;

/// Minimum binding version eligible for automatic selection.
pub const MIN_BINDING_VERSION: Version = Version::new(3, 8, 0);

/// An in-process engine binding.
pub trait NativeEngine: Send + Sync {
    /// The binding library's version.
    fn version(&self) -> Version;

    /// Executes one command, returning its output bytes on success or the
    /// raw diagnostic text on failure.
    fn run(&self, argv: &[String], env: &BTreeMap<String, String>) -> Result<Vec<u8>, String>;
}

/// Dispatches invocations to a registered [`NativeEngine`].
pub struct NativeBindingBackend {
    engine: Arc<dyn NativeEngine>,
}

impl NativeBindingBackend {
    /// Wraps a registered binding.
    #[must_use]
    pub fn new(engine: Arc<dyn NativeEngine>) -> Self {
        Self { engine }
    }
}

impl ExecutionBackend for NativeBindingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NativeBinding
    }

    fn invoke(&self, plan: &InvocationPlan) -> Result<RawOutcome, ExecutionError> {
        if plan.stdin.is_some() {
            // Documented degradation: there is no process stdin to wire.
            warn!("input streaming is unsupported on the native-binding backend; payload ignored");
        }
        self.engine
            .run(&plan.argv, &plan.env)
            .map(|stdout| RawOutcome { stdout })
            .map_err(|diagnostic| ExecutionError::new(BackendKind::NativeBinding, diagnostic))
    }
}

impl std::fmt::Debug for NativeBindingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBindingBackend")
            .field("version", &self.engine.version())
            .finish_non_exhaustive()
    }
}
