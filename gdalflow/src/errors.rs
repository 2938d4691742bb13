//! Error types for the gdalflow orchestration layer.
//!
//! The taxonomy follows the propagation policy of the core: specification
//! and serialization errors always reach the caller, backend failures carry
//! the raw engine diagnostic untouched, and capability errors are the one
//! class callers routinely catch to fall back to a slower path.

use thiserror::Error;

use crate::dispatch::BackendKind;

/// The main error type for gdalflow operations.
#[derive(Debug, Error)]
pub enum GdalflowError {
    /// A job or pipeline failed an internal invariant.
    #[error("{0}")]
    Spec(#[from] SpecError),

    /// An envelope or command string failed to serialize or parse.
    #[error("{0}")]
    Serialization(#[from] SerializationError),

    /// A JSON document could not be classified as any supported format.
    #[error("unsupported document format: top-level keys {keys:?}")]
    UnsupportedFormat {
        /// The raw top-level keys observed, for diagnosis.
        keys: Vec<String>,
    },

    /// A backend invocation failed.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// A feature-gated fast path is unavailable in this environment.
    #[error("{0}")]
    Capability(#[from] CapabilityError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A malformed job or pipeline specification.
///
/// Raised synchronously at construction or just before dispatch; never
/// silently coerced.
#[derive(Debug, Clone, Error)]
#[error("invalid specification: {message}")]
pub struct SpecError {
    /// Human-readable description of the violated invariant.
    pub message: String,
    /// The field or argument name involved, when known.
    pub field: Option<String>,
}

impl SpecError {
    /// Creates a new specification error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Attaches the offending field or argument name.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// A serialization or deserialization failure.
///
/// Raised when an envelope is valid JSON but fails schema validation, or
/// when a native command string cannot be produced or tokenized.
#[derive(Debug, Clone, Error)]
#[error("serialization error: {message}")]
pub struct SerializationError {
    /// Human-readable description, naming the offending key when known.
    pub message: String,
    /// The offending key or token, when known.
    pub key: Option<String>,
}

impl SerializationError {
    /// Creates a new serialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            key: None,
        }
    }

    /// Attaches the offending key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// A backend invocation failure.
///
/// The raw diagnostic text from the engine is preserved verbatim so users
/// can correlate it with the engine's own documentation.
#[derive(Debug, Clone)]
pub struct ExecutionError {
    /// Which backend executed the failing invocation.
    pub backend: BackendKind,
    /// 1-based step index for sequential pipeline runs, when known.
    pub step: Option<usize>,
    /// Process exit code, when the backend exposes one.
    pub exit_code: Option<i32>,
    /// The raw diagnostic text from the backend, never reworded.
    pub diagnostic: String,
}

impl ExecutionError {
    /// Creates a new execution error for the given backend.
    #[must_use]
    pub fn new(backend: BackendKind, diagnostic: impl Into<String>) -> Self {
        Self {
            backend,
            step: None,
            exit_code: None,
            diagnostic: diagnostic.into(),
        }
    }

    /// Attaches the process exit code.
    #[must_use]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attaches the 1-based pipeline step index.
    #[must_use]
    pub fn at_step(mut self, step: usize) -> Self {
        self.step = Some(step);
        self
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} backend failed", self.backend)?;
        if let Some(step) = self.step {
            write!(f, " at step {step}")?;
        }
        if let Some(code) = self.exit_code {
            write!(f, " (exit code {code})")?;
        }
        if !self.diagnostic.is_empty() {
            write!(f, ": {}", self.diagnostic)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecutionError {}

/// A feature-gated fast path was demanded but is unavailable.
#[derive(Debug, Clone, Error)]
#[error("capability '{feature}' is not available in this environment")]
pub struct CapabilityError {
    /// The requested feature name.
    pub feature: String,
}

impl CapabilityError {
    /// Creates a new capability error.
    #[must_use]
    pub fn new(feature: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
        }
    }
}
