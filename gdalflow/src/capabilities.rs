//! Runtime feature detection gating optional accelerated code paths.
//!
//! Each named feature requires a minimum engine version and, where
//! relevant, a minimum native-binding version; both bounds must hold.
//! Checks are memoized for the life of the gate, with an explicit cache
//! clear for tests. Unknown feature names are `false`, never an error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::errors::CapabilityError;

/// A dotted numeric version, lenient on missing components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl Version {
    /// Creates a version from components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses a dotted version string, tolerating trailing non-numeric
    /// text in each component (`"3.11.0,"` parses as `3.11.0`).
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split('.');
        let major = leading_number(parts.next()?)?;
        let minor = parts.next().and_then(leading_number).unwrap_or(0);
        let patch = parts.next().and_then(leading_number).unwrap_or(0);
        Some(Self::new(major, minor, patch))
    }
}

fn leading_number(component: &str) -> Option<u32> {
    let digits: String = component.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Supplies the detected engine and native-binding versions.
///
/// Injectable so tests can script any environment.
pub trait VersionProbe: Send + Sync {
    /// The wrapped engine's version, when detectable.
    fn engine_version(&self) -> Option<Version>;
    /// The in-process native binding's version, when present.
    fn binding_version(&self) -> Option<Version>;
}

/// Probes the engine version by invoking the CLI's `--version` flag.
///
/// The binding version is reported absent: an in-process binding
/// registers its own probe.
#[derive(Debug, Clone)]
pub struct CliVersionProbe {
    engine_path: PathBuf,
}

impl CliVersionProbe {
    /// Creates a probe for the engine executable at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            engine_path: path.into(),
        }
    }
}

impl VersionProbe for CliVersionProbe {
    fn engine_version(&self) -> Option<Version> {
        let output = std::process::Command::new(&self.engine_path)
            .arg("--version")
            .output()
            .ok()?;
        let text = String::from_utf8_lossy(&output.stdout);
        text.split_whitespace().find_map(Version::parse)
    }

    fn binding_version(&self) -> Option<Version> {
        None
    }
}

struct Feature {
    name: &'static str,
    min_engine: Version,
    min_binding: Option<Version>,
}

/// Gated features and their minimum versions.
const FEATURES: &[Feature] = &[
    Feature {
        name: "mem-dataset-exchange",
        min_engine: Version::new(3, 8, 0),
        min_binding: Some(Version::new(3, 8, 0)),
    },
    Feature {
        name: "pipeline-alg",
        min_engine: Version::new(3, 11, 0),
        min_binding: None,
    },
    Feature {
        name: "arg-introspection",
        min_engine: Version::new(3, 11, 0),
        min_binding: Some(Version::new(3, 11, 0)),
    },
    Feature {
        name: "stream-stdin",
        min_engine: Version::new(3, 11, 0),
        min_binding: None,
    },
];

/// Memoized capability checks against a version probe.
///
/// The cache is the one piece of shared mutable state in the core;
/// concurrent idempotent population is acceptable.
pub struct CapabilityGate {
    probe: Arc<dyn VersionProbe>,
    cache: RwLock<HashMap<String, bool>>,
}

impl CapabilityGate {
    /// Creates a gate over the given probe.
    #[must_use]
    pub fn new(probe: Arc<dyn VersionProbe>) -> Self {
        Self {
            probe,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns whether the named feature is available, memoized.
    #[must_use]
    pub fn has_feature(&self, name: &str) -> bool {
        if let Some(&cached) = self.cache.read().get(name) {
            return cached;
        }
        let available = self.compute(name);
        debug!(feature = name, available, "capability check");
        self.cache.write().insert(name.to_string(), available);
        available
    }

    /// Errors when a caller demands the feature with no fallback.
    pub fn require_feature(&self, name: &str) -> Result<(), CapabilityError> {
        if self.has_feature(name) {
            Ok(())
        } else {
            Err(CapabilityError::new(name))
        }
    }

    /// Clears memoized results; intended for tests.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    fn compute(&self, name: &str) -> bool {
        let Some(feature) = FEATURES.iter().find(|f| f.name == name) else {
            return false;
        };
        let engine_ok = self
            .probe
            .engine_version()
            .is_some_and(|v| v >= feature.min_engine);
        if !engine_ok {
            return false;
        }
        match feature.min_binding {
            None => true,
            Some(min) => self.probe.binding_version().is_some_and(|v| v >= min),
        }
    }
}

impl std::fmt::Debug for CapabilityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityGate")
            .field("cache", &*self.cache.read())
            .finish_non_exhaustive()
    }
}
