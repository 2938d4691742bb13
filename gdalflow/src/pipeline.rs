//! Pipeline composition: ordered chains of jobs with implicit data flow.
//!
//! Composing two jobs connects the later job's positional input to the
//! earlier job's positional output. Unset connection points are filled
//! with synthesized virtual paths so every intermediate stage of a chain
//! has a concrete (possibly virtual) connecting location.

use uuid::Uuid;

use crate::errors::SpecError;
use crate::job::Job;

/// Path prefixes denoting staged, in-memory, or streaming locations
/// rather than concrete user files.
pub const VIRTUAL_PATH_PREFIXES: &[&str] = &["/vsimem/", "/vsistdin", "/vsistdout", "stream://"];

/// Returns true if the path is a virtual/placeholder sentinel.
#[must_use]
pub fn is_virtual_path(path: &str) -> bool {
    VIRTUAL_PATH_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

fn synthesize_virtual_path() -> String {
    format!("/vsimem/gdalflow/{}", Uuid::new_v4())
}

/// An ordered chain of jobs with implicit connective data flow.
///
/// A pipeline stays open to further composition until executed or
/// serialized; both are non-destructive reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// The jobs, in execution order. Every public construction path
    /// guarantees at least one job.
    pub(crate) jobs: Vec<Job>,
    /// Optional pipeline name, carried into envelope metadata.
    pub name: Option<String>,
    /// Optional pipeline description, carried into envelope metadata.
    pub description: Option<String>,
}

impl Pipeline {
    /// Creates a single-job pipeline.
    #[must_use]
    pub fn new(first: Job) -> Self {
        Self {
            jobs: vec![first],
            name: None,
            description: None,
        }
    }

    /// Rebuilds a pipeline from deserialized jobs.
    pub(crate) fn from_jobs(jobs: Vec<Job>) -> Result<Self, SpecError> {
        if jobs.is_empty() {
            return Err(SpecError::new("pipeline must contain at least one job"));
        }
        Ok(Self {
            jobs,
            name: None,
            description: None,
        })
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the pipeline description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The jobs, in execution order.
    #[must_use]
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Number of jobs in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true when the pipeline holds no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Appends a job, connecting its input to the current tail's output.
    ///
    /// The later job's explicit concrete input is preserved untouched; an
    /// unset or virtual-placeholder input is rewritten to the tail's
    /// output, synthesizing a fresh virtual path on the tail first when it
    /// has none. Unknown command paths are not validated here: the engine
    /// rejects them at execution time (fail-late policy).
    pub fn then(mut self, mut later: Job) -> Result<Self, SpecError> {
        later.validate()?;
        let earlier = self
            .jobs
            .last_mut()
            .ok_or_else(|| SpecError::new("cannot compose onto an empty pipeline"))?;
        connect(earlier, &mut later);
        self.jobs.push(later);
        Ok(self)
    }

    /// Concatenates another pipeline's jobs in order, flattening.
    ///
    /// The connection rule applies at the seam; pipelines never nest.
    pub fn concat(mut self, other: Self) -> Result<Self, SpecError> {
        let mut jobs = other.jobs.into_iter();
        if let (Some(earlier), Some(mut first)) = (self.jobs.last_mut(), jobs.next()) {
            connect(earlier, &mut first);
            self.jobs.push(first);
        }
        self.jobs.extend(jobs);
        Ok(self)
    }
}

/// Connects an adjacent pair: the later job's input becomes the earlier
/// job's output unless the later input is an explicit concrete path.
fn connect(earlier: &mut Job, later: &mut Job) {
    if let Some(input) = later.input() {
        if !is_virtual_path(input) {
            return;
        }
    }
    let upstream = match earlier.output() {
        Some(output) => output.to_string(),
        None => {
            let path = synthesize_virtual_path();
            earlier.set_output(path.clone());
            path
        }
    };
    later.set_input(upstream);
}
