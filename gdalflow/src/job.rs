//! Job specifications: one declarative invocation of the wrapped engine.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::args::{self, ArgShape, POSITIONAL_INPUTS, POSITIONAL_OUTPUTS};
use crate::errors::SpecError;
use crate::pipeline::Pipeline;

/// How a job's standard output should be handled at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    /// Discard captured output and return a simple success indicator.
    #[default]
    None,
    /// Capture output and decode as UTF-8 text.
    Text,
    /// Capture output as raw bytes.
    Raw,
    /// Capture output and parse as JSON.
    Json,
    /// Pass output through to the caller's console in real time.
    Stdout,
}

/// A single specification of one invocation of the wrapped engine.
///
/// Jobs are logically immutable: composition operations return new values
/// rather than mutating in place. The engine command itself is opaque to
/// this layer, identified only by the command path and the argument map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Job {
    /// The engine command path, e.g. `["raster", "convert"]`.
    pub command_path: Vec<String>,
    /// Named argument values, in insertion order.
    pub arguments: Map<String, Value>,
    /// Cardinality metadata per argument name; absence means scalar.
    pub argument_shapes: HashMap<String, ArgShape>,
    /// Engine configuration options, passed out-of-band of the argv.
    pub config_options: BTreeMap<String, String>,
    /// Environment variables injected at execution; never serialized to disk.
    pub env_vars: BTreeMap<String, String>,
    /// Optional payload wired to the process's standard input.
    pub stream_in: Option<Vec<u8>>,
    /// How standard output is handled.
    pub stream_out_format: StreamFormat,
}

impl Job {
    /// Starts building a job for the given command path.
    pub fn build<I, S>(command_path: I) -> JobBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        JobBuilder {
            job: Self {
                command_path: command_path.into_iter().map(Into::into).collect(),
                ..Self::default()
            },
        }
    }

    /// The trailing operation name of the command path.
    #[must_use]
    pub fn operation(&self) -> &str {
        self.command_path.last().map_or("", String::as_str)
    }

    /// The positional input value, when set to a string.
    #[must_use]
    pub fn input(&self) -> Option<&str> {
        POSITIONAL_INPUTS
            .iter()
            .find_map(|name| self.arguments.get(*name))
            .and_then(Value::as_str)
    }

    /// The positional output value, when set to a string.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        POSITIONAL_OUTPUTS
            .iter()
            .find_map(|name| self.arguments.get(*name))
            .and_then(Value::as_str)
    }

    pub(crate) fn set_input(&mut self, path: String) {
        self.arguments
            .insert(POSITIONAL_INPUTS[0].to_string(), Value::String(path));
    }

    pub(crate) fn set_output(&mut self, path: String) {
        self.arguments
            .insert(POSITIONAL_OUTPUTS[0].to_string(), Value::String(path));
    }

    /// Names of the arguments the caller explicitly set.
    #[must_use]
    pub fn explicit_arg_names(&self) -> Vec<String> {
        self.arguments.keys().cloned().collect()
    }

    /// Renders the full argv token sequence for this job.
    #[must_use]
    pub fn to_argv(&self) -> Vec<String> {
        args::render_job_tokens(self)
    }

    /// Composes this job with a later one, connecting their positional I/O.
    ///
    /// # Errors
    ///
    /// Returns an error if either job fails validation.
    pub fn then(self, later: Self) -> Result<Pipeline, SpecError> {
        Pipeline::new(self).then(later)
    }

    /// Validates the job's internal invariants.
    ///
    /// Checked at construction and again just before dispatch: a non-empty
    /// command path, supported value types, flag shapes paired with boolean
    /// values, and element counts within each declared shape's cardinality.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.command_path.is_empty() || self.command_path.iter().any(String::is_empty) {
            return Err(SpecError::new("job command path must be non-empty"));
        }
        for (name, value) in &self.arguments {
            args::validate_value(name, value)?;
            if let Some(shape) = self.argument_shapes.get(name) {
                if shape.is_flag {
                    if !value.is_boolean() {
                        return Err(SpecError::new(format!(
                            "argument '{name}' is declared as a flag but its value is not boolean"
                        ))
                        .with_field(name.clone()));
                    }
                    continue;
                }
                let count = args::value_count(value) as u32;
                if count < shape.min_count {
                    return Err(SpecError::new(format!(
                        "argument '{name}' supplies {count} value(s), fewer than minCount {}",
                        shape.min_count
                    ))
                    .with_field(name.clone()));
                }
                if let Some(max) = shape.max_count {
                    if count > max {
                        return Err(SpecError::new(format!(
                            "argument '{name}' supplies {count} value(s), more than maxCount {max}"
                        ))
                        .with_field(name.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`Job`], the single construction path besides
/// deserialization.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    /// Sets a named argument value.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.job.arguments.insert(name.into(), value.into());
        self
    }

    /// Declares cardinality metadata for an argument.
    #[must_use]
    pub fn shape(mut self, shape: ArgShape) -> Self {
        self.job.argument_shapes.insert(shape.name.clone(), shape);
        self
    }

    /// Sets an engine configuration option.
    #[must_use]
    pub fn config_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.job.config_options.insert(key.into(), value.into());
        self
    }

    /// Sets an environment variable to inject at execution time.
    #[must_use]
    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.job.env_vars.insert(key.into(), value.into());
        self
    }

    /// Attaches a payload for the process's standard input.
    #[must_use]
    pub fn stream_in(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.job.stream_in = Some(payload.into());
        self
    }

    /// Selects how standard output is handled.
    #[must_use]
    pub fn stream_out(mut self, format: StreamFormat) -> Self {
        self.job.stream_out_format = format;
        self
    }

    /// Validates and returns the job.
    pub fn finish(self) -> Result<Job, SpecError> {
        self.job.validate()?;
        Ok(self.job)
    }
}
