//! The hybrid JSON envelope: the native command string plus full-fidelity
//! per-job specifications.
//!
//! The `gdalg` section alone is the engine's own interoperable format; the
//! `jobSpecs` array carries strictly more information (argument shapes,
//! config options) and makes the round trip lossless. Environment variable
//! values are never written to disk: the field serializes empty as a hard
//! security rule, not a space optimization.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::native::{from_native_command, to_native_command};
use crate::args::ArgShape;
use crate::errors::{GdalflowError, SerializationError, SpecError};
use crate::job::{Job, StreamFormat};
use crate::pipeline::Pipeline;

/// The fixed type marker of the engine's streamed-algorithm format.
pub const NATIVE_TYPE: &str = "gdal_streamed_alg";

/// Version of the hybrid envelope format itself.
pub const FORMAT_VERSION: &str = "1.0";

/// Minimum engine version able to consume the embedded native command.
pub const MIN_ENGINE_VERSION: &str = "3.11";

/// The engine-native section of the envelope. On its own this is the
/// pure native format; readers ignore unrecognized extra keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GdalgSection {
    /// Fixed type marker, always [`NATIVE_TYPE`].
    #[serde(rename = "type")]
    pub kind: String,
    /// The step-delimited native command string.
    pub command_line: String,
    /// Whether relative paths resolve against the file's own location.
    pub relative_paths_relative_to_this_file: bool,
}

/// Provenance and annotation metadata of a hybrid envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    /// Hybrid format version.
    pub format_version: String,
    /// Version of the producing library.
    pub producer_version: String,
    /// Minimum engine version required to run the native command.
    pub min_engine_version: String,
    /// Pipeline name, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
    /// Pipeline description, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_description: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Version of the runtime that produced the envelope.
    pub created_by_runtime_version: String,
    /// Free-form user tags.
    #[serde(default)]
    pub custom_tags: BTreeMap<String, String>,
}

/// Full-fidelity wire form of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// The engine command path.
    pub command_path: Vec<String>,
    /// Named argument values, in insertion order.
    pub arguments: Map<String, Value>,
    /// Cardinality metadata per argument name.
    #[serde(default)]
    pub argument_shapes: HashMap<String, ArgShape>,
    /// Engine configuration options.
    #[serde(default)]
    pub config_options: BTreeMap<String, String>,
    /// Always empty on disk: values are stripped at write time.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    /// Always null on disk.
    #[serde(default)]
    pub stream_in: Option<Value>,
    /// Output handling, when not the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_out_format: Option<StreamFormat>,
}

impl JobSpec {
    /// Captures a job's full state, stripping environment variable values
    /// and the input stream payload.
    #[must_use]
    pub fn from_job(job: &Job) -> Self {
        Self {
            command_path: job.command_path.clone(),
            arguments: job.arguments.clone(),
            argument_shapes: job.argument_shapes.clone(),
            config_options: job.config_options.clone(),
            env_vars: BTreeMap::new(),
            stream_in: None,
            stream_out_format: match job.stream_out_format {
                StreamFormat::None => None,
                other => Some(other),
            },
        }
    }

    /// Reconstructs a job, validating the restored specification.
    pub fn to_job(&self) -> Result<Job, SpecError> {
        let job = Job {
            command_path: self.command_path.clone(),
            arguments: self.arguments.clone(),
            argument_shapes: self.argument_shapes.clone(),
            config_options: self.config_options.clone(),
            env_vars: self.env_vars.clone(),
            stream_in: None,
            stream_out_format: self.stream_out_format.unwrap_or_default(),
        };
        job.validate()?;
        Ok(job)
    }
}

/// The hybrid envelope: native command plus lossless job specifications.
///
/// Invariant: `gdalg.command_line` is always derivable from `job_specs`;
/// both are produced from the same pipeline at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridEnvelope {
    /// The engine-native section.
    pub gdalg: GdalgSection,
    /// Provenance metadata.
    pub metadata: EnvelopeMetadata,
    /// Full-fidelity job specifications, in execution order.
    #[serde(rename = "jobSpecs")]
    pub job_specs: Vec<JobSpec>,
}

/// Options controlling envelope production.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeOptions {
    /// Value of `relativePathsRelativeToThisFile` in the native section.
    pub relative_paths: bool,
    /// Free-form tags copied into the metadata.
    pub custom_tags: BTreeMap<String, String>,
}

impl EnvelopeOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the relative-paths marker.
    #[must_use]
    pub fn with_relative_paths(mut self, relative: bool) -> Self {
        self.relative_paths = relative;
        self
    }

    /// Adds a custom tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_tags.insert(key.into(), value.into());
        self
    }
}

fn runtime_version() -> String {
    format!("rust-{}", env!("CARGO_PKG_VERSION"))
}

/// Serializes a pipeline to a hybrid envelope.
pub fn to_hybrid_envelope(
    pipeline: &Pipeline,
    options: &EnvelopeOptions,
) -> Result<HybridEnvelope, SerializationError> {
    let command_line = to_native_command(pipeline)?;
    Ok(HybridEnvelope {
        gdalg: GdalgSection {
            kind: NATIVE_TYPE.to_string(),
            command_line,
            relative_paths_relative_to_this_file: options.relative_paths,
        },
        metadata: EnvelopeMetadata {
            format_version: FORMAT_VERSION.to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            min_engine_version: MIN_ENGINE_VERSION.to_string(),
            pipeline_name: pipeline.name.clone(),
            pipeline_description: pipeline.description.clone(),
            created_at: Utc::now(),
            created_by_runtime_version: runtime_version(),
            custom_tags: options.custom_tags.clone(),
        },
        job_specs: pipeline.jobs.iter().map(JobSpec::from_job).collect(),
    })
}

/// Reconstructs a pipeline from an envelope.
///
/// When job specs are present the restoration is lossless; otherwise the
/// embedded native command is parsed best-effort.
pub fn pipeline_from_envelope(envelope: &HybridEnvelope) -> Result<Pipeline, GdalflowError> {
    let mut pipeline = if envelope.job_specs.is_empty() {
        from_native_command(&envelope.gdalg.command_line)?
    } else {
        let jobs = envelope
            .job_specs
            .iter()
            .map(JobSpec::to_job)
            .collect::<Result<Vec<_>, _>>()?;
        Pipeline::from_jobs(jobs)?
    };
    pipeline.name = envelope.metadata.pipeline_name.clone();
    pipeline.description = envelope.metadata.pipeline_description.clone();
    Ok(pipeline)
}

/// Serializes an envelope to pretty-printed JSON text.
pub fn write_hybrid_json(envelope: &HybridEnvelope) -> Result<String, SerializationError> {
    serde_json::to_string_pretty(envelope)
        .map_err(|err| SerializationError::new(err.to_string()))
}

/// Parses hybrid envelope JSON, naming the offending key on schema
/// violations.
pub fn read_hybrid_json(text: &str) -> Result<HybridEnvelope, SerializationError> {
    serde_json::from_str(text).map_err(|err| SerializationError::new(err.to_string()))
}

/// Serializes a pipeline to pure native-format JSON (the strict subset
/// with no metadata or job specs).
pub fn write_native_json(
    pipeline: &Pipeline,
    relative_paths: bool,
) -> Result<String, SerializationError> {
    let section = GdalgSection {
        kind: NATIVE_TYPE.to_string(),
        command_line: to_native_command(pipeline)?,
        relative_paths_relative_to_this_file: relative_paths,
    };
    serde_json::to_string_pretty(&section)
        .map_err(|err| SerializationError::new(err.to_string()))
}

/// Writes an envelope to a file.
pub fn save_hybrid(envelope: &HybridEnvelope, path: &Path) -> Result<(), GdalflowError> {
    let text = write_hybrid_json(envelope)?;
    std::fs::write(path, text)?;
    debug!(path = %path.display(), "saved hybrid envelope");
    Ok(())
}

/// Loads an envelope from a file.
pub fn load_hybrid(path: &Path) -> Result<HybridEnvelope, GdalflowError> {
    let text = std::fs::read_to_string(path)?;
    Ok(read_hybrid_json(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_pipeline() -> Pipeline {
        let job = Job::build(["raster", "reproject"])
            .arg("input", "in.tif")
            .arg("output", "out.tif")
            .arg("dst-crs", "EPSG:3857")
            .config_option("CACHE", "512")
            .env_var("AWS_SECRET_ACCESS_KEY", "hunter2")
            .finish()
            .unwrap();
        Pipeline::new(job).with_name("warp")
    }

    #[test]
    fn test_envelope_strips_env_var_values() {
        let envelope = to_hybrid_envelope(&sample_pipeline(), &EnvelopeOptions::new()).unwrap();
        assert!(envelope.job_specs[0].env_vars.is_empty());
        let text = write_hybrid_json(&envelope).unwrap();
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn test_envelope_keeps_config_options() {
        let envelope = to_hybrid_envelope(&sample_pipeline(), &EnvelopeOptions::new()).unwrap();
        assert_eq!(
            envelope.job_specs[0].config_options.get("CACHE"),
            Some(&"512".to_string())
        );
        // The pure native form carries no trace of config options.
        let native = write_native_json(&sample_pipeline(), false).unwrap();
        assert!(!native.contains("CACHE"));
    }

    #[test]
    fn test_command_line_derived_from_job_specs() {
        let envelope = to_hybrid_envelope(&sample_pipeline(), &EnvelopeOptions::new()).unwrap();
        let restored = pipeline_from_envelope(&envelope).unwrap();
        assert_eq!(
            to_native_command(&restored).unwrap(),
            envelope.gdalg.command_line
        );
    }

    #[test]
    fn test_missing_key_is_identified() {
        let err = read_hybrid_json(r#"{"gdalg": {"type": "gdal_streamed_alg"}}"#).unwrap_err();
        assert!(err.message.contains("commandLine") || err.message.contains("missing"));
    }

    #[test]
    fn test_metadata_round_trips_byte_for_byte() {
        let envelope = to_hybrid_envelope(&sample_pipeline(), &EnvelopeOptions::new()).unwrap();
        let text = write_hybrid_json(&envelope).unwrap();
        let restored = read_hybrid_json(&text).unwrap();
        assert_eq!(restored, envelope);
    }
}
