//! Format auto-detection for persisted specifications.

use serde_json::Value;

use super::hybrid::{self, HybridEnvelope, NATIVE_TYPE};
use super::native::from_native_command;
use crate::errors::{GdalflowError, SerializationError};
use crate::pipeline::Pipeline;

/// Classification outcome for an arbitrary parsed JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    /// Hybrid envelope: both `gdalg` and `jobSpecs` present.
    Hybrid,
    /// Pure engine-native format: the fixed type marker, no hybrid keys.
    PureNative,
    /// Neither format; callers must handle this outcome explicitly.
    Unknown,
}

/// Classifies a parsed JSON document.
#[must_use]
pub fn classify(document: &Value) -> FormatKind {
    let Value::Object(map) = document else {
        return FormatKind::Unknown;
    };
    let has_gdalg = map.contains_key("gdalg");
    let has_specs = map.contains_key("jobSpecs");
    if has_gdalg && has_specs {
        return FormatKind::Hybrid;
    }
    if !has_gdalg
        && !has_specs
        && map.get("type").and_then(Value::as_str) == Some(NATIVE_TYPE)
    {
        return FormatKind::PureNative;
    }
    FormatKind::Unknown
}

/// Loads a pipeline from JSON text in either supported format.
///
/// Unknown documents raise [`GdalflowError::UnsupportedFormat`] listing
/// the observed top-level keys for diagnosis.
pub fn load_pipeline_json(text: &str) -> Result<Pipeline, GdalflowError> {
    let document: Value = serde_json::from_str(text)
        .map_err(|err| SerializationError::new(err.to_string()))?;
    match classify(&document) {
        FormatKind::Hybrid => {
            let envelope: HybridEnvelope = serde_json::from_value(document)
                .map_err(|err| SerializationError::new(err.to_string()))?;
            hybrid::pipeline_from_envelope(&envelope)
        }
        FormatKind::PureNative => {
            // Extra keys in a pure-native document are ignored for
            // forward compatibility.
            let section: hybrid::GdalgSection = serde_json::from_value(document)
                .map_err(|err| SerializationError::new(err.to_string()))?;
            Ok(from_native_command(&section.command_line)?)
        }
        FormatKind::Unknown => {
            let keys = match document {
                Value::Object(map) => map.keys().cloned().collect(),
                _ => Vec::new(),
            };
            Err(GdalflowError::UnsupportedFormat { keys })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scenario_d_classification() {
        let hybrid = json!({"gdalg": {}, "jobSpecs": []});
        let native = json!({"type": "gdal_streamed_alg", "commandLine": "read in.tif"});
        let unknown = json!({"foo": 1});
        assert_eq!(classify(&hybrid), FormatKind::Hybrid);
        assert_eq!(classify(&native), FormatKind::PureNative);
        assert_eq!(classify(&unknown), FormatKind::Unknown);
    }

    #[test]
    fn test_native_with_hybrid_key_is_not_pure() {
        let doc = json!({"type": "gdal_streamed_alg", "jobSpecs": []});
        assert_eq!(classify(&doc), FormatKind::Unknown);
    }

    #[test]
    fn test_unknown_error_lists_keys() {
        let err = load_pipeline_json(r#"{"foo": 1, "bar": 2}"#).unwrap_err();
        match err {
            GdalflowError::UnsupportedFormat { keys } => {
                assert!(keys.contains(&"foo".to_string()));
                assert!(keys.contains(&"bar".to_string()));
            }
            other => panic!("expected UnsupportedFormat, got {other}"),
        }
    }

    #[test]
    fn test_pure_native_ignores_extra_keys() {
        let text = r#"{
            "type": "gdal_streamed_alg",
            "commandLine": "read in.tif ! write out.tif",
            "relativePathsRelativeToThisFile": false,
            "futureKey": 42
        }"#;
        let pipeline = load_pipeline_json(text).unwrap();
        assert_eq!(pipeline.len(), 2);
    }
}
