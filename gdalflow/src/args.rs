//! Argument cardinality metadata and CLI token rendering.
//!
//! An [`ArgShape`] describes how many values an argument accepts and
//! whether it is a bare switch. The renderer turns a named value plus its
//! shape into the exact token sequence the engine's argument parser
//! expects: fixed tuples comma-join into a single token, repeatable
//! arguments emit one flag occurrence per element, and boolean switches
//! appear only when true.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SpecError;
use crate::job::Job;

/// Argument names treated as positional inputs.
///
/// Positional names are a configuration constant of the wrapped engine's
/// grammar, not inferred from argument order.
pub const POSITIONAL_INPUTS: &[&str] = &["input"];

/// Argument names treated as positional outputs.
pub const POSITIONAL_OUTPUTS: &[&str] = &["output"];

/// Returns true if the argument name occupies a positional slot.
#[must_use]
pub fn is_positional(name: &str) -> bool {
    POSITIONAL_INPUTS.contains(&name) || POSITIONAL_OUTPUTS.contains(&name)
}

/// Cardinality metadata for a single named argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgShape {
    /// The argument name, without the `--` prefix.
    pub name: String,
    /// Minimum number of values.
    pub min_count: u32,
    /// Maximum number of values; `None` means unbounded (repeatable).
    pub max_count: Option<u32>,
    /// Whether the argument is a bare boolean switch.
    pub is_flag: bool,
}

impl ArgShape {
    /// Creates a shape, enforcing `min_count <= max_count`.
    pub fn new(
        name: impl Into<String>,
        min_count: u32,
        max_count: Option<u32>,
        is_flag: bool,
    ) -> Result<Self, SpecError> {
        let name = name.into();
        if let Some(max) = max_count {
            if min_count > max {
                return Err(SpecError::new(format!(
                    "argument '{name}' has minCount {min_count} greater than maxCount {max}"
                ))
                .with_field(name));
            }
        }
        Ok(Self {
            name,
            min_count,
            max_count,
            is_flag,
        })
    }

    /// A plain single-valued argument.
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_count: 1,
            max_count: Some(1),
            is_flag: false,
        }
    }

    /// A fixed-arity argument of exactly `count` comma-joined values.
    #[must_use]
    pub fn tuple(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            min_count: count,
            max_count: Some(count),
            is_flag: false,
        }
    }

    /// An argument accepting any number of values, one flag occurrence each.
    #[must_use]
    pub fn repeatable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_count: 0,
            max_count: None,
            is_flag: false,
        }
    }

    /// A bare boolean switch.
    #[must_use]
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_count: 0,
            max_count: Some(1),
            is_flag: true,
        }
    }

    /// Returns true for a single-valued, non-flag shape.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        !self.is_flag && self.min_count == 1 && self.max_count == Some(1)
    }

    /// Returns true for a fixed arity greater than one.
    #[must_use]
    pub fn is_tuple(&self) -> bool {
        !self.is_flag && self.min_count > 1 && self.max_count == Some(self.min_count)
    }

    /// Returns true for an open cardinality (unbounded or `max > min`).
    #[must_use]
    pub fn is_repeatable(&self) -> bool {
        !self.is_flag
            && match self.max_count {
                None => true,
                Some(max) => max > self.min_count && max > 1,
            }
    }
}

/// Validates that a value is one of the supported argument value kinds:
/// string, number, boolean, or a list of strings/numbers.
pub fn validate_value(name: &str, value: &Value) -> Result<(), SpecError> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(()),
        Value::Array(items) => {
            for item in items {
                if !matches!(item, Value::String(_) | Value::Number(_)) {
                    return Err(SpecError::new(format!(
                        "argument '{name}' has a list element that is not a string or number"
                    ))
                    .with_field(name));
                }
            }
            Ok(())
        }
        _ => Err(
            SpecError::new(format!("argument '{name}' has an unsupported value type"))
                .with_field(name),
        ),
    }
}

/// Number of elements a value supplies: list length, or one for scalars.
#[must_use]
pub fn value_count(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        _ => 1,
    }
}

/// Stringifies a value for a single CLI token. Lists comma-join.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Null | Value::Object(_) => String::new(),
    }
}

/// Individual element strings of a value: list elements, or the scalar itself.
#[must_use]
pub fn element_strings(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(value_to_string).collect(),
        other => vec![value_to_string(other)],
    }
}

/// Renders one named argument into CLI tokens.
///
/// Priority order: boolean switch, fixed tuple (one comma-joined token),
/// repeatable (one flag occurrence per element), scalar. An argument with
/// no declared shape renders as a scalar; this is accepted permissive
/// behavior, not an error.
#[must_use]
pub fn render_argument(name: &str, value: &Value, shape: Option<&ArgShape>) -> Vec<String> {
    let flag = format!("--{name}");
    if let Some(shape) = shape {
        if shape.is_flag {
            return if value.as_bool() == Some(true) {
                vec![flag]
            } else {
                Vec::new()
            };
        }
        if shape.is_tuple() {
            return vec![flag, element_strings(value).join(",")];
        }
        if shape.is_repeatable() {
            let mut tokens = Vec::new();
            for element in element_strings(value) {
                tokens.push(flag.clone());
                tokens.push(element);
            }
            return tokens;
        }
    }
    vec![flag, value_to_string(value)]
}

/// Renders the positional tokens of a job: inputs first, then outputs, as
/// bare tokens with no flag.
#[must_use]
pub fn render_positional_tokens(job: &Job) -> Vec<String> {
    let mut tokens = Vec::new();
    for name in POSITIONAL_INPUTS.iter().chain(POSITIONAL_OUTPUTS) {
        if let Some(value) = job.arguments.get(*name) {
            tokens.extend(element_strings(value));
        }
    }
    tokens
}

/// Renders the non-positional arguments of a job as flag tokens, in
/// insertion order.
#[must_use]
pub fn render_flag_tokens(job: &Job) -> Vec<String> {
    let mut tokens = Vec::new();
    for (name, value) in &job.arguments {
        if is_positional(name) {
            continue;
        }
        tokens.extend(render_argument(name, value, job.argument_shapes.get(name)));
    }
    tokens
}

/// Renders the full argv of a job: command path, positional inputs then
/// outputs, then flags in insertion order.
///
/// Rendering is deterministic: the same job always yields byte-identical
/// token sequences.
#[must_use]
pub fn render_job_tokens(job: &Job) -> Vec<String> {
    let mut tokens: Vec<String> = job.command_path.clone();
    tokens.extend(render_positional_tokens(job));
    tokens.extend(render_flag_tokens(job));
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_shape_invariant_rejected() {
        let err = ArgShape::new("bands", 3, Some(2), false);
        assert!(err.is_err());
    }

    #[test]
    fn test_shape_predicates() {
        assert!(ArgShape::scalar("a").is_scalar());
        assert!(ArgShape::tuple("a", 2).is_tuple());
        assert!(ArgShape::repeatable("a").is_repeatable());
        assert!(ArgShape::flag("a").is_flag);
        assert!(!ArgShape::tuple("a", 2).is_repeatable());
    }

    #[test]
    fn test_flag_true_renders_bare_switch() {
        let shape = ArgShape::flag("overwrite");
        assert_eq!(
            render_argument("overwrite", &json!(true), Some(&shape)),
            vec!["--overwrite".to_string()]
        );
    }

    #[test]
    fn test_flag_false_renders_nothing() {
        let shape = ArgShape::flag("overwrite");
        assert!(render_argument("overwrite", &json!(false), Some(&shape)).is_empty());
    }

    #[test]
    fn test_tuple_comma_joins_into_one_token() {
        let shape = ArgShape::tuple("resolution", 2);
        assert_eq!(
            render_argument("resolution", &json!([10, 10]), Some(&shape)),
            vec!["--resolution".to_string(), "10,10".to_string()]
        );
    }

    #[test]
    fn test_repeatable_emits_one_flag_per_element() {
        let shape = ArgShape::repeatable("creation-option");
        assert_eq!(
            render_argument(
                "creation-option",
                &json!(["COMPRESS=LZW", "TILED=YES"]),
                Some(&shape)
            ),
            vec![
                "--creation-option".to_string(),
                "COMPRESS=LZW".to_string(),
                "--creation-option".to_string(),
                "TILED=YES".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_shape_defaults_to_scalar() {
        assert_eq!(
            render_argument("burn", &json!(1), None),
            vec!["--burn".to_string(), "1".to_string()]
        );
        // A list with no declared shape stringifies as one comma token.
        assert_eq!(
            render_argument("bands", &json!([1, 2]), None),
            vec!["--bands".to_string(), "1,2".to_string()]
        );
    }

    #[test]
    fn test_validate_value_rejects_nested_structures() {
        assert!(validate_value("x", &json!({"a": 1})).is_err());
        assert!(validate_value("x", &json!([["nested"]])).is_err());
        assert!(validate_value("x", &json!(["ok", 3])).is_ok());
    }
}
