//! The engine-native command-string format.
//!
//! Forward: each job renders to a pipeline step (trailing operation mapped
//! to its canonical step name), steps joined by the reserved `!` token.
//! Reverse: best-effort parsing back into jobs; argument cardinality,
//! config options, and environment variables are permanently lost across
//! this boundary.

use serde_json::{Map, Value};
use tracing::debug;

use super::{canonical_step_name, operation_for_step, CATEGORY_TOKENS, STEP_DELIMITER};
use crate::args::{self, ArgShape};
use crate::errors::SerializationError;
use crate::job::Job;
use crate::pipeline::Pipeline;

/// Renders one job as the token sequence of a pipeline step.
fn step_tokens(job: &Job) -> Vec<String> {
    let mut tokens: Vec<String> = job.command_path.clone();
    if let Some(last) = tokens.last_mut() {
        *last = canonical_step_name(last).to_string();
    }
    tokens.extend(args::render_positional_tokens(job));
    tokens.extend(args::render_flag_tokens(job));
    tokens
}

/// Quotes a token for the native mini-language.
///
/// Tokens containing whitespace or the step delimiter are wrapped in
/// single quotes. Embedded single quotes are a documented limitation of
/// the upstream grammar and are rejected rather than silently mangled.
fn quote_token(token: &str) -> Result<String, SerializationError> {
    if token.contains('\'') {
        return Err(SerializationError::new(format!(
            "token {token:?} contains a single quote, which the native format cannot escape"
        ))
        .with_key(token.to_string()));
    }
    if token.chars().any(char::is_whitespace) || token.contains(STEP_DELIMITER) {
        return Ok(format!("'{token}'"));
    }
    Ok(token.to_string())
}

/// Serializes a pipeline to the engine-native command string.
pub fn to_native_command(pipeline: &Pipeline) -> Result<String, SerializationError> {
    if pipeline.is_empty() {
        return Err(SerializationError::new(
            "cannot serialize an empty pipeline to the native format",
        ));
    }
    let mut steps = Vec::with_capacity(pipeline.len());
    for job in &pipeline.jobs {
        let tokens = step_tokens(job)
            .iter()
            .map(|token| quote_token(token))
            .collect::<Result<Vec<_>, _>>()?;
        steps.push(tokens.join(" "));
    }
    let command = steps.join(&format!(" {STEP_DELIMITER} "));
    debug!(steps = pipeline.len(), "serialized pipeline to native command");
    Ok(command)
}

/// Returns the argv form of the native pipeline command: unquoted step
/// tokens with bare `!` separator tokens, suitable for a single
/// `pipeline` invocation.
pub fn step_argv(pipeline: &Pipeline) -> Result<Vec<String>, SerializationError> {
    if pipeline.is_empty() {
        return Err(SerializationError::new(
            "cannot serialize an empty pipeline to the native format",
        ));
    }
    let mut argv = Vec::new();
    for (index, job) in pipeline.jobs.iter().enumerate() {
        if index > 0 {
            argv.push(STEP_DELIMITER.to_string());
        }
        argv.extend(step_tokens(job));
    }
    Ok(argv)
}

/// Splits a native command line into tokens, respecting single-quoted
/// spans. Quotes carry no escape mechanism.
fn tokenize(command: &str) -> Result<Vec<String>, SerializationError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;
    for ch in command.chars() {
        match ch {
            '\'' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if in_quotes {
        return Err(SerializationError::new(
            "unterminated single quote in native command line",
        ));
    }
    if has_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Parses one step's tokens back into a job.
///
/// Flags become scalar strings (comma values are not re-split, since
/// cardinality cannot be recovered); a trailing bare flag becomes a
/// boolean switch. The step name decides positional roles, then maps
/// back through the bijective step-name table so the command path
/// round-trips.
fn parse_step(tokens: &[String]) -> Result<Job, SerializationError> {
    let first = tokens
        .first()
        .ok_or_else(|| SerializationError::new("empty step in native command line"))?;
    if first.starts_with("--") {
        return Err(SerializationError::new(format!(
            "step starts with flag token '{first}' instead of a step name"
        ))
        .with_key(first.clone()));
    }

    let mut command_path = vec![first.clone()];
    let mut index = 1;
    if CATEGORY_TOKENS.contains(&first.as_str()) {
        if let Some(second) = tokens.get(1) {
            if !second.starts_with("--") {
                command_path.push(second.clone());
                index = 2;
            }
        }
    }

    let mut arguments = Map::new();
    let mut shapes = std::collections::HashMap::new();
    let mut positionals = Vec::new();
    while index < tokens.len() {
        let token = &tokens[index];
        if let Some(name) = token.strip_prefix("--") {
            match tokens.get(index + 1) {
                Some(value) if !value.starts_with("--") => {
                    arguments.insert(name.to_string(), Value::String(value.clone()));
                    index += 2;
                }
                _ => {
                    // Valueless flag: a bare boolean switch.
                    arguments.insert(name.to_string(), Value::Bool(true));
                    shapes.insert(name.to_string(), ArgShape::flag(name));
                    index += 1;
                }
            }
        } else {
            positionals.push(token.clone());
            index += 1;
        }
    }

    let step_name = command_path
        .last()
        .map_or(String::new(), Clone::clone);
    if let Some(last) = command_path.last_mut() {
        *last = operation_for_step(last).to_string();
    }
    let mut job = Job {
        command_path,
        arguments,
        argument_shapes: shapes,
        ..Job::default()
    };
    match positionals.as_slice() {
        [] => {}
        [only] => {
            if step_name == "write" {
                job.set_output(only.clone());
            } else {
                job.set_input(only.clone());
            }
        }
        [first, .., last] => {
            job.set_input(first.clone());
            job.set_output(last.clone());
        }
    }
    Ok(job)
}

/// Parses an engine-native command line back into a pipeline.
pub fn from_native_command(command: &str) -> Result<Pipeline, SerializationError> {
    let tokens = tokenize(command)?;
    if tokens.is_empty() {
        return Err(SerializationError::new("empty native command line"));
    }
    let mut jobs = Vec::new();
    for step in tokens.split(|token| token.as_str() == STEP_DELIMITER) {
        jobs.push(parse_step(step)?);
    }
    Pipeline::from_jobs(jobs)
        .map_err(|err| SerializationError::new(err.to_string()))
}
