//! Bidirectional serialization between pipelines and portable formats.
//!
//! Two formats are supported:
//!
//! - the engine-native command string, a step-delimited mini-language
//!   (lossy but interoperable with the engine's own pipeline grammar);
//! - the hybrid JSON envelope, which embeds the native string alongside
//!   full-fidelity per-job specifications for lossless round-trips.

mod detect;
mod hybrid;
mod native;


pub use detect::{classify, load_pipeline_json, FormatKind};
pub use hybrid::{
    load_hybrid, pipeline_from_envelope, read_hybrid_json, save_hybrid, to_hybrid_envelope,
    write_hybrid_json, write_native_json, EnvelopeMetadata, EnvelopeOptions, GdalgSection,
    HybridEnvelope, JobSpec, FORMAT_VERSION, MIN_ENGINE_VERSION, NATIVE_TYPE,
};
pub use native::{from_native_command, step_argv, to_native_command};

/// The reserved token separating pipeline steps in the native format.
pub const STEP_DELIMITER: &str = "!";

/// Category tokens recognized as command-path prefixes when reading the
/// native format back.
pub(crate) const CATEGORY_TOKENS: &[&str] = &["raster", "vector", "mdim"];

/// Maps an operation name to the canonical step name of the engine's
/// pipeline grammar. Most operations are their own step name; the
/// format-conversion and inspection operations map to the generic
/// `write`/`read` steps the grammar expects.
#[must_use]
pub(crate) fn canonical_step_name(operation: &str) -> &str {
    match operation {
        "convert" => "write",
        "info" => "read",
        other => other,
    }
}

/// Inverse of [`canonical_step_name`]. The table is bijective, so reading
/// a command line written by this crate restores the original command
/// path.
#[must_use]
pub(crate) fn operation_for_step(step: &str) -> &str {
    match step {
        "write" => "convert",
        "read" => "info",
        other => other,
    }
}
