//! # Gdalflow
//!
//! A client-side orchestration layer over the GDAL unified command-line
//! tool. Gdalflow models engine invocations as declarative jobs, composes
//! them into pipelines with implicit connective data flow, serializes
//! both to portable formats, and dispatches them across interchangeable
//! execution backends:
//!
//! - **Jobs and pipelines**: typed specifications with argument
//!   cardinality metadata and exact CLI rendering rules
//! - **Transpiler**: lossless hybrid JSON envelopes and the engine's own
//!   step-delimited native command format
//! - **Dispatch**: subprocess, in-process native binding, and Python
//!   bridge backends behind one blocking `run` call
//! - **Capability gate**: memoized version-based feature detection with
//!   deterministic fallback
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gdalflow::prelude::*;
//!
//! let pipeline = commands::vector::reproject()
//!     .arg("input", "parcels.shp")
//!     .arg("dst-crs", "EPSG:4326")
//!     .finish()?
//!     .then(
//!         commands::vector::rasterize()
//!             .arg("output", "parcels.tif")
//!             .arg("burn", 1)
//!             .finish()?,
//!     )?;
//!
//! let dispatcher = Dispatcher::builder().build()?;
//! let outcome = dispatcher.run_pipeline(
//!     &pipeline,
//!     PipelineMode::Sequential,
//!     &RunOptions::new(),
//! )?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod args;
pub mod capabilities;
pub mod commands;
pub mod dispatch;
pub mod errors;
pub mod job;
pub mod pipeline;
pub mod testing;
pub mod transpiler;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::args::{ArgShape, POSITIONAL_INPUTS, POSITIONAL_OUTPUTS};
    pub use crate::capabilities::{CapabilityGate, CliVersionProbe, Version, VersionProbe};
    pub use crate::commands;
    pub use crate::dispatch::{
        BackendChoice, BackendKind, BridgeBackend, CapturedOutput, Credentials, Dispatcher,
        ExecutionBackend, NativeBindingBackend, NativeEngine, PipelineMode, RunAudit,
        RunOptions, RunOutcome, SubprocessBackend,
    };
    pub use crate::errors::{
        CapabilityError, ExecutionError, GdalflowError, SerializationError, SpecError,
    };
    pub use crate::job::{Job, JobBuilder, StreamFormat};
    pub use crate::pipeline::{is_virtual_path, Pipeline, VIRTUAL_PATH_PREFIXES};
    pub use crate::transpiler::{
        classify, from_native_command, load_pipeline_json, to_hybrid_envelope,
        to_native_command, EnvelopeOptions, FormatKind, HybridEnvelope,
    };
}
