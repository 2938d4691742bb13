//! Execution dispatch: one logical job, three interchangeable backends.
//!
//! The backend is selected once at the top of `run` and modeled as a
//! closed set of [`ExecutionBackend`] implementations; the dispatcher
//! never inspects the target's type at runtime. Pipeline-connection logic
//! is fully resolved before dispatch.

mod bridge;
mod native;
mod subprocess;

#[cfg(test)]
mod dispatch_tests;

pub use bridge::BridgeBackend;
pub use native::{NativeBindingBackend, NativeEngine, MIN_BINDING_VERSION};
pub use subprocess::SubprocessBackend;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::capabilities::{CapabilityGate, CliVersionProbe, Version, VersionProbe};
use crate::errors::{CapabilityError, ExecutionError, GdalflowError, SpecError};
use crate::job::{Job, StreamFormat};
use crate::pipeline::{is_virtual_path, Pipeline};
use crate::transpiler::step_argv;

/// The interchangeable execution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Out-of-process invocation of the engine executable.
    Subprocess,
    /// In-process native bindings.
    NativeBinding,
    /// Cross-language bridge through the engine's Python bindings.
    Bridge,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Subprocess => "subprocess",
            Self::NativeBinding => "native-binding",
            Self::Bridge => "bridge",
        };
        f.write_str(name)
    }
}

/// Backend selection: a fixed strategy, or automatic preference.
///
/// Auto prefers the native binding when one is registered and meets the
/// minimum version, falling back to subprocess. The bridge is never
/// auto-selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendChoice {
    /// Prefer native binding, fall back to subprocess.
    #[default]
    Auto,
    /// Use exactly this backend.
    Fixed(BackendKind),
}

/// Explicit credential set merged into the execution environment.
///
/// Replaces the legacy pattern of reading global credential environment
/// variables from deep in the call stack: credentials are passed here and
/// merged only at the environment-injection boundary.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    vars: BTreeMap<String, String>,
}

impl Credentials {
    /// Creates an empty credential set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a credential variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Returns true when no credentials are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn entries(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.vars.iter().map(|(k, v)| (k.clone(), v.clone()))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values are never printed.
        f.debug_struct("Credentials")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Caller options for a single `run` call.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Credentials merged into the environment after job-level variables.
    pub credentials: Credentials,
    /// Caller overrides, merged last (later sources win on collision).
    pub env_overrides: BTreeMap<String, String>,
    /// Whether to attach an audit record to successful results.
    pub audit: bool,
}

impl RunOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the credential set.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Adds a caller environment override.
    #[must_use]
    pub fn env_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }

    /// Enables audit records on successful results.
    #[must_use]
    pub fn with_audit(mut self) -> Self {
        self.audit = true;
        self
    }
}

/// Pipeline execution modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// One backend invocation per job, in order; a failure reports the
    /// 1-based step index and later steps never start.
    Sequential,
    /// One invocation of the engine's own pipeline algorithm; failures
    /// report the pipeline as a whole.
    Native,
}

/// The backend-agnostic shape of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationPlan {
    /// Flat token list for subprocess and native-binding backends.
    pub argv: Vec<String>,
    /// Merged environment, injected into the execution context and never
    /// passed as argv tokens.
    pub env: BTreeMap<String, String>,
    /// Optional standard-input payload (subprocess backend only).
    pub stdin: Option<Vec<u8>>,
    /// Requested output handling.
    pub stream_out: StreamFormat,
    /// The command path, for backends that address commands by name.
    pub command_path: Vec<String>,
    /// Name→value mapping for the bridge backend.
    pub kwargs: Map<String, Value>,
}

/// What a backend produced on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutcome {
    /// Captured standard output; empty for passthrough or discarded modes.
    pub stdout: Vec<u8>,
}

/// One execution strategy. Implementations form a closed set.
pub trait ExecutionBackend: Send + Sync {
    /// Which strategy this is.
    fn kind(&self) -> BackendKind;
    /// Performs one blocking invocation.
    fn invoke(&self, plan: &InvocationPlan) -> Result<RawOutcome, ExecutionError>;
}

/// Decoded output of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedOutput {
    /// Output was discarded or passed through to the console.
    None,
    /// UTF-8 decoded text.
    Text(String),
    /// Raw bytes.
    Raw(Vec<u8>),
    /// Parsed JSON document.
    Json(Value),
}

/// Audit metadata attached to a successful result when enabled.
#[derive(Debug, Clone)]
pub struct RunAudit {
    /// Unique identifier of this run.
    pub run_id: Uuid,
    /// When the invocation started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the backend call.
    pub duration: Duration,
    /// The fully rendered command.
    pub command: String,
    /// Which backend executed it.
    pub backend: BackendKind,
    /// Argument names the caller explicitly set, when the backend and
    /// engine version support introspection.
    pub explicit_arguments: Option<Vec<String>>,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Decoded output per the job's stream format.
    pub output: CapturedOutput,
    /// Audit record, when requested.
    pub audit: Option<RunAudit>,
}

/// Dispatches jobs and pipelines to a selected backend.
pub struct Dispatcher {
    backend: Arc<dyn ExecutionBackend>,
    gate: Arc<CapabilityGate>,
}

impl Dispatcher {
    /// Starts building a dispatcher.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Creates a dispatcher over an explicit backend implementation.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn ExecutionBackend>, gate: Arc<CapabilityGate>) -> Self {
        Self { backend, gate }
    }

    /// The strategy this dispatcher executes on.
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Runs a single job.
    pub fn run_job(&self, job: &Job, options: &RunOptions) -> Result<RunOutcome, GdalflowError> {
        job.validate()?;
        let plan = self.plan_for_job(job, options);
        self.invoke_plan(&plan, job, options)
    }

    /// Runs a pipeline in the requested mode.
    pub fn run_pipeline(
        &self,
        pipeline: &Pipeline,
        mode: PipelineMode,
        options: &RunOptions,
    ) -> Result<RunOutcome, GdalflowError> {
        if pipeline.is_empty() {
            return Err(SpecError::new("cannot run an empty pipeline").into());
        }
        match mode {
            PipelineMode::Sequential => self.run_sequential(pipeline, options),
            PipelineMode::Native => self.run_native(pipeline, options),
        }
    }

    fn run_sequential(
        &self,
        pipeline: &Pipeline,
        options: &RunOptions,
    ) -> Result<RunOutcome, GdalflowError> {
        let mut jobs = pipeline.jobs.clone();
        // A subprocess cannot see another process's in-memory paths, so
        // virtual connections are staged through a per-run temp directory
        // unless the in-process binding can exchange memory datasets.
        let staging = if self.backend.kind() == BackendKind::NativeBinding
            && self.gate.has_feature("mem-dataset-exchange")
        {
            None
        } else {
            self.materialize_virtual_connections(&mut jobs)?
        };

        info!(
            steps = jobs.len(),
            backend = %self.backend.kind(),
            "running pipeline sequentially"
        );
        let mut last = None;
        for (index, job) in jobs.iter().enumerate() {
            let step = index + 1;
            debug!(step, operation = job.operation(), "starting pipeline step");
            let outcome = self.run_job(job, options).map_err(|err| match err {
                GdalflowError::Execution(exec) => GdalflowError::Execution(exec.at_step(step)),
                other => other,
            })?;
            last = Some(outcome);
        }
        drop(staging);
        last.ok_or_else(|| SpecError::new("cannot run an empty pipeline").into())
    }

    fn run_native(
        &self,
        pipeline: &Pipeline,
        options: &RunOptions,
    ) -> Result<RunOutcome, GdalflowError> {
        self.gate.require_feature("pipeline-alg")?;

        let mut argv = vec!["pipeline".to_string()];
        argv.extend(step_argv(pipeline)?);
        let mut env = BTreeMap::new();
        for job in &pipeline.jobs {
            env.extend(job.config_options.clone());
            env.extend(job.env_vars.clone());
        }
        env.extend(options.credentials.entries());
        env.extend(options.env_overrides.clone());

        let first = &pipeline.jobs[0];
        let last = pipeline
            .jobs
            .last()
            .ok_or_else(|| SpecError::new("cannot run an empty pipeline"))?;
        let plan = InvocationPlan {
            argv,
            env,
            stdin: first.stream_in.clone(),
            stream_out: last.stream_out_format,
            command_path: vec!["pipeline".to_string()],
            kwargs: Map::new(),
        };
        info!(
            steps = pipeline.len(),
            backend = %self.backend.kind(),
            "running pipeline as a single native invocation"
        );
        self.invoke_plan(&plan, last, options)
    }

    fn plan_for_job(&self, job: &Job, options: &RunOptions) -> InvocationPlan {
        // Engine configuration options are environment-settable; they are
        // injected first so every later source wins on collision.
        let mut env = BTreeMap::new();
        env.extend(job.config_options.clone());
        env.extend(job.env_vars.clone());
        env.extend(options.credentials.entries());
        env.extend(options.env_overrides.clone());
        InvocationPlan {
            argv: job.to_argv(),
            env,
            stdin: job.stream_in.clone(),
            stream_out: job.stream_out_format,
            command_path: job.command_path.clone(),
            kwargs: job.arguments.clone(),
        }
    }

    fn invoke_plan(
        &self,
        plan: &InvocationPlan,
        job: &Job,
        options: &RunOptions,
    ) -> Result<RunOutcome, GdalflowError> {
        if plan.stdin.is_some() {
            self.gate.require_feature("stream-stdin")?;
        }
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let timer = Instant::now();
        debug!(
            %run_id,
            backend = %self.backend.kind(),
            argv = ?plan.argv,
            "dispatching invocation"
        );
        let raw = self.backend.invoke(plan)?;
        let duration = timer.elapsed();

        let output = decode_output(plan.stream_out, raw.stdout)?;
        let audit = options.audit.then(|| RunAudit {
            run_id,
            started_at,
            duration,
            command: plan.argv.join(" "),
            backend: self.backend.kind(),
            explicit_arguments: (self.backend.kind() == BackendKind::NativeBinding
                && self.gate.has_feature("arg-introspection"))
            .then(|| job.explicit_arg_names()),
        });
        Ok(RunOutcome { output, audit })
    }

    /// Rewrites virtual connecting paths between adjacent jobs to files in
    /// a per-run staging directory, returning the directory guard.
    fn materialize_virtual_connections(
        &self,
        jobs: &mut [Job],
    ) -> Result<Option<tempfile::TempDir>, GdalflowError> {
        let mut staging = None;
        for index in 1..jobs.len() {
            let upstream = jobs[index - 1].output().map(ToString::to_string);
            let downstream = jobs[index].input().map(ToString::to_string);
            let (Some(upstream), Some(downstream)) = (upstream, downstream) else {
                continue;
            };
            if upstream != downstream || !is_virtual_path(&upstream) {
                continue;
            }
            if staging.is_none() {
                staging = Some(tempfile::tempdir()?);
            }
            let Some(dir) = &staging else { continue };
            let staged = dir
                .path()
                .join(format!("stage-{index}.bin"))
                .to_string_lossy()
                .into_owned();
            debug!(step = index, path = %staged, "staging virtual connection");
            jobs[index - 1].set_output(staged.clone());
            jobs[index].set_input(staged);
        }
        Ok(staging)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("backend", &self.backend.kind())
            .finish_non_exhaustive()
    }
}

fn decode_output(
    format: StreamFormat,
    stdout: Vec<u8>,
) -> Result<CapturedOutput, GdalflowError> {
    match format {
        StreamFormat::None | StreamFormat::Stdout => Ok(CapturedOutput::None),
        StreamFormat::Text => Ok(CapturedOutput::Text(
            String::from_utf8_lossy(&stdout).into_owned(),
        )),
        StreamFormat::Raw => Ok(CapturedOutput::Raw(stdout)),
        StreamFormat::Json => {
            let value = serde_json::from_slice(&stdout).map_err(|err| {
                crate::errors::SerializationError::new(format!(
                    "engine output is not valid JSON: {err}"
                ))
            })?;
            Ok(CapturedOutput::Json(value))
        }
    }
}

/// Builder selecting and wiring a backend.
pub struct DispatcherBuilder {
    choice: BackendChoice,
    engine_path: PathBuf,
    interpreter: PathBuf,
    native: Option<Arc<dyn NativeEngine>>,
    gate: Option<Arc<CapabilityGate>>,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self {
            choice: BackendChoice::Auto,
            engine_path: PathBuf::from("gdal"),
            interpreter: PathBuf::from("python3"),
            native: None,
            gate: None,
        }
    }

    /// Sets the backend selection.
    #[must_use]
    pub fn backend(mut self, choice: BackendChoice) -> Self {
        self.choice = choice;
        self
    }

    /// Sets the engine executable path for the subprocess backend.
    #[must_use]
    pub fn engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_path = path.into();
        self
    }

    /// Sets the interpreter used by the bridge backend.
    #[must_use]
    pub fn bridge_interpreter(mut self, path: impl Into<PathBuf>) -> Self {
        self.interpreter = path.into();
        self
    }

    /// Registers an in-process native binding.
    #[must_use]
    pub fn native_engine(mut self, engine: Arc<dyn NativeEngine>) -> Self {
        self.native = Some(engine);
        self
    }

    /// Supplies a pre-built capability gate (useful for tests).
    #[must_use]
    pub fn capability_gate(mut self, gate: Arc<CapabilityGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Selects the backend once and builds the dispatcher.
    pub fn build(self) -> Result<Dispatcher, GdalflowError> {
        let gate = self.gate.unwrap_or_else(|| {
            let probe: Arc<dyn VersionProbe> = match &self.native {
                Some(engine) => Arc::new(CombinedProbe {
                    cli: CliVersionProbe::new(self.engine_path.clone()),
                    binding: engine.version(),
                }),
                None => Arc::new(CliVersionProbe::new(self.engine_path.clone())),
            };
            Arc::new(CapabilityGate::new(probe))
        });

        let backend: Arc<dyn ExecutionBackend> = match self.choice {
            BackendChoice::Fixed(BackendKind::Subprocess) => {
                Arc::new(SubprocessBackend::new(self.engine_path))
            }
            BackendChoice::Fixed(BackendKind::NativeBinding) => {
                let engine = self
                    .native
                    .ok_or_else(|| CapabilityError::new("native-binding"))?;
                Arc::new(NativeBindingBackend::new(engine))
            }
            BackendChoice::Fixed(BackendKind::Bridge) => {
                Arc::new(BridgeBackend::new(self.interpreter))
            }
            BackendChoice::Auto => match self.native {
                Some(engine) if engine.version() >= MIN_BINDING_VERSION => {
                    Arc::new(NativeBindingBackend::new(engine))
                }
                _ => Arc::new(SubprocessBackend::new(self.engine_path)),
            },
        };
        Ok(Dispatcher { backend, gate })
    }
}

struct CombinedProbe {
    cli: CliVersionProbe,
    binding: Version,
}

impl VersionProbe for CombinedProbe {
    fn engine_version(&self) -> Option<Version> {
        self.cli.engine_version()
    }

    fn binding_version(&self) -> Option<Version> {
        Some(self.binding)
    }
}
