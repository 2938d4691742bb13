//! Dispatcher tests against the scripted mock backend.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use super::{
    BackendKind, CapturedOutput, Credentials, Dispatcher, PipelineMode, RunOptions,
};
use crate::capabilities::CapabilityGate;
use crate::errors::GdalflowError;
use crate::job::{Job, StreamFormat};
use crate::pipeline::{is_virtual_path, Pipeline};
use crate::testing::{MockBackend, ScriptedProbe};

fn gate() -> Arc<CapabilityGate> {
    Arc::new(CapabilityGate::new(Arc::new(ScriptedProbe::current())))
}

fn dispatcher(backend: &Arc<MockBackend>) -> Dispatcher {
    Dispatcher::with_backend(backend.clone(), gate())
}

fn job(operation: &str, input: Option<&str>, output: Option<&str>) -> Job {
    let mut builder = Job::build(["raster", operation]);
    if let Some(input) = input {
        builder = builder.arg("input", input);
    }
    if let Some(output) = output {
        builder = builder.arg("output", output);
    }
    builder.finish().unwrap()
}

#[test]
fn test_env_merge_order_later_sources_win() {
    let backend = Arc::new(MockBackend::new());
    let target = Job::build(["raster", "reproject"])
        .arg("input", "in.tif")
        .arg("output", "out.tif")
        .env_var("SHARED", "from-job")
        .env_var("JOB_ONLY", "job")
        .config_option("GDAL_CACHEMAX", "512")
        .finish()
        .unwrap();
    let options = RunOptions::new()
        .with_credentials(
            Credentials::new()
                .with_var("SHARED", "from-credentials")
                .with_var("AWS_ACCESS_KEY_ID", "AKIA123"),
        )
        .env_override("SHARED", "from-override");

    dispatcher(&backend).run_job(&target, &options).unwrap();

    let plans = backend.recorded_plans();
    let env = &plans[0].env;
    assert_eq!(env.get("SHARED"), Some(&"from-override".to_string()));
    assert_eq!(env.get("JOB_ONLY"), Some(&"job".to_string()));
    assert_eq!(env.get("AWS_ACCESS_KEY_ID"), Some(&"AKIA123".to_string()));
    assert_eq!(env.get("GDAL_CACHEMAX"), Some(&"512".to_string()));
    // Environment entries never leak into the argv.
    assert!(plans[0].argv.iter().all(|token| !token.contains("AKIA123")));
}

#[test]
fn test_output_decoding_per_stream_format() {
    let backend = Arc::new(MockBackend::new());
    let runner = dispatcher(&backend);

    backend.push_success(br#"{"bands": 3}"#.to_vec());
    let info = Job::build(["raster", "info"])
        .arg("input", "in.tif")
        .stream_out(StreamFormat::Json)
        .finish()
        .unwrap();
    let outcome = runner.run_job(&info, &RunOptions::new()).unwrap();
    assert_eq!(
        outcome.output,
        CapturedOutput::Json(serde_json::json!({"bands": 3}))
    );

    backend.push_success("plain text");
    let text_job = Job::build(["raster", "info"])
        .arg("input", "in.tif")
        .stream_out(StreamFormat::Text)
        .finish()
        .unwrap();
    let outcome = runner.run_job(&text_job, &RunOptions::new()).unwrap();
    assert_eq!(outcome.output, CapturedOutput::Text("plain text".to_string()));

    backend.push_success("ignored");
    let silent = job("reproject", Some("in.tif"), Some("out.tif"));
    let outcome = runner.run_job(&silent, &RunOptions::new()).unwrap();
    assert_eq!(outcome.output, CapturedOutput::None);
}

#[test]
fn test_sequential_halts_on_failing_step() {
    let backend = Arc::new(MockBackend::new());
    backend.push_success(Vec::new());
    backend.push_failure("band 7 does not exist");

    let pipeline = job("reproject", Some("in.tif"), None)
        .then(job("scale", None, None))
        .unwrap()
        .then(job("convert", None, Some("out.png")))
        .unwrap();

    let err = dispatcher(&backend)
        .run_pipeline(&pipeline, PipelineMode::Sequential, &RunOptions::new())
        .unwrap_err();

    // Job 1 ran, job 2 failed, job 3 was never attempted.
    assert_eq!(backend.call_count(), 2);
    match err {
        GdalflowError::Execution(exec) => {
            assert_eq!(exec.step, Some(2));
            assert_eq!(exec.diagnostic, "band 7 does not exist");
        }
        other => panic!("expected execution error, got {other}"),
    }
}

#[test]
fn test_sequential_stages_virtual_connections_through_temp_files() {
    let backend = Arc::new(MockBackend::new());
    let pipeline = job("reproject", Some("in.tif"), None)
        .then(job("convert", None, Some("out.png")))
        .unwrap();
    // The composed connection is virtual in the specification itself.
    assert!(is_virtual_path(pipeline.jobs[0].output().unwrap()));

    dispatcher(&backend)
        .run_pipeline(&pipeline, PipelineMode::Sequential, &RunOptions::new())
        .unwrap();

    let plans = backend.recorded_plans();
    assert_eq!(plans.len(), 2);
    let staged_out = plans[0].argv.last().unwrap().clone();
    assert!(!is_virtual_path(&staged_out));
    assert!(plans[1].argv.contains(&staged_out));
}

#[test]
fn test_native_binding_keeps_in_memory_connections() {
    let backend = Arc::new(MockBackend::with_kind(BackendKind::NativeBinding));
    let pipeline = job("reproject", Some("in.tif"), None)
        .then(job("convert", None, Some("out.png")))
        .unwrap();

    dispatcher(&backend)
        .run_pipeline(&pipeline, PipelineMode::Sequential, &RunOptions::new())
        .unwrap();

    // With memory-dataset exchange available in-process, the virtual
    // connecting path is passed through untouched.
    let plans = backend.recorded_plans();
    assert!(is_virtual_path(plans[0].argv.last().unwrap()));
}

#[test]
fn test_native_binding_without_exchange_stages_to_disk() {
    let backend = Arc::new(MockBackend::with_kind(BackendKind::NativeBinding));
    let old_gate = Arc::new(CapabilityGate::new(Arc::new(ScriptedProbe::new(
        Some(crate::capabilities::Version::new(3, 7, 0)),
        Some(crate::capabilities::Version::new(3, 7, 0)),
    ))));
    let runner = Dispatcher::with_backend(backend.clone(), old_gate);
    let pipeline = job("reproject", Some("in.tif"), None)
        .then(job("convert", None, Some("out.png")))
        .unwrap();

    runner
        .run_pipeline(&pipeline, PipelineMode::Sequential, &RunOptions::new())
        .unwrap();

    let plans = backend.recorded_plans();
    assert!(!is_virtual_path(plans[0].argv.last().unwrap()));
}

#[test]
fn test_stdin_streaming_requires_engine_support() {
    let backend = Arc::new(MockBackend::new());
    let old_gate = Arc::new(CapabilityGate::new(Arc::new(ScriptedProbe::new(
        Some(crate::capabilities::Version::new(3, 8, 0)),
        None,
    ))));
    let runner = Dispatcher::with_backend(backend.clone(), old_gate);
    let streaming = Job::build(["vector", "convert"])
        .arg("input", "/vsistdin/")
        .arg("output", "out.gpkg")
        .stream_in(b"wkt payload".to_vec())
        .finish()
        .unwrap();

    let err = runner.run_job(&streaming, &RunOptions::new()).unwrap_err();
    assert!(matches!(err, GdalflowError::Capability(_)));
    assert_eq!(backend.call_count(), 0);
}

#[test]
fn test_stdin_streaming_passes_on_current_engine() {
    let backend = Arc::new(MockBackend::new());
    let streaming = Job::build(["vector", "convert"])
        .arg("input", "/vsistdin/")
        .arg("output", "out.gpkg")
        .stream_in(b"wkt payload".to_vec())
        .finish()
        .unwrap();

    dispatcher(&backend)
        .run_job(&streaming, &RunOptions::new())
        .unwrap();
    let plans = backend.recorded_plans();
    assert_eq!(plans[0].stdin.as_deref(), Some(b"wkt payload".as_slice()));
}

#[test]
fn test_native_mode_issues_single_invocation() {
    let backend = Arc::new(MockBackend::new());
    let pipeline = job("reproject", Some("in.tif"), None)
        .then(job("convert", None, Some("out.png")))
        .unwrap();

    dispatcher(&backend)
        .run_pipeline(&pipeline, PipelineMode::Native, &RunOptions::new())
        .unwrap();

    let plans = backend.recorded_plans();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].argv[0], "pipeline");
    assert!(plans[0].argv.contains(&"!".to_string()));
    // The conversion step was mapped to the generic write step.
    assert!(plans[0].argv.contains(&"write".to_string()));
}

#[test]
fn test_native_mode_requires_pipeline_capability() {
    let backend = Arc::new(MockBackend::new());
    let old_gate = Arc::new(CapabilityGate::new(Arc::new(ScriptedProbe::new(
        Some(crate::capabilities::Version::new(3, 7, 0)),
        None,
    ))));
    let runner = Dispatcher::with_backend(backend.clone(), old_gate);
    let pipeline = Pipeline::new(job("reproject", Some("in.tif"), Some("out.tif")));

    let err = runner
        .run_pipeline(&pipeline, PipelineMode::Native, &RunOptions::new())
        .unwrap_err();
    assert!(matches!(err, GdalflowError::Capability(_)));
    assert_eq!(backend.call_count(), 0);
}

#[test]
fn test_audit_record_attached_when_enabled() {
    let backend = Arc::new(MockBackend::with_kind(BackendKind::NativeBinding));
    let runner = dispatcher(&backend);
    let target = job("reproject", Some("in.tif"), Some("out.tif"));

    let plain = runner.run_job(&target, &RunOptions::new()).unwrap();
    assert!(plain.audit.is_none());

    let audited = runner
        .run_job(&target, &RunOptions::new().with_audit())
        .unwrap();
    let audit = audited.audit.unwrap();
    assert_eq!(audit.backend, BackendKind::NativeBinding);
    assert!(audit.command.contains("reproject"));
    // Explicit-argument introspection is available on this backend and
    // engine version.
    let explicit = audit.explicit_arguments.unwrap();
    assert!(explicit.contains(&"input".to_string()));
}

#[test]
fn test_audit_omits_introspection_on_subprocess() {
    let backend = Arc::new(MockBackend::new());
    let audited = dispatcher(&backend)
        .run_job(
            &job("reproject", Some("in.tif"), Some("out.tif")),
            &RunOptions::new().with_audit(),
        )
        .unwrap();
    assert!(audited.audit.unwrap().explicit_arguments.is_none());
}

#[test]
fn test_empty_pipeline_rejected_before_dispatch() {
    let backend = Arc::new(MockBackend::new());
    // Not constructible through the public API; built field-wise to
    // exercise the dispatcher's own guard.
    let empty = Pipeline {
        jobs: Vec::new(),
        name: None,
        description: None,
    };
    let err = dispatcher(&backend)
        .run_pipeline(&empty, PipelineMode::Sequential, &RunOptions::new())
        .unwrap_err();
    assert!(matches!(err, GdalflowError::Spec(_)));
    assert_eq!(backend.call_count(), 0);
}

#[test]
fn test_invalid_job_rejected_before_dispatch() {
    let backend = Arc::new(MockBackend::new());
    let mut broken = job("reproject", Some("in.tif"), Some("out.tif"));
    broken.command_path.clear();
    let err = dispatcher(&backend)
        .run_job(&broken, &RunOptions::new())
        .unwrap_err();
    assert!(matches!(err, GdalflowError::Spec(_)));
    assert_eq!(backend.call_count(), 0);
}
