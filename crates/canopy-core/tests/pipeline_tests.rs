//! Integration tests for the staged build pipeline.
//!
//! Tools are replaced by a recording stub that produces the files the real
//! tools would, so every stage runs against an in-memory filesystem.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use canopy_core::compile::OutputCapture;
use canopy_core::{
    BuildEnvironment, BuildFs, BuildPaths, Diagnostic, FailureKind, MemoryFs, Pipeline,
    PipelineOptions, Stage, StageFailure, StageObserver, ToolInvocation, ToolOutput, ToolRunner,
    Toolchain, VERSION,
};

const WASM_BYTES: &[u8] = b"\0asm\x01\0\0\0stub canister";
const CANDID: &str = "service : { greet : (text) -> (text) query }\n";

// =============================================================================
// Test Helpers
// =============================================================================

fn env() -> BuildEnvironment {
    BuildEnvironment {
        cwd: PathBuf::from("/proj"),
        home_dir: PathBuf::from("/home/dev"),
        module_search_path: vec![PathBuf::from("/proj")],
        site_packages: Vec::new(),
        runtime_dir: PathBuf::from("/runtime"),
    }
}

fn project_fs() -> MemoryFs {
    MemoryFs::new()
        .with_file("/runtime/custom_modules/support.py", "")
        .with_file("/runtime/canopy_generate/Cargo.toml", "[package]\n")
        .with_file("/proj/main.py", "import helpers\n")
        .with_file("/proj/helpers.py", "")
}

fn plan(env: &BuildEnvironment) -> BuildPaths {
    BuildPaths::plan("backend", "main.py", "backend.did", VERSION, env)
        .expect("Failed to plan build paths")
}

/// Short name of a tool call: the program, plus the subcommand for cargo.
fn label(invocation: &ToolInvocation) -> String {
    let program = invocation.program_name();
    match (program.as_str(), invocation.args_lossy().first()) {
        ("cargo", Some(subcommand)) => format!("cargo {subcommand}"),
        _ => program,
    }
}

/// Stand-in for the external tools.
struct StubRunner<'a> {
    fs: &'a MemoryFs,
    paths: BuildPaths,
    fail: Option<(&'static str, ToolOutput)>,
    fail_call: Option<(usize, ToolOutput)>,
    drop_wasm_at_call: Option<usize>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl<'a> StubRunner<'a> {
    fn new(fs: &'a MemoryFs, paths: &BuildPaths) -> Self {
        Self {
            fs,
            paths: paths.clone(),
            fail: None,
            fail_call: None,
            drop_wasm_at_call: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self, label: &'static str, output: ToolOutput) -> Self {
        self.fail = Some((label, output));
        self
    }

    /// Fail the `n`th tool call (1-based), whatever the tool.
    fn failing_call(mut self, n: usize, output: ToolOutput) -> Self {
        self.fail_call = Some((n, output));
        self
    }

    /// Succeed on the `n`th call but delete the binary it was given.
    fn dropping_wasm_at_call(mut self, n: usize) -> Self {
        self.drop_wasm_at_call = Some(n);
        self
    }

    fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    fn labels(&self) -> Vec<String> {
        self.calls().iter().map(label).collect()
    }
}

impl ToolRunner for StubRunner<'_> {
    fn run(&self, invocation: &ToolInvocation) -> canopy_core::Result<ToolOutput> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(invocation.clone());
            calls.len()
        };

        let label = label(invocation);
        if let Some((failing, output)) = &self.fail
            && *failing == label
        {
            return Ok(output.clone());
        }
        if let Some((n, output)) = &self.fail_call
            && *n == call_number
        {
            return Ok(output.clone());
        }
        if self.drop_wasm_at_call == Some(call_number) {
            self.fs.remove_tree(&self.paths.wasm).unwrap();
        }

        match label.as_str() {
            "cargo run" => {
                self.fs
                    .write(&self.paths.generated_source, b"// generated\n")
                    .unwrap();
            }
            "cargo build" => {
                self.fs.write(&self.paths.built_wasm, WASM_BYTES).unwrap();
            }
            "candid-extractor" => return Ok(ToolOutput::ok(CANDID)),
            _ => {}
        }
        Ok(ToolOutput::ok(Vec::<u8>::new()))
    }
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl StageObserver for RecordingObserver {
    fn on_stage_started(&self, stage: Stage) {
        self.events.lock().unwrap().push(format!("start {stage:?}"));
    }

    fn on_stage_completed(&self, stage: Stage, _elapsed: Duration) {
        self.events.lock().unwrap().push(format!("done {stage:?}"));
    }

    fn on_stage_failed(&self, stage: Stage, failure: &StageFailure) {
        self.events
            .lock()
            .unwrap()
            .push(format!("failed {stage:?} {:?}", failure.kind));
    }
}

fn run(
    fs: &MemoryFs,
    runner: &StubRunner<'_>,
    paths: &BuildPaths,
    verbose: bool,
) -> Result<canopy_core::BuildArtifacts, StageFailure> {
    let env = env();
    let toolchain = Toolchain::new(paths).isolated();
    Pipeline::new(paths, &env, fs, runner, toolchain, PipelineOptions { verbose }).run()
}

// =============================================================================
// Successful builds
// =============================================================================

#[test]
fn test_end_to_end_success() {
    let env = env();
    let paths = plan(&env);
    let fs = project_fs();
    let runner = StubRunner::new(&fs, &paths);

    let artifacts = run(&fs, &runner, &paths, false).expect("build should succeed");

    assert_eq!(
        runner.labels(),
        vec![
            "cargo run",
            "rustfmt",
            "cargo build",
            "ic-cdk-optimizer",
            "candid-extractor",
            "ic-wasm",
            "ic-wasm",
        ]
    );

    assert_eq!(artifacts.candid, CANDID);
    assert_eq!(artifacts.gzipped_wasm, PathBuf::from("/proj/.canopy/backend/backend.wasm.gz"));
    assert_eq!(
        artifacts.manifest.files,
        vec![PathBuf::from("/proj/main.py"), PathBuf::from("/proj/helpers.py")]
    );

    assert_eq!(fs.read_to_string(&paths.did_path).unwrap(), CANDID);
    assert_eq!(fs.read_to_string(&paths.generated_did).unwrap(), CANDID);
    assert_eq!(fs.read(&paths.wasm).unwrap(), WASM_BYTES);

    let compressed = fs.read(&paths.gzipped_wasm).unwrap();
    let mut decoded = Vec::new();
    flate2::read::GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut decoded)
        .unwrap();
    assert_eq!(decoded, WASM_BYTES);

    let manifest = fs.read_to_string(&paths.cargo_manifest).unwrap();
    assert!(manifest.contains("name = \"backend\""));
    assert!(fs.exists(&paths.generator_manifest));
    assert!(fs.exists(&paths.python_source_dir.join("support.py")));
    assert!(fs.exists(&paths.python_source_dir.join("helpers.py")));
}

#[test]
fn test_tool_arguments() {
    let env = env();
    let paths = plan(&env);
    let fs = project_fs();
    let runner = StubRunner::new(&fs, &paths);

    run(&fs, &runner, &paths, false).expect("build should succeed");
    let calls = runner.calls();

    let generate = calls[0].args_lossy();
    assert_eq!(
        generate,
        vec![
            "run".to_string(),
            format!("--manifest-path={}", paths.generator_manifest.display()),
            paths.manifest_file.display().to_string(),
            "main".to_string(),
            paths.generated_source.display().to_string(),
        ]
    );
    assert_eq!(calls[0].program, paths.bin_dir.join("cargo"));

    assert_eq!(calls[1].args_lossy()[0], "--edition=2018");
    assert!(calls[2].args_lossy().contains(&"--target=wasm32-unknown-unknown".to_string()));
    assert!(calls[2].args_lossy().contains(&"--package=backend".to_string()));
    assert!(calls[2].args_lossy().contains(&"--release".to_string()));

    let wasm = paths.wasm.display().to_string();
    assert_eq!(calls[3].args_lossy(), vec![wasm.clone(), format!("-o={wasm}")]);

    let candid_metadata = calls[5].args_lossy();
    assert_eq!(
        candid_metadata,
        vec![
            wasm.clone(),
            "-o".to_string(),
            wasm.clone(),
            "metadata".to_string(),
            "candid:service".to_string(),
            "-f".to_string(),
            paths.did_path.display().to_string(),
            "-v".to_string(),
            "public".to_string(),
        ]
    );

    let builder_metadata = calls[6].args_lossy();
    assert_eq!(builder_metadata[4], "cdk");
    assert_eq!(builder_metadata[6], format!("canopy {VERSION}"));

    for call in &calls {
        assert!(
            call.env
                .iter()
                .any(|(key, value)| key == "CARGO_TARGET_DIR" && Path::new(value) == paths.target_dir.as_path()),
            "{} should run with the shared target dir",
            label(call)
        );
        assert_eq!(call.capture, OutputCapture::Captured);
    }
}

#[test]
fn test_observer_sees_every_stage() {
    let env = env();
    let paths = plan(&env);
    let fs = project_fs();
    let runner = StubRunner::new(&fs, &paths);
    let observer = RecordingObserver::default();

    Pipeline::new(
        &paths,
        &env,
        &fs,
        &runner,
        Toolchain::new(&paths).isolated(),
        PipelineOptions::default(),
    )
    .with_observer(&observer)
    .run()
    .expect("build should succeed");

    let events = observer.events.lock().unwrap();
    assert_eq!(events.len(), Stage::ALL.len() * 2);
    assert_eq!(events[0], "start Toolchain");
    assert_eq!(events.last().map(String::as_str), Some("done Compress"));
}

#[test]
fn test_failing_install_script_is_not_fatal() {
    let env = env();
    let paths = plan(&env);
    let fs = project_fs().with_file("/runtime/install_rust_dependencies.sh", "#!/bin/sh\n");
    let runner = StubRunner::new(&fs, &paths)
        .failing("install_rust_dependencies.sh", ToolOutput::failed(1, "no network"));

    run(&fs, &runner, &paths, false).expect("build should succeed");

    let calls = runner.calls();
    assert_eq!(label(&calls[0]), "install_rust_dependencies.sh");
    assert_eq!(calls[0].args_lossy(), vec![VERSION, "1.68.2"]);
    assert_eq!(calls.len(), 8);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_generator_failure_reports_panic_message() {
    let env = env();
    let paths = plan(&env);
    let fs = project_fs();
    let stderr = "   Compiling canopy_generate v0.1.0\n     Running `target/debug/canopy_generate`\nthread 'main' panicked at 'greet: missing return type annotation', src/main.rs:31:9\nnote: run with `RUST_BACKTRACE=1`\n";
    let runner = StubRunner::new(&fs, &paths).failing("cargo run", ToolOutput::failed(101, stderr));

    let failure = run(&fs, &runner, &paths, false).unwrap_err();

    assert_eq!(failure.stage, Stage::Generate);
    assert_eq!(failure.kind, FailureKind::UserCode);
    assert_eq!(
        failure.diagnostic,
        Diagnostic::Extracted("greet: missing return type annotation".to_string())
    );
    assert_eq!(runner.labels(), vec!["cargo run"]);
    assert!(!fs.exists(&paths.gzipped_wasm));
}

#[test]
fn test_failures_short_circuit() {
    let cases = [
        ("rustfmt", Stage::Format, FailureKind::InternalTool, 2),
        ("cargo build", Stage::Compile, FailureKind::Compiler, 3),
        ("ic-cdk-optimizer", Stage::Optimize, FailureKind::PostProcess, 4),
        ("candid-extractor", Stage::Interface, FailureKind::PostProcess, 5),
        ("ic-wasm", Stage::EmbedInterface, FailureKind::PostProcess, 6),
    ];

    for (tool, stage, kind, expected_calls) in cases {
        let env = env();
        let paths = plan(&env);
        let fs = project_fs();
        let runner = StubRunner::new(&fs, &paths).failing(tool, ToolOutput::failed(1, "boom"));

        let failure = run(&fs, &runner, &paths, false).unwrap_err();

        assert_eq!(failure.stage, stage, "{tool}");
        assert_eq!(failure.kind, kind, "{tool}");
        assert_eq!(failure.diagnostic, Diagnostic::Raw("boom".to_string()), "{tool}");
        assert_eq!(runner.calls().len(), expected_calls, "{tool}");
        assert!(!fs.exists(&paths.gzipped_wasm), "{tool}");
    }
}

#[test]
fn test_builder_metadata_failure_stops_build() {
    let env = env();
    let paths = plan(&env);
    let fs = project_fs();
    let runner =
        StubRunner::new(&fs, &paths).failing_call(7, ToolOutput::failed(1, "bad section"));

    let failure = run(&fs, &runner, &paths, false).unwrap_err();

    assert_eq!(failure.stage, Stage::EmbedBuilderInfo);
    assert_eq!(failure.kind, FailureKind::PostProcess);
    assert_eq!(failure.diagnostic, Diagnostic::Raw("bad section".to_string()));
    assert_eq!(runner.labels().len(), 7);
    assert_eq!(runner.calls()[6].args_lossy()[4], "cdk");
    assert!(!fs.exists(&paths.gzipped_wasm));
}

#[test]
fn test_compress_failure_leaves_no_archive() {
    let env = env();
    let paths = plan(&env);
    let fs = project_fs();
    let runner = StubRunner::new(&fs, &paths).dropping_wasm_at_call(7);

    let failure = run(&fs, &runner, &paths, false).unwrap_err();

    assert_eq!(failure.stage, Stage::Compress);
    assert_eq!(failure.kind, FailureKind::PostProcess);
    assert!(matches!(failure.diagnostic, Diagnostic::Raw(_)));
    assert_eq!(runner.calls().len(), 7);
    assert!(!fs.exists(&paths.gzipped_wasm));
    assert!(
        fs.files_under(&paths.canister_dir)
            .iter()
            .all(|path| !path.to_string_lossy().ends_with(".gz.tmp"))
    );
}

#[test]
fn test_verbose_streams_output() {
    let env = env();
    let paths = plan(&env);
    let fs = project_fs();
    let runner = StubRunner::new(&fs, &paths);

    run(&fs, &runner, &paths, true).expect("build should succeed");

    for call in runner.calls() {
        let expected = if label(&call) == "candid-extractor" {
            OutputCapture::StdoutOnly
        } else {
            OutputCapture::Streamed
        };
        assert_eq!(call.capture, expected, "{}", label(&call));
    }
}

#[test]
fn test_verbose_generator_failure_is_not_extracted() {
    let env = env();
    let paths = plan(&env);
    let fs = project_fs();
    let runner = StubRunner::new(&fs, &paths).failing("cargo run", ToolOutput::failed(101, ""));

    let failure = run(&fs, &runner, &paths, true).unwrap_err();

    assert_eq!(failure.kind, FailureKind::UserCode);
    assert_eq!(failure.diagnostic, Diagnostic::Streamed);
}

#[test]
fn test_missing_runtime_template_fails_before_tools() {
    let env = env();
    let paths = plan(&env);
    let fs = MemoryFs::new().with_file("/proj/main.py", "");
    let runner = StubRunner::new(&fs, &paths);

    let failure = run(&fs, &runner, &paths, false).unwrap_err();

    assert_eq!(failure.stage, Stage::Scaffold);
    assert_eq!(failure.kind, FailureKind::Environment);
    assert!(runner.calls().is_empty());
}

#[test]
fn test_unlaunchable_tool_is_environment_failure() {
    struct NoTools;

    impl ToolRunner for NoTools {
        fn run(&self, invocation: &ToolInvocation) -> canopy_core::Result<ToolOutput> {
            Err(canopy_core::Error::tool_spawn(
                &invocation.program,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            ))
        }
    }

    let env = env();
    let paths = plan(&env);
    let fs = project_fs();
    let failure = Pipeline::new(
        &paths,
        &env,
        &fs,
        &NoTools,
        Toolchain::new(&paths).isolated(),
        PipelineOptions::default(),
    )
    .run()
    .unwrap_err();

    assert_eq!(failure.stage, Stage::Generate);
    assert_eq!(failure.kind, FailureKind::Environment);
    assert!(failure.to_string().contains("cargo"));
}
