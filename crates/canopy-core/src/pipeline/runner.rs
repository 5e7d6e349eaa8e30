//! The staged canister build.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::bundle::{BundleManifest, ModuleBundler};
use crate::compile::{
    OutputCapture, Tool, ToolInvocation, ToolOutput, ToolRunner, Toolchain, canister_manifest,
};
use crate::diagnostics;
use crate::env::BuildEnvironment;
use crate::error::Error;
use crate::fs::BuildFs;
use crate::paths::{BuildPaths, WASM_TARGET};

use super::postprocess::ArtifactPostProcessor;
use super::stage::{Diagnostic, FailureKind, Stage, StageFailure};

/// Version of canopy, embedded in every canister it builds.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Rust toolchain version the runtime's install script provisions.
pub const RUST_VERSION: &str = "1.68.2";

/// Toolchain setup script inside the runtime template.
pub const INSTALL_SCRIPT: &str = "install_rust_dependencies.sh";

/// Rust edition the generated source is formatted with.
const GENERATED_EDITION: &str = "2018";

/// Options for a pipeline run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Stream tool output live instead of capturing it.
    pub verbose: bool,
}

/// Receives stage progress. All methods default to no-ops.
pub trait StageObserver {
    /// Called before a stage starts.
    fn on_stage_started(&self, _stage: Stage) {}

    /// Called after a stage completes successfully.
    fn on_stage_completed(&self, _stage: Stage, _elapsed: Duration) {}

    /// Called when a stage fails. No further stages run.
    fn on_stage_failed(&self, _stage: Stage, _failure: &StageFailure) {}
}

/// Observer that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl StageObserver for SilentObserver {}

/// Outputs of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifacts {
    /// Uncompressed, optimized binary.
    pub wasm: PathBuf,
    /// Deployable compressed binary.
    pub gzipped_wasm: PathBuf,
    /// Interface description written for the user.
    pub did_path: PathBuf,
    /// Interface description text.
    pub candid: String,
    /// Files handed to the code generator.
    pub manifest: BundleManifest,
}

/// Runs the canister build stages in order, stopping at the first failure.
///
/// ```text
/// Toolchain ─► Scaffold ─► Bundle ─► Generate ─► Format ─► Compile
///     ─► Optimize ─► Interface ─► EmbedInterface ─► EmbedBuilderInfo ─► Compress
/// ```
pub struct Pipeline<'a, F: BuildFs + ?Sized, R: ToolRunner + ?Sized> {
    paths: &'a BuildPaths,
    env: &'a BuildEnvironment,
    fs: &'a F,
    runner: &'a R,
    toolchain: Toolchain,
    options: PipelineOptions,
    observer: &'a dyn StageObserver,
}

impl<'a, F: BuildFs + ?Sized, R: ToolRunner + ?Sized> Pipeline<'a, F, R> {
    pub fn new(
        paths: &'a BuildPaths,
        env: &'a BuildEnvironment,
        fs: &'a F,
        runner: &'a R,
        toolchain: Toolchain,
        options: PipelineOptions,
    ) -> Self {
        Self {
            paths,
            env,
            fs,
            runner,
            toolchain,
            options,
            observer: &SilentObserver,
        }
    }

    /// Report stage progress to `observer`.
    pub fn with_observer(mut self, observer: &'a dyn StageObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Run every stage.
    ///
    /// # Errors
    ///
    /// Returns the first [`StageFailure`]; later stages do not run.
    pub fn run(&self) -> Result<BuildArtifacts, StageFailure> {
        self.step(Stage::Toolchain, || {
            self.install_toolchain();
            Ok(())
        })?;
        self.step(Stage::Scaffold, || self.scaffold())?;
        let manifest = self.step(Stage::Bundle, || self.bundle())?;
        self.step(Stage::Generate, || self.generate())?;
        self.step(Stage::Format, || self.format())?;
        self.step(Stage::Compile, || self.compile())?;

        let post = ArtifactPostProcessor::new(
            self.paths,
            self.fs,
            self.runner,
            &self.toolchain,
            self.capture(),
        );
        self.step(Stage::Optimize, || post.optimize())?;
        let candid = self.step(Stage::Interface, || post.extract_interface())?;
        self.step(Stage::EmbedInterface, || post.embed_interface())?;
        self.step(Stage::EmbedBuilderInfo, || {
            post.embed_builder_info(&format!("canopy {VERSION}"))
        })?;
        self.step(Stage::Compress, || post.compress())?;

        Ok(BuildArtifacts {
            wasm: self.paths.wasm.clone(),
            gzipped_wasm: self.paths.gzipped_wasm.clone(),
            did_path: self.paths.did_path.clone(),
            candid,
            manifest,
        })
    }

    fn step<T>(
        &self,
        stage: Stage,
        body: impl FnOnce() -> Result<T, StageFailure>,
    ) -> Result<T, StageFailure> {
        tracing::debug!("{stage}");
        self.observer.on_stage_started(stage);
        let start = Instant::now();

        match body() {
            Ok(value) => {
                let elapsed = start.elapsed();
                tracing::debug!("{stage} finished in {:.2}s", elapsed.as_secs_f64());
                self.observer.on_stage_completed(stage, elapsed);
                Ok(value)
            }
            Err(failure) => {
                tracing::debug!("{stage} failed ({:?})", failure.kind);
                self.observer.on_stage_failed(stage, &failure);
                Err(failure)
            }
        }
    }

    fn capture(&self) -> OutputCapture {
        if self.options.verbose {
            OutputCapture::Streamed
        } else {
            OutputCapture::Captured
        }
    }

    fn tool(&self, tool: Tool) -> ToolInvocation {
        ToolInvocation::new(self.toolchain.program(tool))
            .envs(self.toolchain.env())
            .capture(self.capture())
    }

    /// Run the runtime's install script, if it ships one. Failures are only
    /// logged: a previously installed toolchain may still work.
    fn install_toolchain(&self) {
        let script = self.paths.runtime_dir.join(INSTALL_SCRIPT);
        if self.fs.is_file(&script) {
            self.run_install_script(&script);
        } else {
            tracing::debug!("no {INSTALL_SCRIPT} in {}", self.paths.runtime_dir.display());
        }

        let missing = self.toolchain.missing_tools();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|tool| tool.binary_name()).collect();
            tracing::warn!(
                "not found in {} or on PATH: {}",
                self.toolchain.bin_dir().display(),
                names.join(", ")
            );
        }
    }

    fn run_install_script(&self, script: &Path) {
        let invocation = ToolInvocation::new(script)
            .args([VERSION, RUST_VERSION])
            .envs(self.toolchain.env())
            .capture(self.capture());
        match self.runner.run(&invocation) {
            Ok(output) if output.success => {}
            Ok(output) => tracing::warn!(
                "{INSTALL_SCRIPT} exited with {}: {}",
                output
                    .code
                    .map_or_else(|| "signal".to_string(), |code| code.to_string()),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => tracing::warn!("{INSTALL_SCRIPT} could not run: {e}"),
        }
    }

    /// Recreate the canister tree from the runtime template.
    fn scaffold(&self) -> Result<(), StageFailure> {
        let paths = self.paths;
        let fail = |e: Error| StageFailure::from_error(Stage::Scaffold, &e);

        self.fs
            .remove_tree(&paths.canister_dir)
            .map_err(|e| fail(Error::fs(&paths.canister_dir, e)))?;
        self.fs
            .copy_tree(&paths.runtime_dir, &paths.canister_dir)
            .map_err(|e| fail(Error::fs(&paths.runtime_dir, e)))?;
        self.fs
            .write(
                &paths.cargo_manifest,
                canister_manifest(&paths.canister_name).as_bytes(),
            )
            .map_err(|e| fail(Error::fs(&paths.cargo_manifest, e)))
    }

    fn bundle(&self) -> Result<BundleManifest, StageFailure> {
        ModuleBundler::new(self.fs, self.env)
            .bundle(self.paths)
            .map_err(|e| StageFailure::from_error(Stage::Bundle, &e))
    }

    /// `cargo run --manifest-path=<generator> <manifest> <entry module> <lib.rs>`
    fn generate(&self) -> Result<(), StageFailure> {
        let paths = self.paths;
        let invocation = self
            .tool(Tool::Cargo)
            .arg("run")
            .arg(prefixed("--manifest-path=", &paths.generator_manifest))
            .arg(&paths.manifest_file)
            .arg(&paths.entry_module_name)
            .arg(&paths.generated_source);

        match self.runner.run(&invocation) {
            Err(e) => Err(StageFailure::from_error(Stage::Generate, &e)),
            Ok(output) if output.success => Ok(()),
            Ok(output) => {
                let diagnostic = if invocation.capture == OutputCapture::Captured {
                    Diagnostic::Extracted(diagnostics::extract(&output.stderr))
                } else {
                    Diagnostic::Streamed
                };
                Err(StageFailure::new(
                    Stage::Generate,
                    FailureKind::UserCode,
                    diagnostic,
                ))
            }
        }
    }

    fn format(&self) -> Result<(), StageFailure> {
        let invocation = self
            .tool(Tool::Rustfmt)
            .arg(format!("--edition={GENERATED_EDITION}"))
            .arg(&self.paths.generated_source);
        invoke(self.runner, &invocation, Stage::Format, FailureKind::InternalTool)?;
        Ok(())
    }

    fn compile(&self) -> Result<(), StageFailure> {
        let paths = self.paths;
        let invocation = self
            .tool(Tool::Cargo)
            .arg("build")
            .arg(prefixed("--manifest-path=", &paths.cargo_manifest))
            .arg(format!("--target={WASM_TARGET}"))
            .arg(format!("--package={}", paths.canister_name))
            .arg("--release");
        invoke(self.runner, &invocation, Stage::Compile, FailureKind::Compiler)?;
        Ok(())
    }
}

/// Run a tool, turning a launch error or unsuccessful exit into a failure
/// of `stage`. Captured stderr becomes the raw diagnostic.
pub(super) fn invoke<R: ToolRunner + ?Sized>(
    runner: &R,
    invocation: &ToolInvocation,
    stage: Stage,
    kind: FailureKind,
) -> Result<ToolOutput, StageFailure> {
    let output = runner
        .run(invocation)
        .map_err(|e| StageFailure::from_error(stage, &e))?;

    if output.success {
        return Ok(output);
    }

    let streamed = invocation.capture != OutputCapture::Captured;
    Err(StageFailure::new(
        stage,
        kind,
        Diagnostic::from_output(&output.stderr, streamed),
    ))
}

/// `--flag=<path>` as a single argument.
pub(super) fn prefixed(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(path);
    arg
}
