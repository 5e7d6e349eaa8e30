//! Build command implementation for canopy CLI.
//!
//! Drives the canister pipeline and renders its progress and failures.

use std::cell::Cell;
use std::path::Path;
use std::time::{Duration, Instant};

use canopy_core::pipeline::{Diagnostic, FailureKind, Stage, StageFailure, StageObserver};
use canopy_core::{
    BuildEnvironment, BuildPaths, DiskFs, Pipeline, PipelineOptions, ProcessRunner, Toolchain,
    VERSION,
};

use crate::colors;

/// Issue tracker for internal errors.
const ISSUES_URL: &str = concat!(env!("CARGO_PKG_REPOSITORY"), "/issues/new");

/// Community support channel for problems with user code.
const DISCUSSIONS_URL: &str = concat!(env!("CARGO_PKG_REPOSITORY"), "/discussions");

/// Result type for CLI operations.
pub type CliResult<T = ()> = anyhow::Result<T>;

/// How a build ended, once it got as far as running the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Built,
    Failed,
}

/// Positional arguments of a build.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub canister_name: &'a str,
    pub entry_point: &'a str,
    pub did_path: &'a str,
}

/// Build a canister.
pub fn execute(request: &BuildRequest<'_>, verbose: bool) -> CliResult<Outcome> {
    if !Path::new(request.entry_point).is_file() {
        anyhow::bail!(
            "Entry point not found: {} (current directory: {})",
            request.entry_point,
            std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "<unknown>".to_string())
        );
    }

    let env = BuildEnvironment::from_process().map_err(|e| anyhow::anyhow!(e.with_hint()))?;
    let paths = BuildPaths::plan(
        request.canister_name,
        request.entry_point,
        request.did_path,
        VERSION,
        &env,
    )?;
    let is_initial_compile = paths.is_initial_compile();

    let mode = if verbose { " in verbose mode" } else { "" };
    println!(
        "\nBuilding canister {}{mode}\n",
        colors::paint(colors::GREEN, request.canister_name)
    );
    if is_initial_compile {
        println!(
            "{}",
            colors::paint(
                colors::YELLOW,
                "Initial build takes a few minutes. Don't panic. Subsequent builds will be faster.\n"
            )
        );
    }

    let progress = ProgressReporter::new(is_initial_compile, verbose);
    let result = Pipeline::new(
        &paths,
        &env,
        &DiskFs,
        &ProcessRunner,
        Toolchain::new(&paths),
        PipelineOptions { verbose },
    )
    .with_observer(&progress)
    .run();

    match result {
        Ok(artifacts) => {
            println!(
                "\n🎉 Built canister {} at {}",
                colors::paint(colors::GREEN, request.canister_name),
                colors::paint(colors::DIM, artifacts.gzipped_wasm.display())
            );
            Ok(Outcome::Built)
        }
        Err(failure) => {
            report_failure(&failure);
            Ok(Outcome::Failed)
        }
    }
}

/// Console phases. Several pipeline stages are reported as one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    CompilePython,
    BuildWasm,
    OptimizeWasm,
}

impl Phase {
    fn of(stage: Stage) -> Option<Self> {
        match stage {
            Stage::Toolchain | Stage::Scaffold => None,
            Stage::Bundle | Stage::Generate | Stage::Format => Some(Self::CompilePython),
            Stage::Compile => Some(Self::BuildWasm),
            Stage::Optimize
            | Stage::Interface
            | Stage::EmbedInterface
            | Stage::EmbedBuilderInfo
            | Stage::Compress => Some(Self::OptimizeWasm),
        }
    }

    fn first_stage(self) -> Stage {
        match self {
            Self::CompilePython => Stage::Bundle,
            Self::BuildWasm => Stage::Compile,
            Self::OptimizeWasm => Stage::Optimize,
        }
    }

    fn last_stage(self) -> Stage {
        match self {
            Self::CompilePython => Stage::Format,
            Self::BuildWasm => Stage::Compile,
            Self::OptimizeWasm => Stage::Compress,
        }
    }

    fn label(self, is_initial_compile: bool) -> String {
        let empathy = if is_initial_compile {
            " (❤ hang in there, this will be faster next time)"
        } else {
            ""
        };
        match self {
            Self::CompilePython => "[1/3] 🔨 Compiling Python...".to_string(),
            Self::BuildWasm => format!("[2/3] 🚧 Building Wasm binary...{empathy}"),
            Self::OptimizeWasm => format!("[3/3] 🚀 Optimizing Wasm binary...{empathy}"),
        }
    }
}

/// Prints one line per phase and rewrites it with the elapsed time.
struct ProgressReporter {
    is_initial_compile: bool,
    verbose: bool,
    phase_started: Cell<Option<Instant>>,
}

impl ProgressReporter {
    fn new(is_initial_compile: bool, verbose: bool) -> Self {
        Self {
            is_initial_compile,
            verbose,
            phase_started: Cell::new(None),
        }
    }
}

impl StageObserver for ProgressReporter {
    fn on_stage_started(&self, stage: Stage) {
        let Some(phase) = Phase::of(stage) else {
            return;
        };
        if phase.first_stage() == stage {
            println!("{}", phase.label(self.is_initial_compile));
            colors::flush_stdout();
            self.phase_started.set(Some(Instant::now()));
        }
    }

    fn on_stage_completed(&self, stage: Stage, _elapsed: Duration) {
        let Some(phase) = Phase::of(stage) else {
            return;
        };
        if phase.last_stage() != stage {
            return;
        }

        let seconds = self
            .phase_started
            .take()
            .map_or(0.0, |started| started.elapsed().as_secs_f64());
        let label = phase.label(self.is_initial_compile);

        if self.verbose {
            println!("{label} finished in {seconds:.2}s");
        } else {
            println!(
                "{}{label} {}",
                colors::CURSOR_UP,
                colors::paint(colors::DIM, format!("{seconds:.2}s"))
            );
        }
    }
}

/// Print a stage failure the way its kind calls for.
fn report_failure(failure: &StageFailure) {
    let headline = match failure.kind {
        FailureKind::UserCode => {
            "Something about your Python code violates canopy's requirements".to_string()
        }
        FailureKind::InternalTool => format!(
            "canopy has experienced an internal error while {}",
            failure.stage.description()
        ),
        FailureKind::Compiler | FailureKind::PostProcess | FailureKind::Environment => {
            format!("Error {}:", failure.stage.description())
        }
    };
    eprintln!("{}", colors::paint(colors::RED, format!("\n💣 {headline}\n")));

    match &failure.diagnostic {
        Diagnostic::Extracted(message) => eprintln!("{}", colors::paint(colors::RED, message)),
        Diagnostic::Raw(output) => eprintln!("{output}"),
        Diagnostic::Streamed => eprintln!("{}", colors::paint(colors::DIM, "(see output above)")),
    }

    if let Some(help) = support_message(failure.kind) {
        eprintln!("\n{help}\n");
    }

    eprintln!("💀 Build failed");
}

/// Where to get help for failures canopy cannot explain on its own.
fn support_message(kind: FailureKind) -> Option<String> {
    match kind {
        FailureKind::UserCode => Some(format!(
            "If you are unable to decipher the error above, ask for help in the discussions at\n\n{DISCUSSIONS_URL}"
        )),
        FailureKind::InternalTool => Some(format!(
            "Please open an issue at {ISSUES_URL}\nincluding this message and the error above."
        )),
        FailureKind::Compiler | FailureKind::PostProcess | FailureKind::Environment => None,
    }
}
