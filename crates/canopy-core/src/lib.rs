//! Build engine for Python canisters.
//!
//! This crate provides:
//! - Build path planning from an explicit environment snapshot
//! - Import-graph analysis and bundling of Python sources
//! - Native toolchain invocation behind a replaceable runner
//! - Diagnostic extraction from code generator output
//! - The staged build pipeline and artifact post-processing

pub mod bundle;
pub mod compile;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod fs;
pub mod graph;
pub mod paths;
pub mod pipeline;

pub use bundle::{BundleManifest, ModuleBundler};
pub use compile::{ProcessRunner, ToolInvocation, ToolOutput, ToolRunner, Toolchain};
pub use env::BuildEnvironment;
pub use error::{Error, Result};
pub use fs::{BuildFs, DiskFs, MemoryFs};
pub use graph::{ModuleGraph, ModuleNode};
pub use paths::BuildPaths;
pub use pipeline::{
    BuildArtifacts, Diagnostic, FailureKind, Pipeline, PipelineOptions, Stage, StageFailure,
    StageObserver, VERSION,
};
