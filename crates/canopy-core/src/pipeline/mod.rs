//! Staged canister build pipeline.

mod postprocess;
mod runner;
mod stage;

pub use postprocess::{ArtifactPostProcessor, gzip_file};
pub use runner::{
    BuildArtifacts, INSTALL_SCRIPT, Pipeline, PipelineOptions, RUST_VERSION, SilentObserver,
    StageObserver, VERSION,
};
pub use stage::{Diagnostic, FailureKind, Stage, StageFailure};
