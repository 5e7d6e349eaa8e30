//! Pipeline stages and their failures.

use std::fmt;

use crate::error::Error;

/// One step of a canister build, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Install or update the versioned toolchain.
    Toolchain,
    /// Recreate the build tree from the runtime template.
    Scaffold,
    /// Gather the Python sources.
    Bundle,
    /// Run the code generator.
    Generate,
    /// Format the generated source.
    Format,
    /// Compile the canister crate.
    Compile,
    /// Shrink the binary.
    Optimize,
    /// Extract the interface description.
    Interface,
    /// Embed the interface description as metadata.
    EmbedInterface,
    /// Embed the builder name and version as metadata.
    EmbedBuilderInfo,
    /// Gzip the binary.
    Compress,
}

impl Stage {
    pub const ALL: [Stage; 11] = [
        Stage::Toolchain,
        Stage::Scaffold,
        Stage::Bundle,
        Stage::Generate,
        Stage::Format,
        Stage::Compile,
        Stage::Optimize,
        Stage::Interface,
        Stage::EmbedInterface,
        Stage::EmbedBuilderInfo,
        Stage::Compress,
    ];

    /// Short description used in logs and messages.
    pub fn description(self) -> &'static str {
        match self {
            Self::Toolchain => "preparing toolchain",
            Self::Scaffold => "preparing build directory",
            Self::Bundle => "bundling Python sources",
            Self::Generate => "generating Rust source",
            Self::Format => "formatting generated source",
            Self::Compile => "building Wasm binary",
            Self::Optimize => "optimizing Wasm binary",
            Self::Interface => "extracting Candid interface",
            Self::EmbedInterface => "adding Candid to Wasm",
            Self::EmbedBuilderInfo => "adding cdk name/version to Wasm",
            Self::Compress => "compressing Wasm binary",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Who is likely responsible for a failure, which decides how it is
/// presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The user's Python code was rejected by the code generator.
    UserCode,
    /// A tool failed on input canopy produced itself.
    InternalTool,
    /// The Rust compiler rejected the generated crate.
    Compiler,
    /// Optimizing, annotating or compressing the binary failed.
    PostProcess,
    /// Filesystem or setup problem, including tools that could not launch.
    Environment,
}

/// Detail attached to a stage failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Message extracted from tool output.
    Extracted(String),
    /// Tool output or error text, unprocessed.
    Raw(String),
    /// Tool output was streamed to the console and is not repeated.
    Streamed,
}

impl Diagnostic {
    /// Raw captured output, or [`Diagnostic::Streamed`] if nothing was
    /// captured.
    pub fn from_output(bytes: &[u8], streamed: bool) -> Self {
        if streamed {
            Self::Streamed
        } else {
            Self::Raw(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Extracted(text) | Self::Raw(text) => Some(text),
            Self::Streamed => None,
        }
    }
}

/// A failed pipeline stage. Always terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub diagnostic: Diagnostic,
}

impl StageFailure {
    pub fn new(stage: Stage, kind: FailureKind, diagnostic: Diagnostic) -> Self {
        Self {
            stage,
            kind,
            diagnostic,
        }
    }

    /// Failure caused by an operation error rather than a tool's exit status.
    pub fn from_error(stage: Stage, error: &Error) -> Self {
        Self::new(stage, FailureKind::Environment, Diagnostic::Raw(error.with_hint()))
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.stage)?;
        if let Some(text) = self.diagnostic.text() {
            write!(f, ": {text}")?;
        }
        Ok(())
    }
}

impl std::error::Error for StageFailure {}
