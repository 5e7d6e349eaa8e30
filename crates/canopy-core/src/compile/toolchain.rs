//! Toolchain location for canister builds.
//!
//! Tools are installed per canopy version into the shared config root's
//! `bin` directory by the runtime's install script. Every tool invocation
//! runs with cargo and rustup homes pointed into that root, so builds never
//! touch the user's own Rust installation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::paths::BuildPaths;

/// An external program the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Cargo,
    Rustfmt,
    Optimizer,
    IcWasm,
    CandidExtractor,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::Cargo,
        Tool::Rustfmt,
        Tool::Optimizer,
        Tool::IcWasm,
        Tool::CandidExtractor,
    ];

    /// File name of the executable.
    pub fn binary_name(self) -> &'static str {
        match self {
            Self::Cargo => "cargo",
            Self::Rustfmt => "rustfmt",
            Self::Optimizer => "ic-cdk-optimizer",
            Self::IcWasm => "ic-wasm",
            Self::CandidExtractor => "candid-extractor",
        }
    }
}

/// Locates toolchain binaries and provides the environment they run with.
#[derive(Debug, Clone)]
pub struct Toolchain {
    bin_dir: PathBuf,
    config_dir: PathBuf,
    target_dir: PathBuf,
    search_path_fallback: bool,
}

impl Toolchain {
    /// Toolchain rooted at the build's shared config directory.
    pub fn new(paths: &BuildPaths) -> Self {
        Self {
            bin_dir: paths.bin_dir.clone(),
            config_dir: paths.config_dir.clone(),
            target_dir: paths.target_dir.clone(),
            search_path_fallback: true,
        }
    }

    /// Only use binaries from the config root, never from `PATH`.
    pub fn isolated(mut self) -> Self {
        self.search_path_fallback = false;
        self
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Path of a tool's executable.
    ///
    /// Resolved at call time, since the install script may create the
    /// binaries after the toolchain was set up. A tool missing from the bin
    /// directory is looked up on `PATH`; if it is not found there either the
    /// bin directory path is returned and launching it fails.
    pub fn program(&self, tool: Tool) -> PathBuf {
        let installed = self.bin_dir.join(tool.binary_name());
        if installed.is_file() || !self.search_path_fallback {
            return installed;
        }

        match which::which(tool.binary_name()) {
            Ok(found) => {
                tracing::debug!(
                    "{} not in {}, using {}",
                    tool.binary_name(),
                    self.bin_dir.display(),
                    found.display()
                );
                found
            }
            Err(_) => installed,
        }
    }

    /// Tools that are neither installed nor on `PATH`.
    pub fn missing_tools(&self) -> Vec<Tool> {
        Tool::ALL
            .into_iter()
            .filter(|&tool| !self.program(tool).is_file())
            .collect()
    }

    /// Environment overrides applied to every invocation.
    pub fn env(&self) -> Vec<(String, OsString)> {
        vec![
            ("CARGO_TARGET_DIR".to_string(), self.target_dir.clone().into_os_string()),
            ("CARGO_HOME".to_string(), self.config_dir.clone().into_os_string()),
            ("RUSTUP_HOME".to_string(), self.config_dir.clone().into_os_string()),
        ]
    }
}
