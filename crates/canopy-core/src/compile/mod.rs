//! Native toolchain plumbing for canister builds.
//!
//! This module provides:
//! - Toolchain location and the shared cargo environment
//! - Blocking tool execution behind the [`ToolRunner`] seam
//! - Canister Cargo manifest generation

mod cargo_generator;
mod runner;
mod toolchain;

pub use cargo_generator::{
    CANISTER_DEPENDENCIES, CrateDependency, ManifestConfig, OptLevel, ReleaseProfile,
    canister_manifest, generate_cargo_toml,
};
pub use runner::{OutputCapture, ProcessRunner, ToolInvocation, ToolOutput, ToolRunner};
pub use toolchain::{Tool, Toolchain};
