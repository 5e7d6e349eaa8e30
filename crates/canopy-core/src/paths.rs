//! Build directory layout.
//!
//! Provides the single, deterministic set of paths a canister build works
//! with. Every stage reads its locations from [`BuildPaths`]; none computes a
//! path on its own.

use std::path::{Path, PathBuf};

use crate::env::BuildEnvironment;
use crate::error::{Error, Result};

/// Name of the per-project directory that holds all canister build trees.
pub const BUILD_DIR_NAME: &str = ".canopy";

/// Rust target triple the canister is compiled for.
pub const WASM_TARGET: &str = "wasm32-unknown-unknown";

/// Directory name of the code generator crate inside the runtime template.
pub const GENERATOR_CRATE_DIR: &str = "canopy_generate";

/// Directory name of the support-module overlay inside the runtime template.
pub const SUPPORT_MODULES_DIR: &str = "custom_modules";

/// Directory layout for one canister build.
///
/// The per-canister tree lives under `.canopy/<canister>` in the working
/// directory; the toolchain and compiled-artifact cache are shared between
/// builds under the versioned config root:
///
/// ```text
/// .canopy/<canister>/
/// ├── Cargo.toml          # Generated canister manifest
/// ├── canopy_generate/    # Code generator crate (from the runtime template)
/// ├── python_source/      # Bundled Python sources
/// ├── file_names.txt      # Manifest handed to the generator
/// ├── src/lib.rs          # Generated Rust source
/// ├── index.did           # Generated interface description
/// ├── <canister>.wasm     # Raw binary
/// └── <canister>.wasm.gz  # Compressed binary
///
/// ~/.config/canopy/<version>/
/// ├── bin/                # cargo, rustfmt, ic-wasm, ...
/// └── target/             # Shared CARGO_TARGET_DIR
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
    /// Canister name the tree is keyed by.
    pub canister_name: String,

    /// The user's entry-point file (absolute).
    pub entry_file: PathBuf,

    /// Logical module name of the entry point (file stem).
    pub entry_module_name: String,

    /// Root of the isolated per-canister build tree.
    pub canister_dir: PathBuf,

    /// Bundled Python sources.
    pub python_source_dir: PathBuf,

    /// Comma-separated list of files for the generator.
    pub manifest_file: PathBuf,

    /// Interface description written for the user.
    pub did_path: PathBuf,

    /// Interface description kept inside the build tree.
    pub generated_did: PathBuf,

    /// Generated Rust source.
    pub generated_source: PathBuf,

    /// Generated canister Cargo manifest.
    pub cargo_manifest: PathBuf,

    /// Cargo manifest of the code generator crate.
    pub generator_manifest: PathBuf,

    /// Runtime template copied into the build tree.
    pub runtime_dir: PathBuf,

    /// Support modules copied into every bundle.
    pub support_modules_dir: PathBuf,

    /// Shared, versioned config root.
    pub config_dir: PathBuf,

    /// Toolchain binaries.
    pub bin_dir: PathBuf,

    /// Shared compiled-artifact cache (`CARGO_TARGET_DIR`).
    pub target_dir: PathBuf,

    /// Binary as produced by cargo inside the shared target directory.
    pub built_wasm: PathBuf,

    /// Per-canister raw binary.
    pub wasm: PathBuf,

    /// Per-canister compressed binary.
    pub gzipped_wasm: PathBuf,
}

impl BuildPaths {
    /// Compute the build layout.
    ///
    /// Pure: performs no I/O. Relative entry and interface paths are anchored
    /// at the environment's working directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the canister name, entry file or
    /// interface path is empty.
    pub fn plan(
        canister_name: &str,
        entry_file: impl AsRef<Path>,
        did_path: impl AsRef<Path>,
        version: &str,
        env: &BuildEnvironment,
    ) -> Result<Self> {
        let entry_file = entry_file.as_ref();
        let did_path = did_path.as_ref();

        if canister_name.is_empty() {
            return Err(Error::InvalidInput("canister name is empty".to_string()));
        }
        if entry_file.as_os_str().is_empty() {
            return Err(Error::InvalidInput("entry point path is empty".to_string()));
        }
        if did_path.as_os_str().is_empty() {
            return Err(Error::InvalidInput(
                "interface description path is empty".to_string(),
            ));
        }

        let entry_file = env.cwd.join(entry_file);
        let entry_module_name = entry_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "entry point has no file name: {}",
                    entry_file.display()
                ))
            })?;

        let canister_dir = env.cwd.join(BUILD_DIR_NAME).join(canister_name);
        let config_dir = env
            .home_dir
            .join(".config")
            .join("canopy")
            .join(version);
        let target_dir = config_dir.join("target");
        let wasm_file = format!("{canister_name}.wasm");

        Ok(Self {
            canister_name: canister_name.to_string(),
            entry_module_name,
            python_source_dir: canister_dir.join("python_source"),
            manifest_file: canister_dir.join("file_names.txt"),
            did_path: env.cwd.join(did_path),
            generated_did: canister_dir.join("index.did"),
            generated_source: canister_dir.join("src").join("lib.rs"),
            cargo_manifest: canister_dir.join("Cargo.toml"),
            generator_manifest: canister_dir.join(GENERATOR_CRATE_DIR).join("Cargo.toml"),
            runtime_dir: env.runtime_dir.clone(),
            support_modules_dir: env.runtime_dir.join(SUPPORT_MODULES_DIR),
            bin_dir: config_dir.join("bin"),
            built_wasm: target_dir.join(WASM_TARGET).join("release").join(&wasm_file),
            wasm: canister_dir.join(&wasm_file),
            gzipped_wasm: canister_dir.join(format!("{wasm_file}.gz")),
            entry_file,
            canister_dir,
            config_dir,
            target_dir,
        })
    }

    /// Whether the shared compiled-artifact cache has not been created yet.
    ///
    /// Only used to warn the user that the first build is slow.
    pub fn is_initial_compile(&self) -> bool {
        !self.target_dir.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> BuildEnvironment {
        BuildEnvironment {
            cwd: PathBuf::from("/work/app"),
            home_dir: PathBuf::from("/home/dev"),
            module_search_path: Vec::new(),
            site_packages: Vec::new(),
            runtime_dir: PathBuf::from("/opt/canopy/runtime"),
        }
    }

    #[test]
    fn test_plan_layout() {
        let paths = BuildPaths::plan("backend", "src/main.py", "src/main.did", "1.2.3", &env())
            .expect("plan should succeed");

        assert_eq!(paths.entry_file, PathBuf::from("/work/app/src/main.py"));
        assert_eq!(paths.entry_module_name, "main");
        assert_eq!(paths.canister_dir, PathBuf::from("/work/app/.canopy/backend"));
        assert_eq!(
            paths.python_source_dir,
            PathBuf::from("/work/app/.canopy/backend/python_source")
        );
        assert_eq!(
            paths.manifest_file,
            PathBuf::from("/work/app/.canopy/backend/file_names.txt")
        );
        assert_eq!(paths.did_path, PathBuf::from("/work/app/src/main.did"));
        assert_eq!(
            paths.generated_source,
            PathBuf::from("/work/app/.canopy/backend/src/lib.rs")
        );
        assert_eq!(
            paths.support_modules_dir,
            PathBuf::from("/opt/canopy/runtime/custom_modules")
        );
        assert_eq!(paths.config_dir, PathBuf::from("/home/dev/.config/canopy/1.2.3"));
        assert_eq!(paths.bin_dir, PathBuf::from("/home/dev/.config/canopy/1.2.3/bin"));
        assert_eq!(
            paths.built_wasm,
            PathBuf::from(
                "/home/dev/.config/canopy/1.2.3/target/wasm32-unknown-unknown/release/backend.wasm"
            )
        );
        assert_eq!(paths.wasm, PathBuf::from("/work/app/.canopy/backend/backend.wasm"));
        assert_eq!(
            paths.gzipped_wasm,
            PathBuf::from("/work/app/.canopy/backend/backend.wasm.gz")
        );
    }

    #[test]
    fn test_absolute_entry_is_kept() {
        let paths = BuildPaths::plan("a", "/elsewhere/app.py", "a.did", "1", &env()).unwrap();
        assert_eq!(paths.entry_file, PathBuf::from("/elsewhere/app.py"));
        assert_eq!(paths.entry_module_name, "app");
    }

    #[test]
    fn test_canister_names_do_not_collide() {
        let a = BuildPaths::plan("frontend", "main.py", "x.did", "1", &env()).unwrap();
        let b = BuildPaths::plan("backend", "main.py", "x.did", "1", &env()).unwrap();
        assert_ne!(a.canister_dir, b.canister_dir);
        assert_ne!(a.wasm, b.wasm);
        // The shared cache is the same for both
        assert_eq!(a.target_dir, b.target_dir);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let a = BuildPaths::plan("c", "main.py", "c.did", "1", &env()).unwrap();
        let b = BuildPaths::plan("c", "main.py", "c.did", "1", &env()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(BuildPaths::plan("", "main.py", "c.did", "1", &env()).is_err());
        assert!(BuildPaths::plan("c", "", "c.did", "1", &env()).is_err());
        assert!(BuildPaths::plan("c", "main.py", "", "1", &env()).is_err());
    }

    #[test]
    fn test_initial_compile_detection() {
        let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
        let env = BuildEnvironment {
            home_dir: temp.path().to_path_buf(),
            ..env()
        };
        let paths = BuildPaths::plan("c", "main.py", "c.did", "1", &env).unwrap();
        assert!(paths.is_initial_compile());

        std::fs::create_dir_all(&paths.target_dir).unwrap();
        assert!(!paths.is_initial_compile());
    }
}
