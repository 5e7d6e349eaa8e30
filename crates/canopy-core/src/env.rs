//! Ambient build environment.
//!
//! Everything a build needs from the surrounding process (working directory,
//! home directory, the interpreter's module search path, the runtime template
//! location) is captured once into a [`BuildEnvironment`] and passed down
//! explicitly. Tests construct the value directly instead of touching the
//! process environment.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Overrides the runtime template directory.
pub const RUNTIME_DIR_ENV: &str = "CANOPY_RUNTIME_DIR";

/// Overrides the Python interpreter used to probe the module search path.
pub const PYTHON_ENV: &str = "CANOPY_PYTHON";

/// Prints the interpreter's `sys.path` and site-package directories as JSON.
const PROBE_SCRIPT: &str = "import json, site, sys; \
print(json.dumps({'path': sys.path, 'site': site.getsitepackages() if hasattr(site, 'getsitepackages') else []}))";

/// Ambient inputs of a build, collected in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvironment {
    /// Current working directory. Build trees are rooted here.
    pub cwd: PathBuf,

    /// Home directory. The shared, versioned toolchain cache lives below it.
    pub home_dir: PathBuf,

    /// The interpreter's module search path (`sys.path`), absolute.
    pub module_search_path: Vec<PathBuf>,

    /// Site-package directories of the interpreter, absolute.
    pub site_packages: Vec<PathBuf>,

    /// Runtime template: generator crate, support modules, install script.
    pub runtime_dir: PathBuf,
}

/// JSON shape printed by [`PROBE_SCRIPT`].
#[derive(Debug, Deserialize)]
struct InterpreterPaths {
    path: Vec<String>,
    #[serde(default)]
    site: Vec<String>,
}

impl BuildEnvironment {
    /// Capture the environment of the running process.
    ///
    /// The interpreter probe is best effort: when no interpreter can be run,
    /// `PYTHONPATH` is used as the module search path and no site-package
    /// directories are searched.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory or home directory cannot be
    /// determined, or if no runtime template directory can be found.
    pub fn from_process() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let home_dir = dirs::home_dir()
            .ok_or_else(|| Error::Environment("could not determine home directory".to_string()))?;
        let runtime_dir = Self::detect_runtime_dir()?;

        let (module_search_path, site_packages) = match Self::probe_interpreter(&cwd) {
            Some(paths) => paths,
            None => (Self::python_path_from_env(&cwd), Vec::new()),
        };

        tracing::debug!(
            cwd = %cwd.display(),
            runtime = %runtime_dir.display(),
            search_entries = module_search_path.len(),
            site_entries = site_packages.len(),
            "captured build environment"
        );

        Ok(Self {
            cwd,
            home_dir,
            module_search_path,
            site_packages,
            runtime_dir,
        })
    }

    /// Locate the runtime template directory.
    ///
    /// Tries in order:
    /// 1. `CANOPY_RUNTIME_DIR` environment variable
    /// 2. `runtime/` next to the executable
    /// 3. `../share/canopy/runtime` relative to the executable (installed layout)
    fn detect_runtime_dir() -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(RUNTIME_DIR_ENV) {
            let dir = PathBuf::from(dir);
            if dir.is_dir() {
                return Ok(dir);
            }
            return Err(Error::Environment(format!(
                "{RUNTIME_DIR_ENV} points to {}, which is not a directory",
                dir.display()
            )));
        }

        if let Ok(exe_path) = std::env::current_exe()
            && let Some(exe_dir) = exe_path.parent()
        {
            let candidates = [
                exe_dir.join("runtime"),
                exe_dir.join("../share/canopy/runtime"),
            ];
            if let Some(dir) = candidates.into_iter().find(|dir| dir.is_dir()) {
                return Ok(dir);
            }
        }

        Err(Error::Environment(
            "could not locate the canopy runtime template directory".to_string(),
        ))
    }

    /// Ask the Python interpreter for its search path and site-packages.
    fn probe_interpreter(cwd: &Path) -> Option<(Vec<PathBuf>, Vec<PathBuf>)> {
        let python = match std::env::var_os(PYTHON_ENV) {
            Some(python) => PathBuf::from(python),
            None => which::which("python3").or_else(|_| which::which("python")).ok()?,
        };

        let output = Command::new(&python)
            .args(["-c", PROBE_SCRIPT])
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output();

        let output = match output {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                tracing::warn!(
                    "interpreter probe with {} failed: {}",
                    python.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                return None;
            }
            Err(e) => {
                tracing::warn!("could not run {}: {}", python.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<InterpreterPaths>(&output.stdout) {
            Ok(paths) => Some((
                paths.path.iter().map(|p| anchor(cwd, p)).collect(),
                paths.site.iter().map(|p| anchor(cwd, p)).collect(),
            )),
            Err(e) => {
                tracing::warn!("unexpected interpreter probe output: {}", e);
                None
            }
        }
    }

    /// Fallback search path taken from `PYTHONPATH` plus the working directory.
    fn python_path_from_env(cwd: &Path) -> Vec<PathBuf> {
        let mut path = vec![cwd.to_path_buf()];
        if let Some(python_path) = std::env::var_os("PYTHONPATH") {
            path.extend(std::env::split_paths(&python_path).map(|p| cwd.join(p)));
        }
        path
    }
}

/// Resolve a search-path entry against the working directory.
///
/// The interpreter reports the script directory as an empty string when
/// running with `-c`; that entry means the working directory itself.
fn anchor(cwd: &Path, entry: &str) -> PathBuf {
    if entry.is_empty() {
        cwd.to_path_buf()
    } else {
        cwd.join(entry)
    }
}
