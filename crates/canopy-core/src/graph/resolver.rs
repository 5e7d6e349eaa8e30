//! Module search path and name resolution.

use std::path::{Path, PathBuf};

use crate::env::BuildEnvironment;
use crate::fs::BuildFs;

/// Ordered list of directories searched for top-level modules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    entries: Vec<PathBuf>,
}

impl SearchPath {
    /// Create a search path, dropping duplicate entries but keeping order.
    pub fn new(entries: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut deduped: Vec<PathBuf> = Vec::new();
        for entry in entries {
            if !deduped.contains(&entry) {
                deduped.push(entry);
            }
        }
        Self { entries: deduped }
    }

    /// Build the search path for bundling an entry file.
    ///
    /// Interpreter search-path entries are only kept when they live under
    /// the working directory, so that the user's project is searched but the
    /// interpreter's own stdlib is not. The entry file's directory and the
    /// site-package directories follow.
    pub fn for_entry(env: &BuildEnvironment, entry_file: &Path) -> Self {
        let project_entries = env
            .module_search_path
            .iter()
            .filter(|entry| entry.starts_with(&env.cwd))
            .cloned();
        let entry_dir = entry_file.parent().map(Path::to_path_buf);

        Self::new(
            project_entries
                .chain(entry_dir)
                .chain(env.site_packages.iter().cloned()),
        )
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }
}

/// Where a module name was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// A single-file module (`name.py`).
    Module(PathBuf),

    /// A regular package (`name/__init__.py`).
    Package { init: PathBuf, dir: PathBuf },

    /// A namespace package: one or more directories without `__init__.py`.
    Namespace(Vec<PathBuf>),
}

/// Locate a single module name segment in the given directories.
///
/// Follows the interpreter's finder order: within each directory a regular
/// package wins over a module file, and a module file wins over a namespace
/// portion. Namespace portions are only returned when no directory has a
/// regular package or module of that name.
pub fn locate<F: BuildFs + ?Sized>(fs: &F, dirs: &[PathBuf], name: &str) -> Option<Located> {
    let mut portions = Vec::new();

    for dir in dirs {
        let package_dir = dir.join(name);
        let is_dir = fs.is_dir(&package_dir);

        if is_dir {
            let init = package_dir.join("__init__.py");
            if fs.is_file(&init) {
                return Some(Located::Package {
                    init,
                    dir: package_dir,
                });
            }
        }

        let module = dir.join(format!("{name}.py"));
        if fs.is_file(&module) {
            return Some(Located::Module(module));
        }

        if is_dir {
            portions.push(package_dir);
        }
    }

    if portions.is_empty() {
        None
    } else {
        Some(Located::Namespace(portions))
    }
}

/// Resolve a relative import to an absolute module name.
///
/// `package` is the package the importing module belongs to (`a.b` for
/// module `a.b.c` or package `a.b`). Returns `None` when the import reaches
/// beyond the top-level package or the importer has no package.
pub fn resolve_relative(package: Option<&str>, level: usize, module: Option<&str>) -> Option<String> {
    let package = package.filter(|p| !p.is_empty())?;
    let parts: Vec<&str> = package.split('.').collect();

    let keep = parts.len().checked_sub(level.checked_sub(1)?)?;
    if keep == 0 {
        return None;
    }

    let mut name = parts[..keep].join(".");
    if let Some(module) = module {
        name.push('.');
        name.push_str(module);
    }
    Some(name)
}
