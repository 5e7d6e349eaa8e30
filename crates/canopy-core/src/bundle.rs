//! Python source bundling.
//!
//! Gathers every file reachable from the entry point into the canister's
//! `python_source` directory and writes the manifest the code generator reads.

use std::path::{Path, PathBuf};

use crate::env::BuildEnvironment;
use crate::error::{Error, Result};
use crate::fs::BuildFs;
use crate::graph::{ModuleGraph, ModuleGraphBuilder, ModuleNode, NodeKind, SearchPath};
use crate::paths::BuildPaths;

/// Files handed to the code generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleManifest {
    /// Absolute paths of the bundled scripts and single-file modules, in
    /// traversal order. Packages are copied as trees and not listed.
    pub files: Vec<PathBuf>,

    /// Module name of the entry point.
    pub entry_module: String,
}

impl BundleManifest {
    /// Manifest file contents: the file paths joined with commas.
    pub fn to_manifest_string(&self) -> String {
        self.files
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Resolves the entry point's imports and materializes the bundle.
pub struct ModuleBundler<'a, F: BuildFs + ?Sized> {
    fs: &'a F,
    env: &'a BuildEnvironment,
}

impl<'a, F: BuildFs + ?Sized> ModuleBundler<'a, F> {
    pub fn new(fs: &'a F, env: &'a BuildEnvironment) -> Self {
        Self { fs, env }
    }

    /// Bundle the entry point described by `paths`.
    ///
    /// The bundled-source directory is recreated from scratch, so running
    /// this twice on an unchanged tree yields identical results.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the bundle cannot be
    /// written.
    pub fn bundle(&self, paths: &BuildPaths) -> Result<BundleManifest> {
        let graph = self.analyze(&paths.entry_file)?;

        for node in graph.nodes_of_kind(NodeKind::Missing) {
            tracing::debug!(
                "{} not found on the search path (imported by {})",
                node.identifier(),
                graph.importers(node.identifier()).join(", ")
            );
        }

        let out = &paths.python_source_dir;
        self.fs.remove_tree(out).map_err(|e| Error::fs(out, e))?;
        self.fs.create_dir_all(out).map_err(|e| Error::fs(out, e))?;

        let overlay = &paths.support_modules_dir;
        self.fs
            .copy_tree(overlay, out)
            .map_err(|e| Error::fs(overlay, e))?;

        for node in graph.flatten() {
            self.copy_node(node, out)?;
        }

        let manifest = BundleManifest {
            files: manifest_files(&graph),
            entry_module: paths.entry_module_name.clone(),
        };
        self.fs
            .write(&paths.manifest_file, manifest.to_manifest_string().as_bytes())
            .map_err(|e| Error::fs(&paths.manifest_file, e))?;

        tracing::info!(
            modules = graph.len(),
            files = manifest.files.len(),
            "bundled {}",
            paths.entry_file.display()
        );
        Ok(manifest)
    }

    /// Build the import graph of `entry_file` without writing anything.
    pub fn analyze(&self, entry_file: &Path) -> Result<ModuleGraph> {
        let search_path = SearchPath::for_entry(self.env, entry_file);
        tracing::debug!(entries = ?search_path.entries(), "module search path");

        ModuleGraphBuilder::new(self.fs, &search_path).build(entry_file)
    }

    fn copy_node(&self, node: &ModuleNode, out: &Path) -> Result<()> {
        match node {
            ModuleNode::Script { path, .. } | ModuleNode::SourceModule { path, .. } => {
                let Some(file_name) = path.file_name() else {
                    return Ok(());
                };
                self.fs
                    .copy_file(path, &out.join(file_name))
                    .map_err(|e| Error::fs(path, e))
            }
            ModuleNode::Package { identifier, dirs, .. }
            | ModuleNode::NamespacePackage { identifier, dirs } => {
                let dest = out.join(identifier.replace('.', "/"));
                for dir in dirs {
                    self.fs
                        .copy_tree(dir, &dest)
                        .map_err(|e| Error::fs(dir, e))?;
                }
                Ok(())
            }
            ModuleNode::Missing { .. } => Ok(()),
        }
    }
}

/// Script and single-file module paths in traversal order, without
/// duplicates.
fn manifest_files(graph: &ModuleGraph) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for path in graph.flatten().filter_map(ModuleNode::manifest_path) {
        if !files.iter().any(|seen| seen == path) {
            files.push(path.to_path_buf());
        }
    }
    files
}
