//! Worklist construction of the module graph.

use std::collections::VecDeque;
use std::path::Path;

use petgraph::graph::NodeIndex;

use crate::error::{Error, Result};
use crate::fs::BuildFs;

use super::resolver::{Located, SearchPath, locate, resolve_relative};
use super::scanner::{ImportStmt, scan_imports};
use super::types::{ModuleGraph, ModuleNode};

/// Builds a [`ModuleGraph`] by scanning sources breadth-first from the entry
/// point. Each identifier is resolved and scanned at most once.
pub struct ModuleGraphBuilder<'a, F: BuildFs + ?Sized> {
    fs: &'a F,
    search_path: &'a SearchPath,
    graph: ModuleGraph,
    worklist: VecDeque<NodeIndex>,
}

impl<'a, F: BuildFs + ?Sized> ModuleGraphBuilder<'a, F> {
    pub fn new(fs: &'a F, search_path: &'a SearchPath) -> Self {
        Self {
            fs,
            search_path,
            graph: ModuleGraph::default(),
            worklist: VecDeque::new(),
        }
    }

    /// Build the transitive import graph of `entry_file`.
    ///
    /// # Errors
    ///
    /// Returns an error if a discovered source file cannot be read.
    pub fn build(mut self, entry_file: &Path) -> Result<ModuleGraph> {
        let script = ModuleNode::Script {
            identifier: entry_file.display().to_string(),
            path: entry_file.to_path_buf(),
        };
        self.add_node(script);

        while let Some(idx) = self.worklist.pop_front() {
            self.scan_node(idx)?;
        }

        tracing::debug!(nodes = self.graph.len(), "module graph complete");
        Ok(self.graph)
    }

    fn scan_node(&mut self, idx: NodeIndex) -> Result<()> {
        let node = &self.graph.graph[idx];
        let Some(path) = node.path().map(Path::to_path_buf) else {
            return Ok(());
        };
        let relative_base = node.relative_base().map(str::to_string);
        let identifier = node.identifier().to_string();

        let bytes = self.fs.read(&path).map_err(|e| Error::fs(&path, e))?;
        // Import statements are ASCII, so sources in other encodings still scan
        let source = String::from_utf8_lossy(&bytes);

        for stmt in scan_imports(&source) {
            match stmt {
                ImportStmt::Import { module } => {
                    self.import_chain(idx, &module);
                }
                ImportStmt::From {
                    level,
                    module,
                    names,
                } => {
                    let target = if level == 0 {
                        module
                    } else {
                        resolve_relative(relative_base.as_deref(), level, module.as_deref())
                    };
                    let Some(target) = target else {
                        tracing::debug!("{identifier}: relative import beyond top-level package");
                        continue;
                    };

                    let Some(target_idx) = self.import_chain(idx, &target) else {
                        continue;
                    };
                    if self.graph.graph[target_idx].package_dirs().is_empty() {
                        continue;
                    }

                    // `from pkg import name` imports pkg.name when it is a
                    // submodule, otherwise name is just an attribute.
                    for name in names.iter().filter(|name| *name != "*") {
                        if let Some(sub_idx) = self.ensure(&format!("{target}.{name}"), true)
                            && sub_idx != idx
                        {
                            self.graph.graph.update_edge(idx, sub_idx, ());
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Import a dotted name and all its parent packages, adding edges from
    /// the importer. Returns the node of the full name.
    fn import_chain(&mut self, importer: NodeIndex, name: &str) -> Option<NodeIndex> {
        let mut last = None;
        let mut end = 0;

        for segment in name.split('.') {
            end += segment.len();
            let prefix = &name[..end];
            end += 1;

            let idx = self.ensure(prefix, false)?;
            if idx != importer {
                self.graph.graph.update_edge(importer, idx, ());
            }
            last = Some(idx);
        }

        last
    }

    /// Return the node for `name`, resolving and adding it if new.
    ///
    /// When `quiet` is set an unresolvable name yields `None` instead of a
    /// [`ModuleNode::Missing`] node.
    fn ensure(&mut self, name: &str, quiet: bool) -> Option<NodeIndex> {
        if let Some(&idx) = self.graph.index.get(name) {
            return Some(idx);
        }

        let located = match name.rsplit_once('.') {
            None => locate(self.fs, self.search_path.entries(), name),
            Some((parent, leaf)) => {
                let parent_idx = self.ensure(parent, quiet)?;
                let dirs = self.graph.graph[parent_idx].package_dirs().to_vec();
                if dirs.is_empty() {
                    None
                } else {
                    locate(self.fs, &dirs, leaf)
                }
            }
        };

        let identifier = name.to_string();
        let node = match located {
            Some(Located::Module(path)) => ModuleNode::SourceModule { identifier, path },
            Some(Located::Package { init, dir }) => ModuleNode::Package {
                identifier,
                init,
                dirs: vec![dir],
            },
            Some(Located::Namespace(dirs)) => ModuleNode::NamespacePackage { identifier, dirs },
            None if quiet => return None,
            None => ModuleNode::Missing { identifier },
        };

        Some(self.add_node(node))
    }

    fn add_node(&mut self, node: ModuleNode) -> NodeIndex {
        let identifier = node.identifier().to_string();
        let idx = self.graph.graph.add_node(node);
        self.graph.index.insert(identifier, idx);
        self.graph.order.push(idx);
        self.worklist.push_back(idx);
        idx
    }
}
