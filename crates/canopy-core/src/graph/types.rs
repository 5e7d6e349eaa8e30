//! Types for the module graph.

use std::path::{Path, PathBuf};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

/// A unit reachable from the entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleNode {
    /// The entry-point file itself.
    Script { identifier: String, path: PathBuf },

    /// A single-file module (`name.py`).
    SourceModule { identifier: String, path: PathBuf },

    /// A regular package. `dirs` holds the package directory.
    Package {
        identifier: String,
        init: PathBuf,
        dirs: Vec<PathBuf>,
    },

    /// A namespace package: directories without `__init__.py`. Has no file.
    NamespacePackage { identifier: String, dirs: Vec<PathBuf> },

    /// An import that could not be found on the search path (stdlib and
    /// builtin modules provided by the runtime end up here). Has no file.
    Missing { identifier: String },
}

/// Discriminant of [`ModuleNode`], for display and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Script,
    SourceModule,
    Package,
    NamespacePackage,
    Missing,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Script => "script",
            Self::SourceModule => "module",
            Self::Package => "package",
            Self::NamespacePackage => "namespace package",
            Self::Missing => "missing module",
        };
        f.write_str(name)
    }
}

impl ModuleNode {
    /// Qualified name (dotted for modules, the file path for the script).
    pub fn identifier(&self) -> &str {
        match self {
            Self::Script { identifier, .. }
            | Self::SourceModule { identifier, .. }
            | Self::Package { identifier, .. }
            | Self::NamespacePackage { identifier, .. }
            | Self::Missing { identifier } => identifier,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Script { .. } => NodeKind::Script,
            Self::SourceModule { .. } => NodeKind::SourceModule,
            Self::Package { .. } => NodeKind::Package,
            Self::NamespacePackage { .. } => NodeKind::NamespacePackage,
            Self::Missing { .. } => NodeKind::Missing,
        }
    }

    /// Backing file of the node. `None` is the "no path" sentinel of
    /// namespace packages and missing modules.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Script { path, .. } | Self::SourceModule { path, .. } => Some(path),
            Self::Package { init, .. } => Some(init),
            Self::NamespacePackage { .. } | Self::Missing { .. } => None,
        }
    }

    /// File to hand to the generator, if this node is compiled on its own.
    ///
    /// Packages are copied as trees and never listed; sentinel nodes have no
    /// file to list.
    pub fn manifest_path(&self) -> Option<&Path> {
        match self {
            Self::Script { .. } | Self::SourceModule { .. } => self.path(),
            _ => None,
        }
    }

    /// Directories searched for submodules of this node.
    pub fn package_dirs(&self) -> &[PathBuf] {
        match self {
            Self::Package { dirs, .. } | Self::NamespacePackage { dirs, .. } => dirs,
            _ => &[],
        }
    }

    /// Package that relative imports inside this node are resolved against.
    pub fn relative_base(&self) -> Option<&str> {
        match self {
            Self::Package { identifier, .. } => Some(identifier),
            Self::SourceModule { identifier, .. } => {
                identifier.rsplit_once('.').map(|(parent, _)| parent)
            }
            _ => None,
        }
    }
}

/// The entry point's import graph.
///
/// Nodes are keyed by identifier; edges go from importer to imported.
/// [`ModuleGraph::flatten`] yields nodes in discovery order, which is
/// deterministic for a given source tree.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    pub(crate) graph: DiGraph<ModuleNode, ()>,
    pub(crate) index: FxHashMap<String, NodeIndex>,
    pub(crate) order: Vec<NodeIndex>,
}

impl ModuleGraph {
    /// The entry-point node, if the graph is non-empty.
    pub fn root(&self) -> Option<&ModuleNode> {
        self.order.first().map(|&idx| &self.graph[idx])
    }

    /// All reachable nodes in traversal order.
    pub fn flatten(&self) -> impl Iterator<Item = &ModuleNode> {
        self.order.iter().map(|&idx| &self.graph[idx])
    }

    /// Look up a node by identifier.
    pub fn get(&self, identifier: &str) -> Option<&ModuleNode> {
        self.index.get(identifier).map(|&idx| &self.graph[idx])
    }

    /// Identifiers of the modules importing `identifier`.
    pub fn importers(&self, identifier: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(identifier) else {
            return Vec::new();
        };
        let mut importers: Vec<&str> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|importer| self.graph[importer].identifier())
            .collect();
        importers.sort_unstable();
        importers
    }

    /// Identifiers of the modules `identifier` imports directly.
    pub fn imports(&self, identifier: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(identifier) else {
            return Vec::new();
        };
        let mut imports: Vec<&str> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|imported| self.graph[imported].identifier())
            .collect();
        imports.sort_unstable();
        imports
    }

    /// Nodes of a given kind, in traversal order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &ModuleNode> {
        self.flatten().filter(move |node| node.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
