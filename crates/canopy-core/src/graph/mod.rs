//! Import graph of a Python entry point.
//!
//! This module provides:
//! - Static import scanning of Python sources
//! - Module resolution against an ordered search path
//! - Breadth-first graph construction from the entry script
//!
//! # Architecture
//!
//! ```text
//! main.py ──► scan_imports ──► locate / resolve_relative ──► ModuleNode
//!                  ▲                                              │
//!                  └──────────────── worklist ◄───────────────────┘
//! ```

mod builder;
mod resolver;
mod scanner;
mod types;

pub use builder::ModuleGraphBuilder;
pub use resolver::{Located, SearchPath, locate, resolve_relative};
pub use scanner::{ImportStmt, scan_imports};
pub use types::{ModuleGraph, ModuleNode, NodeKind};
