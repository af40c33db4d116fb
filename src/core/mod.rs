// This module gathers the infrastructure shared by every stage of the ravel pipeline:
// session management (a bumpalo arena for interned strings plus compilation statistics),
// the crate-wide error type, and the generic analysis layer made of a dense-id directed
// graph with DFS edge classification and the iterative dominator tree built on top of
// its reverse postorder. None of these pieces know about the IR; the CFG builder maps
// block indices onto graph node ids.

//! Core ravel infrastructure.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based string interning using `bumpalo`
//! - Compilation statistics
//!
//! ## Graph Analysis (`graph`, `dominator`)
//! - Reverse postorder and edge classification
//! - Cooper-Harvey-Kennedy immediate dominators

pub mod dominator;
pub mod error;
pub mod graph;
pub mod session;
pub mod test_utils;

pub use dominator::DominatorTree;
pub use error::{CompileError, CompileResult};
pub use graph::{Edge, EdgeKind, Graph, NodeId};
pub use session::{CompilationSession, SessionStats};
