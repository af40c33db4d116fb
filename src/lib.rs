//! ravel - ahead-of-time back end for a typed scripting language.
//!
//! ravel takes a type-checked syntax tree, lowers it into a register-based
//! IR, builds a control flow graph and dominator tree per function and
//! generates one C function per closure. The C unit is compiled and bound to
//! the runtime's function prototypes through the [`Host`] callbacks.
//!
//! # Primary Usage
//!
//! ```ignore
//! use ravel::{CompilationSession, Compiler, CompilerOptions, SyntaxTree};
//! use ravel::codegen::RecordingHost;
//! use bumpalo::Bump;
//!
//! let tree = SyntaxTree::from_json(&text)?;
//!
//! // One arena per compilation unit
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//!
//! let compiler = Compiler::new(&session, CompilerOptions::default());
//! let mut host = RecordingHost::new();
//! let root = host.root();
//! let compiled = compiler.compile(&tree, &mut host, root)?;
//! println!("{}", compiled.module.dump());
//! ```
//!
//! # Architecture
//!
//! - [`ast`] - Typed syntax tree input
//! - [`ir`] - Pseudos, instructions, blocks and procs
//! - [`linearizer`] - Syntax tree to IR lowering
//! - [`cfg`] - Control flow graphs and dominators per proc
//! - [`codegen`] - C generation and the host interface
//! - [`core`] - Session, errors and generic graph analysis

pub mod ast;
pub mod cfg;
pub mod check;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod core;
pub mod ir;
pub mod linearizer;

pub use ast::SyntaxTree;
pub use codegen::{CodeGenerator, GeneratedUnit, Host};
pub use compiler::{CompiledUnit, Compiler};
pub use config::CompilerOptions;
pub use crate::core::{CompilationSession, CompileError, CompileResult, SessionStats};
pub use ir::Module;
