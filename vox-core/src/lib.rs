//! Core compiler for the Vox language.
//!
//! The pipeline is roughly:
//!
//!   source .vx
//!     -> preprocess  (imports inlined, d_if branches resolved)
//!     -> dispatch    (one pass over lines, per-kind lowering)
//!     -> emit        (textual LLVM IR)
//!
//! All mutable state of a run lives in one [`session::Session`]. Front ends
//! (the `vox` CLI, tests) should go through [`compile`] / [`compile_file`]
//! rather than driving the passes themselves.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Constant expressions
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;
pub mod eval;

// ---------------------------------------------------------------------
// Types, symbols and sources
// ---------------------------------------------------------------------

pub mod types;
pub mod session;
pub mod modules;
pub mod preprocess;
pub mod line;

// ---------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------

pub mod expr;
pub mod condition;
pub mod call;
pub mod decl;
pub mod structs;
pub mod function;
pub mod control_flow;
pub mod dispatch;

// ---------------------------------------------------------------------
// Emission and orchestration
// ---------------------------------------------------------------------

pub mod emit;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{CompilationArtifact, CompileOptions, compile, compile_file};
pub use diagnostic::Diagnostic;
pub use error::CoreError;
pub use modules::{ModuleRegistry, SearchRoot};
