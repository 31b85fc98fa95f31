//! Core of the nalgae string-pipeline language.
//!
//! A nalgae program is a list of one-parameter definitions followed by
//! one top-level expression. Every value is a string. The pipeline is:
//!
//!   source .nalgae
//!     -> lexer        (tokens, ASCII policy on literals)
//!     -> parser       (syntax tree)
//!     -> lower        (name resolution + procedures, one walk)
//!     -> codegen_wasm (wasm-encoder, strings as host handles)
//!     -> executor     (wasmi + runtime string library)
//!
//! Higher-level tools (the CLI, tests) should depend on this crate
//! rather than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------

pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Builtins and the runtime string library
// ---------------------------------------------------------------------

pub mod builtins;
pub mod runtime;

// ---------------------------------------------------------------------
// Middle: resolution and lowering
// ---------------------------------------------------------------------

pub mod ir;
pub mod lower;

// ---------------------------------------------------------------------
// Back-end: code generation, execution and compiler orchestration
// ---------------------------------------------------------------------

pub mod codegen_wasm;
pub mod executor;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{CompilationArtifact, CompileOptions, compile_wasm, emit_ir, run};
pub use error::CoreError;
pub use executor::{TargetExecutor, WasmExecutor};
