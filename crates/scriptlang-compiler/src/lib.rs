//! ScriptLang compiler: lexer, parser, semantic analysis, and bytecode
//! emission.
//!
//! - [`lexer`] / [`parser`] - source text to AST.
//! - [`types`] / [`symtab`] - the type graph and lexically scoped symbol table.
//! - `first_pass` / `const_eval` / `second_pass` - semantic analysis.
//! - `bind` - lowers the checked AST into a bound tree.
//! - `emitter` - bytecode lowering with label fixups.
//! - `disasm` - recovers assembly from a [`scriptlang_bytecode::CompiledProgram`].
//! - [`diagnostics`] - error/warning reporting.
//!
//! Never installs a global `tracing` subscriber; only `scriptlang-cli` does,
//! so this crate stays embeddable in a host binary with its own logging.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod ast;
pub mod bind;
pub mod const_eval;
pub mod diagnostics;
pub mod disasm;
pub mod emitter;
pub mod first_pass;
pub mod lexer;
pub mod native_db;
pub mod parser;
pub mod second_pass;
pub mod session;
pub mod symtab;
pub mod types;

pub use diagnostics::{Diagnostics, DiagnosticsPrinter, Severity};

/// Errors that are not recoverable source-level diagnostics: malformed
/// compiled-program bytes, emitter invariant violations, or fuel exhaustion
/// on a pathologically deep expression. See [`diagnostics`] for the
/// error-taxonomy `Kind` used for ordinary compile errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The emitter refuses to run while diagnostics contain errors.
    #[error("cannot emit bytecode: {} error(s) in diagnostics", .0.error_count())]
    HasDiagnosticErrors(Diagnostics),

    /// Parsing fuel exhausted (expression nesting too deep).
    #[error("parse fuel exhausted: expression nesting exceeded {limit}")]
    ParseFuelExhausted { limit: u32 },

    /// A `scriptlang_bytecode::DisasmError` bubbled up through the front end.
    #[error(transparent)]
    Disasm(#[from] scriptlang_bytecode::DisasmError),

    /// The emitter hit an invariant it couldn't satisfy (not a source-level
    /// diagnostic — those are rejected earlier via `HasDiagnosticErrors`).
    #[error(transparent)]
    Emit(#[from] emitter::EmitError),
}

pub type Result<T> = std::result::Result<T, Error>;
