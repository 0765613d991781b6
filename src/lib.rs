//! `wabbitc` library crate: the Wabbit compiler core.
//!
//! High-level layout:
//! - frontend: `lexer` + `parser` produce the AST (`ast`)
//! - semantic analysis: `check` resolves names against `scope` and types
//!   every expression using the rules in `types`
//! - lowering: `irgen` emits the structured IR defined in `ircode`
//! - back-ends consume the verified IR through the `backend` trait
//!
//! All stages report to one [`diag::Diagnostics`] sink; a stage never runs
//! when its predecessor reported an error.

pub mod ast;
pub mod backend;
pub mod check;
pub mod diag;
pub mod fixtures;
pub mod ircode;
pub mod irgen;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod token;
pub mod types;

use thiserror::Error;

use diag::Diagnostics;
use ircode::IrProgram;
use scope::GlobalSymbols;

#[derive(Debug, Error)]
pub enum CompileError {
    /// One or more error diagnostics were reported; the sink holds them.
    #[error("compilation failed with {} error(s)", .0.error_count())]
    Reported(Diagnostics),
    /// Invariant violation in a later stage; never user-visible under
    /// correct input.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct CompileOutput {
    pub ir: IrProgram,
    pub symbols: GlobalSymbols,
    /// Warnings only; errors abort compilation via `CompileError::Reported`.
    pub diagnostics: Diagnostics,
}

/// Runs the whole pipeline on one source unit. Each stage gates on the
/// previous one: a stage refuses to run once any error diagnostic exists.
pub fn compile(file_name: &str, source: &str) -> Result<CompileOutput, CompileError> {
    let mut diags = Diagnostics::new(file_name);

    let tokens = lexer::tokenize(source, &mut diags);
    if diags.has_errors() {
        return Err(CompileError::Reported(diags));
    }

    let mut program = parser::parse_tokens(tokens, &mut diags);
    if diags.has_errors() {
        return Err(CompileError::Reported(diags));
    }

    let symbols = check::check_program(&mut program, &mut diags);
    if diags.has_errors() {
        return Err(CompileError::Reported(diags));
    }

    let ir = irgen::generate(&program, &symbols)?;
    ircode::verify(&ir).map_err(|error| CompileError::Internal(error.into()))?;

    Ok(CompileOutput {
        ir,
        symbols,
        diagnostics: diags,
    })
}
