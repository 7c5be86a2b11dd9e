#![warn(trivial_numeric_casts)]

//! bfvm is an optimising interpreter for BF programs.
//!
//! Source is parsed into an AST that remembers where every node came
//! from, rewritten by a peephole optimiser into coarser nodes (fused
//! runs, cleared cells, multiply-copy loops) and then executed against
//! a fixed-size tape.

use std::io::{Read, Write};

pub use bfir::{
    parse, CopyTarget, ExprKind, Expression, ParseError, Program, Repeated, MAX_NESTING_DEPTH,
};
pub use diagnostics::{Diagnostic, Position};
pub use execution::{
    execute, CancelToken, Config, ExecutionError, Interpreter, DEFAULT_TAPE_SIZE,
};
pub use peephole::{optimize, optimize_with, OptimisationsFlags};
pub use report::{ExecutionCounts, ExecutionReport};
pub use tape::Tape;

mod bfir;
mod diagnostics;
mod execution;
mod peephole;
mod report;
mod tape;

#[cfg(test)]
mod execution_tests;

/// Anything that can go wrong between source text and a finished run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl Error {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Error::Parse(e) => e.to_diagnostic(),
            Error::Execution(e) => e.to_diagnostic(),
        }
    }
}

/// Parse, optimise and execute `source` in one go.
pub fn run<R: Read, W: Write>(
    source: &str,
    config: Config,
    input: R,
    output: W,
) -> Result<ExecutionReport, Error> {
    let program = optimize(parse(source)?);
    Ok(execute(&program, config, input, output)?)
}
