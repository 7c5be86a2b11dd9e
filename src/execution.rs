//! Execution of BF programs, optimised or not.
//!
//! The interpreter walks the tree depth first, keeping a fixed-size
//! tape, a pointer and a counter per node kind. Reads and writes go
//! through the `Read` and `Write` handles it was built with.

use crate::bfir::Expression::{
    Input, LoadZero, MultiplePointerDecrement, MultiplePointerIncrement, MultipleValueDecrement,
    MultipleValueIncrement, Output, PointerDecrement, PointerIncrement, ValueDecrement,
    ValueIncrement, While,
};
use crate::bfir::{CopyTarget, Expression, Program};
use crate::diagnostics::{Diagnostic, Position};
use crate::report::{ExecutionCounts, ExecutionReport};
use crate::tape::Tape;
use std::io::{self, Read, Write};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_TAPE_SIZE: NonZeroUsize = match NonZeroUsize::new(30_000) {
    Some(size) => size,
    None => panic!("tape size must be positive"),
};

/// How a run treats its tape and its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Number of cells on the tape.
    pub tape_size: NonZeroUsize,
    /// Raise an error when the pointer would leave the tape or a cell
    /// would leave 0..=255. When off, cells wrap around and the
    /// pointer may wander off the tape.
    pub overflow_checking: bool,
    /// Report running out of input as an error rather than ending the
    /// run quietly.
    pub raise_on_input_exhaustion: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tape_size: DEFAULT_TAPE_SIZE,
            overflow_checking: false,
            raise_on_input_exhaustion: false,
        }
    }
}

impl Config {
    pub fn with_tape_size(mut self, tape_size: NonZeroUsize) -> Self {
        self.tape_size = tape_size;
        self
    }

    pub fn with_overflow_checking(mut self, overflow_checking: bool) -> Self {
        self.overflow_checking = overflow_checking;
        self
    }

    pub fn with_raise_on_input_exhaustion(mut self, raise: bool) -> Self {
        self.raise_on_input_exhaustion = raise;
        self
    }
}

/// A handle that asks a running interpreter to stop. Clones share the
/// same flag, so one can be handed to another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("pointer overflow: moving {amount} right from cell {pointer} leaves the tape, at {position}")]
    PointerOverflow {
        pointer: isize,
        amount: usize,
        position: Position,
    },
    #[error("pointer underflow: moving {amount} left from cell {pointer} leaves the tape, at {position}")]
    PointerUnderflow {
        pointer: isize,
        amount: usize,
        position: Position,
    },
    #[error("memory overflow: cell {pointer} would go above 255, at {position}")]
    ValueOverflow { pointer: usize, position: Position },
    #[error("memory underflow: cell {pointer} would go below 0, at {position}")]
    ValueUnderflow { pointer: usize, position: Position },
    #[error("pointer {pointer} is outside the tape, at {position}")]
    PointerOutOfBounds { pointer: isize, position: Position },
    #[error("input finished, at {position}")]
    InputFinished { position: Position },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("execution cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Is this a pointer or cell leaving its valid range?
    pub fn is_memory_error(&self) -> bool {
        matches!(
            self,
            ExecutionError::PointerOverflow { .. }
                | ExecutionError::PointerUnderflow { .. }
                | ExecutionError::ValueOverflow { .. }
                | ExecutionError::ValueUnderflow { .. }
                | ExecutionError::PointerOutOfBounds { .. }
        )
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            ExecutionError::PointerOverflow { position, .. }
            | ExecutionError::PointerUnderflow { position, .. }
            | ExecutionError::ValueOverflow { position, .. }
            | ExecutionError::ValueUnderflow { position, .. }
            | ExecutionError::PointerOutOfBounds { position, .. }
            | ExecutionError::InputFinished { position } => Some(*position),
            ExecutionError::Io(_) | ExecutionError::Cancelled => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(self.to_string(), self.position())
    }
}

/// Runs programs against a tape, reading from `R` and writing to `W`.
pub struct Interpreter<R, W> {
    config: Config,
    input: R,
    output: W,
    cancel: CancelToken,
    tape: Tape,
    counts: ExecutionCounts,
}

impl<R: Read, W: Write> Interpreter<R, W> {
    pub fn new(config: Config, input: R, output: W) -> Self {
        Interpreter {
            config,
            input,
            output,
            cancel: CancelToken::new(),
            tape: Tape::new(config.tape_size),
            counts: ExecutionCounts::default(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The tape as the last run left it.
    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    /// Counters of the last run, including one that failed part way.
    pub fn counts(&self) -> &ExecutionCounts {
        &self.counts
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Execute `program` from a zeroed tape with the pointer at cell 0.
    ///
    /// Running out of input ends the run successfully unless the
    /// configuration asks for it to be raised. Output is flushed
    /// whether or not the run succeeds.
    pub fn run(&mut self, program: &Program) -> Result<ExecutionReport, ExecutionError> {
        self.tape.reset();
        self.counts = ExecutionCounts::default();

        debug!(
            tape_size = self.tape.len(),
            overflow_checking = self.config.overflow_checking,
            raise_on_input_exhaustion = self.config.raise_on_input_exhaustion,
            "starting run"
        );

        let outcome = self.execute_block(&program.expressions);
        let flushed = self.output.flush();

        let input_exhausted = match outcome {
            Ok(()) => false,
            Err(ExecutionError::InputFinished { position })
                if !self.config.raise_on_input_exhaustion =>
            {
                debug!(%position, "input exhausted, ending run");
                true
            }
            Err(e) => {
                debug!(error = %e, steps = self.counts.total(), "run failed");
                return Err(e);
            }
        };
        flushed?;

        let report = ExecutionReport {
            counts: self.counts.clone(),
            pointer: self.tape.pointer(),
            input_exhausted,
        };
        debug!(steps = report.counts.total(), "finished run");
        Ok(report)
    }

    fn check_cancelled(&self) -> Result<(), ExecutionError> {
        if self.cancel.is_cancelled() {
            Err(ExecutionError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn execute_block(&mut self, expressions: &[Expression]) -> Result<(), ExecutionError> {
        for expression in expressions {
            self.execute(expression)?;
        }
        Ok(())
    }

    fn execute(&mut self, expression: &Expression) -> Result<(), ExecutionError> {
        self.check_cancelled()?;

        match expression {
            PointerIncrement { position } => self.move_pointer(1, *position)?,
            PointerDecrement { position } => self.move_pointer(-1, *position)?,
            ValueIncrement { position } => self.add_to_cell(1, *position)?,
            ValueDecrement { position } => self.add_to_cell(-1, *position)?,
            Output { position } => {
                let value = self.current_cell(*position)?;
                self.output.write_all(&[value])?;
            }
            Input { position } => self.read_input(*position)?,
            While { body, position } => {
                while self.current_cell(*position)? != 0 {
                    self.check_cancelled()?;
                    self.execute_block(body)?;
                }
            }
            MultiplePointerIncrement(run) => {
                self.move_pointer(run.count() as isize, run.position())?
            }
            MultiplePointerDecrement(run) => {
                self.move_pointer(-(run.count() as isize), run.position())?
            }
            MultipleValueIncrement(run) => self.add_to_cell(run.count() as i64, run.position())?,
            MultipleValueDecrement(run) => {
                self.add_to_cell(-(run.count() as i64), run.position())?
            }
            LoadZero { position, .. } => {
                let index = self.current_index(*position)?;
                *self.tape.cell_mut(index) = 0;
            }
            Expression::Copy {
                targets, position, ..
            } => self.copy(targets, *position)?,
        }

        self.counts.record(expression.kind());
        Ok(())
    }

    fn current_index(&self, position: Position) -> Result<usize, ExecutionError> {
        self.tape
            .index(0)
            .ok_or_else(|| ExecutionError::PointerOutOfBounds {
                pointer: self.tape.pointer(),
                position,
            })
    }

    fn current_cell(&self, position: Position) -> Result<u8, ExecutionError> {
        let index = self.current_index(position)?;
        Ok(self.tape.cells()[index])
    }

    fn move_pointer(&mut self, amount: isize, position: Position) -> Result<(), ExecutionError> {
        let pointer = self.tape.pointer();

        if self.config.overflow_checking && self.tape.index(amount).is_none() {
            return Err(pointer_error(pointer, amount, position));
        }

        self.tape.set_pointer(pointer.wrapping_add(amount));
        Ok(())
    }

    fn add_to_cell(&mut self, delta: i64, position: Position) -> Result<(), ExecutionError> {
        let index = self.current_index(position)?;
        let checked = self.config.overflow_checking;
        let cell = self.tape.cell_mut(index);
        *cell = adjust(*cell, delta, checked, index, position)?;
        Ok(())
    }

    fn read_input(&mut self, position: Position) -> Result<(), ExecutionError> {
        let index = self.current_index(position)?;
        let mut byte = [0; 1];

        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Err(ExecutionError::InputFinished { position }),
                Ok(_) => {
                    *self.tape.cell_mut(index) = byte[0];
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Add the current cell, times each target's multiplier, to each
    /// target cell, then zero the current cell. Every update is
    /// checked before any is written, so a failing copy leaves the
    /// tape as it was.
    fn copy(&mut self, targets: &[CopyTarget], position: Position) -> Result<(), ExecutionError> {
        let source_index = self.current_index(position)?;
        let source = self.tape.cells()[source_index];
        // The loop this replaced would not have run at all.
        if source == 0 {
            return Ok(());
        }

        let checked = self.config.overflow_checking;
        let mut updates: Vec<(usize, u8)> = Vec::with_capacity(targets.len());

        for target in targets {
            let index = match self.tape.index(target.offset) {
                Some(index) => index,
                None if checked => {
                    return Err(pointer_error(self.tape.pointer(), target.offset, position))
                }
                None => {
                    return Err(ExecutionError::PointerOutOfBounds {
                        pointer: self.tape.pointer().wrapping_add(target.offset),
                        position,
                    })
                }
            };

            // Targets may repeat an offset, so build on pending updates.
            let current = updates
                .iter()
                .rev()
                .find(|(pending, _)| *pending == index)
                .map_or(self.tape.cells()[index], |&(_, value)| value);
            let delta = i64::from(source).saturating_mul(target.multiplier);
            updates.push((index, adjust(current, delta, checked, index, position)?));
        }

        for (index, value) in updates {
            *self.tape.cell_mut(index) = value;
        }
        *self.tape.cell_mut(source_index) = 0;
        Ok(())
    }
}

/// Execute `program` once with a fresh interpreter.
pub fn execute<R: Read, W: Write>(
    program: &Program,
    config: Config,
    input: R,
    output: W,
) -> Result<ExecutionReport, ExecutionError> {
    Interpreter::new(config, input, output).run(program)
}

fn pointer_error(pointer: isize, amount: isize, position: Position) -> ExecutionError {
    if amount > 0 {
        ExecutionError::PointerOverflow {
            pointer,
            amount: amount.unsigned_abs(),
            position,
        }
    } else {
        ExecutionError::PointerUnderflow {
            pointer,
            amount: amount.unsigned_abs(),
            position,
        }
    }
}

/// `value + delta`, wrapping modulo 256 unless `checked`, in which case
/// leaving 0..=255 is an error.
fn adjust(
    value: u8,
    delta: i64,
    checked: bool,
    index: usize,
    position: Position,
) -> Result<u8, ExecutionError> {
    if !checked {
        return Ok((i64::from(value) + delta.rem_euclid(256)).rem_euclid(256) as u8);
    }

    let sum = i64::from(value).saturating_add(delta);
    match u8::try_from(sum) {
        Ok(result) => Ok(result),
        Err(_) if sum > 255 => Err(ExecutionError::ValueOverflow {
            pointer: index,
            position,
        }),
        Err(_) => Err(ExecutionError::ValueUnderflow {
            pointer: index,
            position,
        }),
    }
}
