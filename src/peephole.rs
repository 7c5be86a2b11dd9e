//! Optimisations that replace parts of the BF AST with faster
//! equivalents.
//!
//! Two rewrites are performed, in a single left-to-right pass over
//! each expression sequence:
//!
//! * runs of identical moves or mutations are fused into one
//!   `Multiple*` node carrying a count;
//! * `[-]` becomes `LoadZero`, and loops that multiply the current cell
//!   into neighbouring cells become `Copy`.

use crate::bfir::Expression::{
    Input, LoadZero, MultiplePointerDecrement, MultiplePointerIncrement, MultipleValueDecrement,
    MultipleValueIncrement, Output, PointerDecrement, PointerIncrement, ValueDecrement,
    ValueIncrement, While,
};
use crate::bfir::{CopyTarget, Expression, Program, Repeated};
use crate::diagnostics::Position;
use bitflags::bitflags;
use itertools::Itertools;
use tracing::{debug, trace};

bitflags! {
    /// Which rewrites `optimize_with` performs.
    pub struct OptimisationsFlags: u8 {
        const FUSE_RUNS = 0b0000_0001;
        const CLEAR_LOOPS = 0b0000_0010;
        const COPY_LOOPS = 0b0000_0100;
    }
}

impl Default for OptimisationsFlags {
    fn default() -> Self {
        OptimisationsFlags::all()
    }
}

/// Apply every optimisation to `program`.
pub fn optimize(program: Program) -> Program {
    optimize_with(program, OptimisationsFlags::all())
}

/// Apply the optimisations selected by `flags` to `program`.
pub fn optimize_with(program: Program, flags: OptimisationsFlags) -> Program {
    let before = program.node_count();
    let optimized = Program::new(optimize_block(program.expressions, flags));

    debug!(
        before,
        after = optimized.node_count(),
        ?flags,
        "optimised program"
    );
    optimized
}

fn optimize_block(expressions: Vec<Expression>, flags: OptimisationsFlags) -> Vec<Expression> {
    let rewritten = expressions
        .into_iter()
        .map(|expression| optimize_expression(expression, flags))
        .collect();

    if flags.contains(OptimisationsFlags::FUSE_RUNS) {
        fuse_runs(rewritten)
    } else {
        rewritten
    }
}

fn optimize_expression(expression: Expression, flags: OptimisationsFlags) -> Expression {
    let fuse = flags.contains(OptimisationsFlags::FUSE_RUNS);

    match expression {
        e @ PointerIncrement { .. } if fuse => MultiplePointerIncrement(Repeated::new(e)),
        e @ PointerDecrement { .. } if fuse => MultiplePointerDecrement(Repeated::new(e)),
        e @ ValueIncrement { .. } if fuse => MultipleValueIncrement(Repeated::new(e)),
        e @ ValueDecrement { .. } if fuse => MultipleValueDecrement(Repeated::new(e)),
        While { body, position } => optimize_loop(body, position, flags),
        e @ (PointerIncrement { .. }
        | PointerDecrement { .. }
        | ValueIncrement { .. }
        | ValueDecrement { .. }
        | Output { .. }
        | Input { .. }
        | MultiplePointerIncrement(_)
        | MultiplePointerDecrement(_)
        | MultipleValueIncrement(_)
        | MultipleValueDecrement(_)
        | LoadZero { .. }
        | Expression::Copy { .. }) => e,
    }
}

fn optimize_loop(
    body: Vec<Expression>,
    position: Position,
    flags: OptimisationsFlags,
) -> Expression {
    if flags.contains(OptimisationsFlags::CLEAR_LOOPS) && is_clear_loop(&body) {
        trace!(%position, "rewrote clear loop");
        return LoadZero { body, position };
    }

    let body = optimize_block(body, flags);

    if flags.contains(OptimisationsFlags::COPY_LOOPS) {
        if let Some(targets) = copy_targets(&body) {
            trace!(%position, targets = targets.len(), "rewrote copy loop");
            return Expression::Copy {
                targets,
                body,
                position,
            };
        }
    }

    While { body, position }
}

/// Does the loop with this body read `[-]`?
fn is_clear_loop(body: &[Expression]) -> bool {
    let mut text = vec![b'['];
    for expression in body {
        expression.write_bytes(&mut text);
    }
    text.push(b']');
    text == b"[-]"
}

/// Combine adjacent runs of the same kind, so `>>>` becomes a single
/// `MultiplePointerIncrement` with a count of 3.
fn fuse_runs(expressions: Vec<Expression>) -> Vec<Expression> {
    expressions
        .into_iter()
        .coalesce(|prev, current| match (prev, current) {
            (MultiplePointerIncrement(mut run), MultiplePointerIncrement(next)) => {
                run.absorb(next);
                Ok(MultiplePointerIncrement(run))
            }
            (MultiplePointerDecrement(mut run), MultiplePointerDecrement(next)) => {
                run.absorb(next);
                Ok(MultiplePointerDecrement(run))
            }
            (MultipleValueIncrement(mut run), MultipleValueIncrement(next)) => {
                run.absorb(next);
                Ok(MultipleValueIncrement(run))
            }
            (MultipleValueDecrement(mut run), MultipleValueDecrement(next)) => {
                run.absorb(next);
                Ok(MultipleValueDecrement(run))
            }
            (prev, current) => Err((prev, current)),
        })
        .collect()
}

/// If this (already optimised) loop body is a multiply-copy loop,
/// return the cells it adds to and by how much per iteration.
///
/// A body qualifies when:
/// * it starts or ends with a decrement of 1, which drives the loop
///   cell to zero;
/// * it contains only moves and mutations;
/// * the pointer ends where it started;
/// * nothing else touches the loop cell.
///
/// The driving decrement itself gets no target: the loop cell is
/// zeroed by `Copy`.
pub(crate) fn copy_targets(body: &[Expression]) -> Option<Vec<CopyTarget>> {
    let driver = if matches!(body.first(), Some(MultipleValueDecrement(_))) {
        0
    } else if matches!(body.last(), Some(MultipleValueDecrement(_))) {
        body.len() - 1
    } else {
        return None;
    };

    let mut offset: isize = 0;
    let mut targets = vec![];

    for (index, expression) in body.iter().enumerate() {
        match expression {
            MultiplePointerIncrement(run) => offset += run.count() as isize,
            MultiplePointerDecrement(run) => offset -= run.count() as isize,
            MultipleValueIncrement(run) => targets.push(CopyTarget {
                offset,
                multiplier: run.count() as i64,
            }),
            MultipleValueDecrement(run) if index == driver => {
                if run.count() != 1 {
                    return None;
                }
            }
            MultipleValueDecrement(run) => targets.push(CopyTarget {
                offset,
                multiplier: -(run.count() as i64),
            }),
            PointerIncrement { .. }
            | PointerDecrement { .. }
            | ValueIncrement { .. }
            | ValueDecrement { .. }
            | Output { .. }
            | Input { .. }
            | While { .. }
            | LoadZero { .. }
            | Expression::Copy { .. } => return None,
        }
    }

    if offset != 0 || targets.iter().any(|target| target.offset == 0) {
        return None;
    }

    Some(targets)
}
