//! bfir defines an AST for BF. Every node remembers the span of the
//! original source it came from, and can be serialized back to the
//! operation text it stands for.
//!
//! Besides the eight primitives, the AST has the derived nodes the
//! optimiser produces: runs of identical moves or mutations, cleared
//! cells and multiply-copy loops.
//!
//! It also provides a parser producing good error messages on
//! malformed inputs.

use self::Expression::*;
use crate::diagnostics::{Diagnostic, Position};
use std::fmt;
use thiserror::Error;

#[cfg(test)]
use pretty_assertions::assert_eq;

/// A non-empty run of identical primitives fused into one node. The
/// count is always the number of constituents.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Repeated {
    expressions: Vec<Expression>,
}

impl Repeated {
    pub fn new(first: Expression) -> Self {
        Repeated {
            expressions: vec![first],
        }
    }

    pub fn count(&self) -> usize {
        self.expressions.len()
    }

    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }

    pub fn push(&mut self, expression: Expression) {
        self.expressions.push(expression);
    }

    /// Append every constituent of `other`, keeping source order.
    pub fn absorb(&mut self, other: Repeated) {
        self.expressions.extend(other.expressions);
    }

    pub fn position(&self) -> Position {
        let first = self.expressions[0].position();
        let last = self.expressions[self.expressions.len() - 1].position();
        first.cover(last)
    }
}

/// One recorded effect of a multiply-copy loop: each time the loop
/// would have run, `multiplier` is added to the cell `offset` cells
/// away from the loop's own cell.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct CopyTarget {
    pub offset: isize,
    pub multiplier: i64,
}

/// `Expression` represents a node in our BF AST.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Expression {
    PointerIncrement {
        position: Position,
    },
    PointerDecrement {
        position: Position,
    },
    ValueIncrement {
        position: Position,
    },
    ValueDecrement {
        position: Position,
    },
    Output {
        position: Position,
    },
    Input {
        position: Position,
    },
    While {
        body: Vec<Expression>,
        position: Position,
    },
    /// These nodes have no direct equivalent in BF, but we generate
    /// them during optimisation.
    MultiplePointerIncrement(Repeated),
    MultiplePointerDecrement(Repeated),
    MultipleValueIncrement(Repeated),
    MultipleValueDecrement(Repeated),
    /// A `[-]` loop. The body is kept so the node still serializes to
    /// the text it replaced.
    LoadZero {
        body: Vec<Expression>,
        position: Position,
    },
    Copy {
        targets: Vec<CopyTarget>,
        body: Vec<Expression>,
        position: Position,
    },
}

/// The kind of an [`Expression`], without its payload.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum ExprKind {
    PointerIncrement,
    PointerDecrement,
    ValueIncrement,
    ValueDecrement,
    Output,
    Input,
    While,
    MultiplePointerIncrement,
    MultiplePointerDecrement,
    MultipleValueIncrement,
    MultipleValueDecrement,
    LoadZero,
    Copy,
}

impl ExprKind {
    pub const COUNT: usize = 13;

    /// Every kind, in declaration order. `ALL[k.index()] == k`.
    pub const ALL: [ExprKind; ExprKind::COUNT] = [
        ExprKind::PointerIncrement,
        ExprKind::PointerDecrement,
        ExprKind::ValueIncrement,
        ExprKind::ValueDecrement,
        ExprKind::Output,
        ExprKind::Input,
        ExprKind::While,
        ExprKind::MultiplePointerIncrement,
        ExprKind::MultiplePointerDecrement,
        ExprKind::MultipleValueIncrement,
        ExprKind::MultipleValueDecrement,
        ExprKind::LoadZero,
        ExprKind::Copy,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ExprKind::PointerIncrement => "PointerIncrement",
            ExprKind::PointerDecrement => "PointerDecrement",
            ExprKind::ValueIncrement => "ValueIncrement",
            ExprKind::ValueDecrement => "ValueDecrement",
            ExprKind::Output => "Output",
            ExprKind::Input => "Input",
            ExprKind::While => "While",
            ExprKind::MultiplePointerIncrement => "MultiplePointerIncrement",
            ExprKind::MultiplePointerDecrement => "MultiplePointerDecrement",
            ExprKind::MultipleValueIncrement => "MultipleValueIncrement",
            ExprKind::MultipleValueDecrement => "MultipleValueDecrement",
            ExprKind::LoadZero => "LoadZero",
            ExprKind::Copy => "Copy",
        }
    }
}

impl fmt::Display for ExprKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Expression {
    pub fn kind(&self) -> ExprKind {
        match self {
            PointerIncrement { .. } => ExprKind::PointerIncrement,
            PointerDecrement { .. } => ExprKind::PointerDecrement,
            ValueIncrement { .. } => ExprKind::ValueIncrement,
            ValueDecrement { .. } => ExprKind::ValueDecrement,
            Output { .. } => ExprKind::Output,
            Input { .. } => ExprKind::Input,
            While { .. } => ExprKind::While,
            MultiplePointerIncrement(_) => ExprKind::MultiplePointerIncrement,
            MultiplePointerDecrement(_) => ExprKind::MultiplePointerDecrement,
            MultipleValueIncrement(_) => ExprKind::MultipleValueIncrement,
            MultipleValueDecrement(_) => ExprKind::MultipleValueDecrement,
            LoadZero { .. } => ExprKind::LoadZero,
            Copy { .. } => ExprKind::Copy,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            PointerIncrement { position }
            | PointerDecrement { position }
            | ValueIncrement { position }
            | ValueDecrement { position }
            | Output { position }
            | Input { position }
            | While { position, .. }
            | LoadZero { position, .. }
            | Copy { position, .. } => *position,
            MultiplePointerIncrement(run)
            | MultiplePointerDecrement(run)
            | MultipleValueIncrement(run)
            | MultipleValueDecrement(run) => run.position(),
        }
    }

    /// Append the BF text this node stands for to `out`.
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        match self {
            PointerIncrement { .. } => out.push(b'>'),
            PointerDecrement { .. } => out.push(b'<'),
            ValueIncrement { .. } => out.push(b'+'),
            ValueDecrement { .. } => out.push(b'-'),
            Output { .. } => out.push(b'.'),
            Input { .. } => out.push(b','),
            While { body, .. } | LoadZero { body, .. } | Copy { body, .. } => {
                out.push(b'[');
                for expression in body {
                    expression.write_bytes(out);
                }
                out.push(b']');
            }
            MultiplePointerIncrement(run)
            | MultiplePointerDecrement(run)
            | MultipleValueIncrement(run)
            | MultipleValueDecrement(run) => {
                for expression in run.expressions() {
                    expression.write_bytes(out);
                }
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![];
        self.write_bytes(&mut out);
        out
    }
}

fn fmt_with_indent(expr: &Expression, indent: usize, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", "  ".repeat(indent))?;

    match expr {
        While { body, position } => {
            write!(f, "While position: {:?}", position)?;
            for child in body {
                writeln!(f)?;
                fmt_with_indent(child, indent + 1, f)?;
            }
            Ok(())
        }
        MultiplePointerIncrement(run)
        | MultiplePointerDecrement(run)
        | MultipleValueIncrement(run)
        | MultipleValueDecrement(run) => write!(
            f,
            "{} count: {} position: {:?}",
            expr.kind(),
            run.count(),
            run.position()
        ),
        Copy {
            targets, position, ..
        } => {
            write!(f, "Copy position: {:?}", position)?;
            for target in targets {
                write!(f, " [{:+}]*{}", target.offset, target.multiplier)?;
            }
            Ok(())
        }
        other => write!(f, "{} position: {:?}", other.kind(), other.position()),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt_with_indent(self, 0, f)
    }
}

/// A whole BF program: its top-level expressions, in order.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Program {
    pub expressions: Vec<Expression>,
}

impl Program {
    pub fn new(expressions: Vec<Expression>) -> Self {
        Program { expressions }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![];
        for expression in &self.expressions {
            expression.write_bytes(&mut out);
        }
        out
    }

    /// Number of nodes in the tree, counting loop bodies but not the
    /// constituents of runs.
    pub fn node_count(&self) -> usize {
        fn count(expressions: &[Expression]) -> usize {
            expressions
                .iter()
                .map(|expression| match expression {
                    While { body, .. } => 1 + count(body),
                    _ => 1,
                })
                .sum()
        }
        count(&self.expressions)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, expression) in self.expressions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            fmt_with_indent(expression, 0, f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{message} at {position}")]
pub struct ParseError {
    pub message: String,
    pub position: Position,
}

impl ParseError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(self.message.clone(), Some(self.position))
    }
}

/// The parser refuses loops nested deeper than this. Everything that
/// walks a `Program` recurses once per level of nesting.
pub const MAX_NESTING_DEPTH: usize = 1024;

/// Given a string of BF source code, parse and return our BF AST. If
/// parsing fails, return a ParseError describing what went wrong.
/// Positions are byte offsets; bytes other than the eight operations
/// are comments.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    // Expressions in the current loop (or toplevel).
    let mut expressions = vec![];
    // Contains the expressions of open parent loops (or toplevel),
    // and the starting indices of the loops.
    let mut stack = vec![];

    for (index, byte) in source.bytes().enumerate() {
        let position = Position::at(index);
        match byte {
            b'>' => expressions.push(PointerIncrement { position }),
            b'<' => expressions.push(PointerDecrement { position }),
            b'+' => expressions.push(ValueIncrement { position }),
            b'-' => expressions.push(ValueDecrement { position }),
            b'.' => expressions.push(Output { position }),
            b',' => expressions.push(Input { position }),
            b'[' => {
                if stack.len() == MAX_NESTING_DEPTH {
                    return Err(ParseError {
                        message: format!("This [ is nested more than {} deep", MAX_NESTING_DEPTH),
                        position,
                    });
                }
                stack.push((expressions, index));
                expressions = vec![];
            }
            b']' => {
                if let Some((mut parent, open_index)) = stack.pop() {
                    parent.push(While {
                        body: expressions,
                        position: Position {
                            start: open_index,
                            end: index,
                        },
                    });
                    expressions = parent;
                } else {
                    return Err(ParseError {
                        message: "This ] has no matching [".to_owned(),
                        position,
                    });
                }
            }
            _ => (),
        }
    }

    if let Some(&(_, open_index)) = stack.last() {
        return Err(ParseError {
            message: "This [ has no matching ]".to_owned(),
            position: Position::at(open_index),
        });
    }

    Ok(Program::new(expressions))
}

#[cfg(test)]
fn pos(start: usize, end: usize) -> Position {
    Position { start, end }
}

#[test]
fn parse_primitives() {
    assert_eq!(
        parse("><+-.,").unwrap().expressions,
        [
            PointerIncrement {
                position: Position::at(0)
            },
            PointerDecrement {
                position: Position::at(1)
            },
            ValueIncrement {
                position: Position::at(2)
            },
            ValueDecrement {
                position: Position::at(3)
            },
            Output {
                position: Position::at(4)
            },
            Input {
                position: Position::at(5)
            },
        ]
    );
}

#[test]
fn parse_empty_loop() {
    let expected = [While {
        body: vec![],
        position: pos(0, 1),
    }];
    assert_eq!(parse("[]").unwrap().expressions, expected);
}

#[test]
fn parse_complex_loop() {
    let loop_body = vec![
        Input {
            position: Position::at(2),
        },
        ValueIncrement {
            position: Position::at(3),
        },
    ];
    let expected = [
        Output {
            position: Position::at(0),
        },
        While {
            body: loop_body,
            position: pos(1, 4),
        },
        ValueDecrement {
            position: Position::at(5),
        },
    ];
    assert_eq!(parse(".[,+]-").unwrap().expressions, expected);
}

#[test]
fn parse_positions_are_byte_offsets() {
    // 'é' is two bytes long.
    let program = parse("é+").unwrap();
    assert_eq!(program.expressions[0].position(), Position::at(2));
}

#[test]
fn parse_unbalanced_loop() {
    assert!(parse("[").is_err());
    assert!(parse("]").is_err());
    assert!(parse("][").is_err());
    assert!(parse("[][").is_err());
}

#[test]
fn parse_unbalanced_reports_innermost_open() {
    let err = parse("[[]+[").unwrap_err();
    assert_eq!(err.message, "This [ has no matching ]");
    assert_eq!(err.position, Position::at(4));

    let err = parse("+]").unwrap_err();
    assert_eq!(err.message, "This ] has no matching [");
    assert_eq!(err.position, Position::at(1));
}

#[cfg(test)]
fn nested(depth: usize) -> String {
    format!("{}{}", "[".repeat(depth), "]".repeat(depth))
}

#[test]
fn parse_deepest_allowed_nesting() {
    let program = parse(&nested(MAX_NESTING_DEPTH)).unwrap();
    assert_eq!(program.node_count(), MAX_NESTING_DEPTH);
}

#[test]
fn parse_rejects_nesting_past_the_limit() {
    let err = parse(&nested(200_000)).unwrap_err();
    assert_eq!(err.message, "This [ is nested more than 1024 deep");
    assert_eq!(err.position, Position::at(MAX_NESTING_DEPTH));

    let err = parse(&nested(MAX_NESTING_DEPTH + 1)).unwrap_err();
    assert_eq!(err.position, Position::at(MAX_NESTING_DEPTH));
}

#[test]
fn parse_comment() {
    assert_eq!(parse("foo! ").unwrap().expressions, []);
}

#[test]
fn serialization_strips_comments() {
    let program = parse("add two: [->+< loop] done.").unwrap();
    assert_eq!(program.to_bytes(), b"[->+<].".to_vec());
}

#[test]
fn run_count_matches_constituents() {
    let mut run = Repeated::new(ValueIncrement {
        position: Position::at(3),
    });
    run.push(ValueIncrement {
        position: Position::at(4),
    });
    run.absorb(Repeated::new(ValueIncrement {
        position: Position::at(6),
    }));

    assert_eq!(run.count(), 3);
    assert_eq!(run.count(), run.expressions().len());
    assert_eq!(run.position(), pos(3, 6));
    assert_eq!(MultipleValueIncrement(run).to_bytes(), b"+++".to_vec());
}

#[test]
fn derived_loops_serialize_as_loops() {
    let body = parse("-").unwrap().expressions;
    let zero = LoadZero {
        body,
        position: pos(0, 2),
    };
    assert_eq!(zero.to_bytes(), b"[-]".to_vec());
}

#[test]
fn kinds_index_densely() {
    for (i, kind) in ExprKind::ALL.iter().enumerate() {
        assert_eq!(kind.index(), i);
    }
}

#[test]
fn node_count_includes_loop_bodies() {
    let program = parse("+[>[-]<]").unwrap();
    assert_eq!(program.node_count(), 6);
}

#[test]
fn display_indents_loop_bodies() {
    let program = parse("[+]").unwrap();
    assert_eq!(
        program.to_string(),
        "While position: 0-2\n  ValueIncrement position: 1"
    );
}
