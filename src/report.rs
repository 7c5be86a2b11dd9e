//! Execution counters and the summary returned from a run.

use crate::bfir::ExprKind;
use itertools::Itertools;
use std::fmt;
use std::ops::Index;

/// How many nodes of each kind have finished executing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionCounts {
    counts: [u64; ExprKind::COUNT],
}

impl ExecutionCounts {
    pub(crate) fn record(&mut self, kind: ExprKind) {
        self.counts[kind.index()] += 1;
    }

    pub fn get(&self, kind: ExprKind) -> u64 {
        self.counts[kind.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Every kind with its count, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (ExprKind, u64)> + '_ {
        ExprKind::ALL.iter().map(move |&kind| (kind, self.get(kind)))
    }
}

impl Index<ExprKind> for ExecutionCounts {
    type Output = u64;

    fn index(&self, kind: ExprKind) -> &u64 {
        &self.counts[kind.index()]
    }
}

impl fmt::Display for ExecutionCounts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let width = ExprKind::ALL
            .iter()
            .map(|kind| kind.name().len())
            .max()
            .unwrap_or(0)
            + 1;

        let rows = self
            .iter()
            .map(|(kind, count)| format!("{:<width$} {}", format!("{}:", kind), count, width = width))
            .join("\n");

        write!(
            f,
            "{}\n{:<width$} {}",
            rows,
            "Total:",
            self.total(),
            width = width
        )
    }
}

/// The outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub counts: ExecutionCounts,
    /// Where the pointer was when the program stopped.
    pub pointer: isize,
    /// The program stopped early because it read past the end of its
    /// input, and the configuration treats that as a normal exit.
    pub input_exhausted: bool,
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.counts)?;
        write!(f, "Pointer: {}", self.pointer)?;
        if self.input_exhausted {
            write!(f, " (input exhausted)")?;
        }
        Ok(())
    }
}
