//! Human-readable errors rendered against the program source.

use colored::Colorize;
use std::fmt;

/// An inclusive range of byte offsets into the source code.
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct Position {
    pub start: usize,
    pub end: usize,
}

impl Position {
    pub fn at(index: usize) -> Self {
        Position {
            start: index,
            end: index,
        }
    }

    /// The smallest range covering both `self` and `other`.
    pub fn cover(self, other: Position) -> Position {
        Position {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub position: Option<Position>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, position: Option<Position>) -> Self {
        Diagnostic {
            message: message.into(),
            position,
        }
    }

    /// Format this diagnostic for a terminal, quoting the source line
    /// that contains the start of the position and underlining the
    /// span (clipped to that line).
    pub fn render(&self, source: &str) -> String {
        let mut result = format!("{}: {}", "error".red().bold(), self.message.bold());

        let position = match self.position {
            Some(position) => position,
            None => return result,
        };

        let bytes = source.as_bytes();
        let start = position.start.min(bytes.len());
        let line_start = bytes[..start]
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        let line_end = bytes[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |i| start + i);
        let line_number = bytes[..line_start].iter().filter(|&&b| b == b'\n').count() + 1;

        let last = position.end.min(line_end.saturating_sub(1)).max(start);
        let column = chars(&bytes[line_start..start]);
        let width = chars(bytes.get(start..=last).unwrap_or(&[])).max(1);

        let label = line_number.to_string();
        let gutter = " ".repeat(label.len());
        let text = String::from_utf8_lossy(&bytes[line_start..line_end]);

        result.push_str(&format!(
            "\n{} {} {}:{}\n{} |\n{} | {}\n{} | {}{}",
            gutter,
            "-->".blue().bold(),
            line_number,
            column + 1,
            gutter,
            label.blue().bold(),
            text,
            gutter,
            " ".repeat(column),
            "^".repeat(width).red().bold(),
        ));
        result
    }
}

fn chars(bytes: &[u8]) -> usize {
    String::from_utf8_lossy(bytes).chars().count()
}
