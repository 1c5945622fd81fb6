use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location of a token or AST node.
///
/// Diagnostics only ever surface the line, but the byte range is kept so
/// that nodes built from several tokens can be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// 1-based line of `start`.
    pub line: u32,
    /// 1-based column of `start`.
    pub col: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, col: u32) -> Self {
        Self {
            start,
            end,
            line,
            col,
        }
    }

    /// Placeholder for nodes the parser invents (e.g. the empty-string
    /// initializer of `let x;`).
    pub fn synthetic() -> Self {
        Self::new(0, 0, 0, 0)
    }

    pub fn is_synthetic(&self) -> bool {
        self.line == 0
    }

    /// Smallest span covering both `self` and `other`; position info comes
    /// from whichever starts first.
    pub fn merge(self, other: Span) -> Span {
        if other.is_synthetic() {
            return self;
        }
        if self.is_synthetic() {
            return other;
        }
        let (line, col) = if self.start <= other.start {
            (self.line, self.col)
        } else {
            (other.line, other.col)
        };
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line,
            col,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}
