//! Span information for source locations.
//!
//! Provides precise source location tracking for diagnostics. Locations are
//! reported with a 1-indexed line and a 0-indexed column, matching the
//! convention callers of the core expect (see the Source protocol).

use serde::{Deserialize, Serialize};

/// A byte range plus the line/column coordinates of its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset start (0-indexed)
    pub start: usize,
    /// Byte offset end (exclusive)
    pub end: usize,
    /// Line number (1-indexed)
    pub start_line: usize,
    /// Line number (1-indexed)
    pub end_line: usize,
    /// Column (0-indexed, in bytes)
    pub start_column: usize,
    /// Column (0-indexed, in bytes)
    pub end_column: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        end_line: usize,
        start_column: usize,
        end_column: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            end_line,
            start_column,
            end_column,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge two spans into one that covers both.
    pub fn merge(&self, other: &Span) -> Span {
        let (lo, hi) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };
        Span {
            start: lo.start,
            end: self.end.max(other.end),
            start_line: lo.start_line,
            end_line: self.end_line.max(other.end_line),
            start_column: lo.start_column,
            end_column: if self.end >= other.end {
                self.end_column
            } else {
                other.end_column
            },
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// Tracks line-start byte offsets so byte offsets can be converted to
/// 1-based line / 0-based column pairs and back.
#[derive(Debug, Clone)]
pub struct SourceMap {
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// 1-indexed line, 0-indexed column for a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        (line + 1, offset - line_start)
    }

    /// Byte offset for a 1-indexed line / 0-indexed column pair.
    pub fn offset(&self, line: usize, column: usize) -> Option<usize> {
        self.line_starts.get(line.checked_sub(1)?).map(|s| s + column)
    }

    pub fn span(&self, start: usize, end: usize) -> Span {
        let (start_line, start_column) = self.line_col(start);
        let (end_line, end_column) = self.line_col(end);
        Span {
            start,
            end,
            start_line,
            end_line,
            start_column,
            end_column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_is_zero_based_column() {
        let map = SourceMap::new("abc\ndef\n");
        assert_eq!(map.line_col(0), (1, 0));
        assert_eq!(map.line_col(4), (2, 0));
        assert_eq!(map.line_col(5), (2, 1));
    }

    #[test]
    fn offset_roundtrips() {
        let map = SourceMap::new("abc\ndef\n");
        assert_eq!(map.offset(2, 1), Some(5));
    }

    #[test]
    fn merge_covers_both_spans() {
        let a = Span::new(0, 5, 1, 1, 0, 5);
        let b = Span::new(10, 15, 2, 2, 4, 9);
        let merged = a.merge(&b);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 15);
    }
}
