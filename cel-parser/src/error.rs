//! Parse diagnostics.

use crate::span::Span;
use thiserror::Error;

/// A single parse-time diagnostic.
///
/// Every variant carries a [`Span`] so callers can render a caret-marked
/// single line excerpt via [`ParseError::format_with_context`].
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("unexpected token '{found}' at {span:?}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        span: Span,
    },

    #[error("unexpected end of input at {span:?}, expected {expected}")]
    UnexpectedEof { expected: String, span: Span },

    #[error("invalid escape sequence '{sequence}' at {span:?}")]
    InvalidEscape { sequence: String, span: Span },

    #[error("unterminated string literal starting at {span:?}")]
    UnterminatedString { span: Span },

    #[error("invalid number literal '{literal}' at {span:?}")]
    InvalidNumber { literal: String, span: Span },

    #[error("{message} at {span:?}")]
    InvalidSyntax { message: String, span: Span },

    #[error("reserved identifier '{name}' cannot be used here at {span:?}")]
    ReservedIdentifier { name: String, span: Span },

    #[error("has() argument must be a field selection at {span:?}")]
    InvalidHasArgument { span: Span },

    #[error("unrecognized token at {span:?}")]
    LexerError { span: Span },

    #[error("maximum expression recursion depth ({limit}) exceeded at {span:?}")]
    RecursionLimitExceeded { limit: usize, span: Span },

    #[error("source exceeds the maximum code point size ({limit}) at {span:?}")]
    SourceTooLarge { limit: usize, span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::UnexpectedEof { span, .. }
            | ParseError::InvalidEscape { span, .. }
            | ParseError::UnterminatedString { span }
            | ParseError::InvalidNumber { span, .. }
            | ParseError::InvalidSyntax { span, .. }
            | ParseError::ReservedIdentifier { span, .. }
            | ParseError::InvalidHasArgument { span }
            | ParseError::LexerError { span }
            | ParseError::RecursionLimitExceeded { span, .. }
            | ParseError::SourceTooLarge { span, .. } => *span,
        }
    }

    pub fn unexpected_token(found: impl Into<String>, expected: impl Into<String>, span: Span) -> Self {
        ParseError::UnexpectedToken {
            found: found.into(),
            expected: expected.into(),
            span,
        }
    }

    pub fn unexpected_eof(expected: impl Into<String>, span: Span) -> Self {
        ParseError::UnexpectedEof {
            expected: expected.into(),
            span,
        }
    }

    pub fn invalid_syntax(message: impl Into<String>, span: Span) -> Self {
        ParseError::InvalidSyntax {
            message: message.into(),
            span,
        }
    }

    /// Render a single-line excerpt of `source` with a caret marker under the span.
    pub fn format_with_context(&self, source: &str) -> String {
        let span = self.span();
        let lines: Vec<&str> = source.lines().collect();
        let line_idx = span.start_line.saturating_sub(1);
        if line_idx >= lines.len() {
            return String::new();
        }
        let line = lines[line_idx];
        let col = span.start_column;
        let len = if span.start_line == span.end_line {
            span.end_column.saturating_sub(span.start_column).max(1)
        } else {
            1
        };
        let spaces = " ".repeat(col);
        let marker = "^".repeat(len.min(line.len().saturating_sub(col)).max(1));
        format!(
            "  {} | {}\n  {} | {}{}",
            span.start_line,
            line,
            " ".repeat(span.start_line.to_string().len()),
            spaces,
            marker
        )
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// An accumulated collection of parse diagnostics.
#[derive(Debug, Default, Clone)]
pub struct ParseErrors {
    errors: Vec<ParseError>,
}

impl ParseErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn push(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn first(&self) -> Option<&ParseError> {
        self.errors.first()
    }

    pub fn format_all(&self, source: &str) -> String {
        self.errors
            .iter()
            .enumerate()
            .map(|(i, e)| format!("Error {}: {}\n{}", i + 1, e, e.format_with_context(source)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl IntoIterator for ParseErrors {
    type Item = ParseError;
    type IntoIter = std::vec::IntoIter<ParseError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_token_carries_span() {
        let span = Span::new(0, 5, 1, 1, 0, 5);
        let err = ParseError::unexpected_token("foo", "bar", span);
        assert!(err.to_string().contains("foo"));
        assert!(err.to_string().contains("bar"));
    }

    #[test]
    fn format_with_context_marks_the_span() {
        let source = "1 + \n2";
        let span = Span::new(4, 4, 1, 1, 4, 4);
        let err = ParseError::unexpected_eof("expression", span);
        let context = err.format_with_context(source);
        assert!(context.contains("1 +"));
        assert!(context.contains('^'));
    }
}
