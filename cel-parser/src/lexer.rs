//! Lexer for CEL source code.
//!
//! Wraps the logos-generated token stream with manual scanning for string
//! and bytes literals (including triple-quoted forms), since their content
//! must not be re-tokenized by the generated automaton.

use logos::Logos;

use crate::error::{ParseError, ParseResult};
use crate::span::{SourceMap, Span};
use crate::token::Token;

/// A token together with its span and raw source text.
#[derive(Debug, Clone)]
pub struct SpannedToken<'a> {
    pub token: Token,
    pub span: Span,
    pub text: &'a str,
}

impl<'a> SpannedToken<'a> {
    pub fn new(token: Token, span: Span, text: &'a str) -> Self {
        Self { token, span, text }
    }
}

/// CEL lexer.
pub struct Lexer<'a> {
    source: &'a str,
    inner: logos::Lexer<'a, Token>,
    source_map: SourceMap,
    peeked: Option<Result<SpannedToken<'a>, ParseError>>,
    position: usize,
    offset: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            inner: Token::lexer(source),
            source_map: SourceMap::new(source),
            peeked: None,
            position: 0,
            offset: 0,
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    fn make_span(&self, start: usize, end: usize) -> Span {
        self.source_map.span(start, end)
    }

    pub fn peek(&mut self) -> Option<&Result<SpannedToken<'a>, ParseError>> {
        if self.peeked.is_none() {
            self.peeked = self.next_token_internal();
        }
        self.peeked.as_ref()
    }

    pub fn next_token(&mut self) -> Option<Result<SpannedToken<'a>, ParseError>> {
        if let Some(peeked) = self.peeked.take() {
            return Some(peeked);
        }
        self.next_token_internal()
    }

    fn next_token_internal(&mut self) -> Option<Result<SpannedToken<'a>, ParseError>> {
        let result = self.inner.next()?;
        let span = self.inner.span();
        let start = self.offset + span.start;
        let end = self.offset + span.end;
        self.position = end;

        match result {
            Ok(Token::StringLiteral) => {
                let opening = &self.source[start..end];
                let (quote, triple, raw) = classify_opening(opening);
                match self.scan_string_to_close(end, quote, triple, raw) {
                    Ok(literal_end) => {
                        self.restart_from(literal_end);
                        let span = self.make_span(start, literal_end);
                        let text = &self.source[start..literal_end];
                        Some(Ok(SpannedToken::new(Token::StringLiteral, span, text)))
                    }
                    Err(e) => {
                        self.restart_from(self.source.len());
                        Some(Err(e))
                    }
                }
            }
            Ok(token) => {
                let span = self.make_span(start, end);
                let text = &self.source[start..end];
                Some(Ok(SpannedToken::new(token, span, text)))
            }
            Err(()) => {
                let span = self.make_span(start, end);
                Some(Err(ParseError::LexerError { span }))
            }
        }
    }

    /// Scan string/bytes literal content to find the closing quote run.
    /// Uses memchr for SIMD-accelerated scanning.
    fn scan_string_to_close(&self, start: usize, quote: u8, triple: bool, raw: bool) -> ParseResult<usize> {
        let bytes = self.source.as_bytes();
        let mut pos = start;

        loop {
            match memchr::memchr2(b'\\', quote, &bytes[pos..]) {
                None => {
                    return Err(ParseError::UnterminatedString {
                        span: self.make_span(start, bytes.len()),
                    });
                }
                Some(offset) => {
                    pos += offset;
                    if !raw && bytes[pos] == b'\\' && pos + 1 < bytes.len() {
                        pos += 2;
                        continue;
                    }
                    if bytes[pos] == quote {
                        if triple {
                            if pos + 3 <= bytes.len() && bytes[pos..pos + 3] == [quote, quote, quote] {
                                return Ok(pos + 3);
                            }
                            pos += 1;
                        } else {
                            return Ok(pos + 1);
                        }
                    } else {
                        // Raw-mode backslash: no escaping, just a literal byte.
                        pos += 1;
                    }
                }
            }
        }
    }

    /// Restart the lexer from a new position, reusing `bump` when possible.
    fn restart_from(&mut self, pos: usize) {
        self.peeked = None;
        self.position = pos;
        let logos_abs_pos = self.offset + self.inner.span().end;
        if pos > logos_abs_pos && pos <= self.source.len() {
            self.inner.bump(pos - logos_abs_pos);
        } else if pos < self.source.len() {
            self.inner = Token::lexer(&self.source[pos..]);
            self.offset = pos;
        } else {
            self.inner = Token::lexer("");
            self.offset = pos;
        }
    }

    pub fn is_eof(&mut self) -> bool {
        self.peek().is_none()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn collect_all(mut self) -> Vec<Result<SpannedToken<'a>, ParseError>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        tokens
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<SpannedToken<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Determine the quote byte, triple-ness and raw-ness of an opening run
/// such as `"`, `'''`, `r'`, `Rb"""`.
fn classify_opening(opening: &str) -> (u8, bool, bool) {
    let bytes = opening.as_bytes();
    let (quote, triple, prefix_len) = if bytes.len() >= 3 && bytes[bytes.len() - 3..].iter().all(|&b| b == bytes[bytes.len() - 1]) {
        (bytes[bytes.len() - 1], true, bytes.len() - 3)
    } else {
        (bytes[bytes.len() - 1], false, bytes.len() - 1)
    };
    let prefix = opening[..prefix_len].to_ascii_lowercase();
    (quote, triple, prefix.contains('r'))
}

/// Prefix flags recovered from a raw literal's opening run (see [`crate::unescape`]).
pub fn literal_prefix_flags(text: &str) -> (bool, bool) {
    let prefix_end = text.find(['\'', '"']).unwrap_or(0);
    let prefix = text[..prefix_end].to_ascii_lowercase();
    (prefix.contains('r'), prefix.contains('b'))
}

pub fn tokenize(source: &str) -> Vec<Result<SpannedToken<'_>, ParseError>> {
    Lexer::new(source).collect_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_simple_string() {
        let tokens: Vec<_> = tokenize("'hello' + 1").into_iter().filter_map(|t| t.ok()).collect();
        assert_eq!(tokens[0].token, Token::StringLiteral);
        assert_eq!(tokens[0].text, "'hello'");
    }

    #[test]
    fn tokenizes_triple_quoted_string_with_interior_quotes() {
        let tokens: Vec<_> = tokenize(r#""""say "hi" please""""#)
            .into_iter()
            .filter_map(|t| t.ok())
            .collect();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, r#""""say "hi" please""""#);
    }

    #[test]
    fn tokenizes_raw_bytes_prefix() {
        let tokens: Vec<_> = tokenize(r"rb'\d+'").into_iter().filter_map(|t| t.ok()).collect();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, r"rb'\d+'");
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let tokens = tokenize("'abc");
        assert!(tokens.iter().any(|t| t.is_err()));
    }

    #[test]
    fn line_comment_is_skipped() {
        let tokens: Vec<_> = tokenize("1 // trailing comment\n+ 2")
            .into_iter()
            .filter_map(|t| t.ok())
            .map(|t| t.token)
            .collect();
        assert_eq!(tokens, vec![Token::Int, Token::Plus, Token::Int]);
    }
}
