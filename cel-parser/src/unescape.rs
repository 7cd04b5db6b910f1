//! String/bytes literal unescaping.
//!
//! Handles `\a \b \f \n \r \t \v \' \" \\ \? \xHH \uHHHH \UHHHHHHHH \ooo`.
//! Octal escapes are exactly three digits; `\x`/`\u`/`\U` consume a fixed
//! digit count. Raw literals (`r'...'`) disable escape processing entirely.
//! Triple-quoted literals may contain unescaped interior quotes of the same
//! kind as the delimiter (the lexer already stopped only at a genuine close).

use crate::span::Span;
use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Str(String),
    Bytes(Vec<u8>),
}

/// Strip prefix letters and quote delimiters from a raw literal's source text.
fn strip(raw: &str) -> (bool, bool, &str) {
    let quote_at = raw.find(['\'', '"']).unwrap_or(0);
    let prefix = raw[..quote_at].to_ascii_lowercase();
    let is_raw = prefix.contains('r');
    let is_bytes = prefix.contains('b');
    let rest = &raw[quote_at..];
    let quote_byte = rest.as_bytes()[0];
    let triple = rest.len() >= 6 && rest.as_bytes()[1] == quote_byte && rest.as_bytes()[2] == quote_byte;
    let delim_len = if triple { 3 } else { 1 };
    let content = &rest[delim_len..rest.len() - delim_len];
    (is_raw, is_bytes, content)
}

pub fn unescape(raw: &str, span: Span) -> Result<Literal, ParseError> {
    let (is_raw, is_bytes, content) = strip(raw);
    if is_raw {
        return Ok(if is_bytes {
            Literal::Bytes(content.as_bytes().to_vec())
        } else {
            Literal::Str(content.to_string())
        });
    }

    let bytes = content.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        i += 1;
        let Some(&kind) = bytes.get(i) else {
            return Err(ParseError::InvalidEscape {
                sequence: "\\".to_string(),
                span,
            });
        };
        match kind {
            b'a' => {
                out.push(0x07);
                i += 1;
            }
            b'b' => {
                out.push(0x08);
                i += 1;
            }
            b'f' => {
                out.push(0x0C);
                i += 1;
            }
            b'n' => {
                out.push(b'\n');
                i += 1;
            }
            b'r' => {
                out.push(b'\r');
                i += 1;
            }
            b't' => {
                out.push(b'\t');
                i += 1;
            }
            b'v' => {
                out.push(0x0B);
                i += 1;
            }
            b'\'' | b'"' | b'\\' | b'?' => {
                out.push(kind);
                i += 1;
            }
            b'x' | b'X' => {
                let (val, consumed) = read_radix(bytes, i + 1, 2, 2, 16, raw, span)?;
                out.push(val as u8);
                i += 1 + consumed;
            }
            b'u' => {
                let (val, consumed) = read_radix(bytes, i + 1, 4, 4, 16, raw, span)?;
                push_scalar(&mut out, val, raw, span)?;
                i += 1 + consumed;
            }
            b'U' => {
                let (val, consumed) = read_radix(bytes, i + 1, 8, 8, 16, raw, span)?;
                push_scalar(&mut out, val, raw, span)?;
                i += 1 + consumed;
            }
            b'0'..=b'7' => {
                let (val, consumed) = read_radix(bytes, i, 3, 3, 8, raw, span)?;
                if is_bytes {
                    if val > 0xFF {
                        return Err(ParseError::InvalidEscape {
                            sequence: raw.to_string(),
                            span,
                        });
                    }
                    out.push(val as u8);
                } else {
                    push_scalar(&mut out, val, raw, span)?;
                }
                i += consumed;
            }
            other => {
                return Err(ParseError::InvalidEscape {
                    sequence: format!("\\{}", other as char),
                    span,
                });
            }
        }
    }

    if is_bytes {
        Ok(Literal::Bytes(out))
    } else {
        String::from_utf8(out)
            .map(Literal::Str)
            .map_err(|_| ParseError::InvalidEscape {
                sequence: raw.to_string(),
                span,
            })
    }
}

fn read_radix(
    bytes: &[u8],
    start: usize,
    min_digits: usize,
    max_digits: usize,
    radix: u32,
    raw: &str,
    span: Span,
) -> Result<(u32, usize), ParseError> {
    let mut value: u32 = 0;
    let mut n = 0;
    while n < max_digits {
        let Some(&b) = bytes.get(start + n) else { break };
        let Some(digit) = (b as char).to_digit(radix) else {
            break;
        };
        value = value * radix + digit;
        n += 1;
    }
    if n < min_digits {
        return Err(ParseError::InvalidEscape {
            sequence: raw.to_string(),
            span,
        });
    }
    Ok((value, n))
}

fn push_scalar(out: &mut Vec<u8>, value: u32, raw: &str, span: Span) -> Result<(), ParseError> {
    let Some(c) = char::from_u32(value) else {
        return Err(ParseError::InvalidEscape {
            sequence: raw.to_string(),
            span,
        });
    };
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(raw: &str) -> Literal {
        unescape(raw, Span::empty()).unwrap()
    }

    #[test]
    fn simple_escapes() {
        assert_eq!(s(r"'a\nb'"), Literal::Str("a\nb".to_string()));
    }

    #[test]
    fn hex_and_unicode_escapes() {
        assert_eq!(s(r"'\x41'"), Literal::Str("A".to_string()));
        assert_eq!(s(r"'é'"), Literal::Str("é".to_string()));
    }

    #[test]
    fn octal_escape_in_bytes_is_a_raw_byte() {
        assert_eq!(s(r"b'\377'"), Literal::Bytes(vec![0xFF]));
    }

    #[test]
    fn octal_escape_in_string_is_a_scalar() {
        assert_eq!(s(r"'\101'"), Literal::Str("A".to_string()));
    }

    #[test]
    fn raw_string_disables_escapes() {
        assert_eq!(s(r"r'a\nb'"), Literal::Str(r"a\nb".to_string()));
    }

    #[test]
    fn triple_quoted_preserves_interior_quotes() {
        assert_eq!(
            s("\"\"\"\"hi\" there\"\"\""),
            Literal::Str("\"hi\" there".to_string())
        );
    }

    #[test]
    fn invalid_escape_reports_location() {
        assert!(unescape(r"'\q'", Span::empty()).is_err());
    }
}
