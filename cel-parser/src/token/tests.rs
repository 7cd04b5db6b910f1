use super::*;

#[test]
fn lexes_arithmetic() {
    let toks: Vec<_> = Token::lexer("1 + 2 * 3").filter_map(|t| t.ok()).collect();
    assert_eq!(toks, vec![Token::Int, Token::Plus, Token::Int, Token::Star, Token::Int]);
}

#[test]
fn lexes_keywords_and_identifiers() {
    let toks: Vec<_> = Token::lexer("in x").filter_map(|t| t.ok()).collect();
    assert_eq!(toks, vec![Token::KwIn, Token::Ident]);
}

#[test]
fn reserved_identifiers_are_known() {
    assert!(is_reserved_identifier("let"));
    assert!(!is_reserved_identifier("request"));
}

#[test]
fn string_prefix_not_confused_with_identifier() {
    // The raw logos stream only decides where an opening quote run starts;
    // `crate::lexer::Lexer` does the manual scan to the matching close.
    let toks: Vec<_> = Token::lexer("r'abc'").filter_map(|t| t.ok()).collect();
    assert_eq!(
        toks,
        vec![Token::StringLiteral, Token::Ident, Token::StringLiteral]
    );
}
