//! Token definitions for the CEL lexer.

mod precedence;

#[cfg(test)]
mod tests;

use logos::Logos;

pub use precedence::{Associativity, Precedence};

/// Reserved identifiers that cannot be used as declaration or variable names.
pub const RESERVED_IDENTIFIERS: &[&str] = &[
    "as", "break", "const", "continue", "else", "for", "function", "if", "import", "in", "let",
    "loop", "package", "namespace", "return", "var", "void", "while",
];

pub fn is_reserved_identifier(name: &str) -> bool {
    RESERVED_IDENTIFIERS.contains(&name)
}

/// CEL tokens.
///
/// String and bytes literals are lexed as a single raw [`Token::StringLiteral`]
/// (prefix letters and quotes included); `cel_parser::unescape` turns the raw
/// text into an unescaped string or byte vector.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // ==================== Keywords ====================
    #[token("as")]
    KwAs,
    #[token("break")]
    KwBreak,
    #[token("const")]
    KwConst,
    #[token("continue")]
    KwContinue,
    #[token("else")]
    KwElse,
    #[token("for")]
    KwFor,
    #[token("function")]
    KwFunction,
    #[token("if")]
    KwIf,
    #[token("import")]
    KwImport,
    #[token("in")]
    KwIn,
    #[token("let")]
    KwLet,
    #[token("loop")]
    KwLoop,
    #[token("package")]
    KwPackage,
    #[token("namespace")]
    KwNamespace,
    #[token("return")]
    KwReturn,
    #[token("var")]
    KwVar,
    #[token("void")]
    KwVoid,
    #[token("while")]
    KwWhile,

    // ==================== Literal keywords ====================
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // ==================== Identifier ====================
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    // ==================== Numeric literals ====================
    #[regex(r"0[xX][0-9a-fA-F]+[uU]?")]
    #[regex(r"[0-9]+[uU]?")]
    Int,

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?")]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+")]
    Float,

    // ==================== String / bytes literals ====================
    // Matched greedily as the opening quote run (incl. optional r/b prefix);
    // the lexer scans the remainder by hand to find the matching close.
    #[regex(r#"(?i:rb|br|r|b)?"""#)]
    #[regex(r#"(?i:rb|br|r|b)?'''"#)]
    #[regex(r#"(?i:rb|br|r|b)?""#)]
    #[regex(r#"(?i:rb|br|r|b)?'"#)]
    StringLiteral,

    // ==================== Punctuation ====================
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,

    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token("<")]
    Lt,
    #[token(">=")]
    GtEq,
    #[token(">")]
    Gt,
}

impl Token {
    pub fn describe(&self) -> &'static str {
        match self {
            Token::Ident => "identifier",
            Token::Int => "integer literal",
            Token::Float => "floating point literal",
            Token::StringLiteral => "string literal",
            Token::True | Token::False => "boolean literal",
            Token::Null => "null literal",
            _ => "token",
        }
    }

    pub fn is_compound_start(&self) -> bool {
        matches!(self, Token::LBracket | Token::LBrace)
    }
}
