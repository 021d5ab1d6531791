// token.rs — Lexical token types for CCL source.

use std::fmt;

/// Token kinds produced by the [`Lexer`](crate::lexer::Lexer).
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    Permit,
    Deny,
    Require,
    Limit,
    On,
    When,
    Per,
    And,
    Or,
    Not,
    Severity,

    // Literals
    Ident(String),
    Str(String),
    Number(f64),

    /// One of `= != < > <= >=`. Word operators (`in`, `contains`, ...) are
    /// lexed as identifiers and resolved by the parser.
    Operator(String),

    // Punctuation
    Dot,
    Comma,
    LBracket,
    RBracket,
    LParen,
    RParen,

    /// `*`: exactly one segment.
    Wildcard,
    /// `**`: any number of segments.
    DoubleWildcard,

    Newline,
    Eof,
}

impl TokenKind {
    /// Map a reserved word to its keyword kind. Keywords are case-sensitive.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "permit" => TokenKind::Permit,
            "deny" => TokenKind::Deny,
            "require" => TokenKind::Require,
            "limit" => TokenKind::Limit,
            "on" => TokenKind::On,
            "when" => TokenKind::When,
            "per" => TokenKind::Per,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "severity" => TokenKind::Severity,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Permit => write!(f, "'permit'"),
            TokenKind::Deny => write!(f, "'deny'"),
            TokenKind::Require => write!(f, "'require'"),
            TokenKind::Limit => write!(f, "'limit'"),
            TokenKind::On => write!(f, "'on'"),
            TokenKind::When => write!(f, "'when'"),
            TokenKind::Per => write!(f, "'per'"),
            TokenKind::And => write!(f, "'and'"),
            TokenKind::Or => write!(f, "'or'"),
            TokenKind::Not => write!(f, "'not'"),
            TokenKind::Severity => write!(f, "'severity'"),
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::Str(s) => write!(f, "string '{}'", s),
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::Operator(op) => write!(f, "operator '{}'", op),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::Wildcard => write!(f, "'*'"),
            TokenKind::DoubleWildcard => write!(f, "'**'"),
            TokenKind::Newline => write!(f, "end of line"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with its source text and 1-based position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The raw source text of the token (quotes included for strings).
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}
