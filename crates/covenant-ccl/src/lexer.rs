// lexer.rs — CCL source text → flat token stream.
//
// The lexer is a single forward pass over the characters of the source.
// Newlines are significant (they separate statements) and are emitted as
// tokens; `#` comments and other whitespace are dropped. There is no error
// recovery: the first bad character aborts the whole parse.

use crate::error::CclError;
use crate::token::{Token, TokenKind};

/// Tokenize CCL source. The returned stream always ends with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, CclError> {
    Lexer::new(source).tokenize()
}

/// Cursor over the characters of one source text.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Consume the whole input.
    pub fn tokenize(mut self) -> Result<Vec<Token>, CclError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, CclError> {
        self.skip_blanks();

        let (line, column) = (self.line, self.column);
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                line,
                column,
            });
        };

        let kind = match c {
            '\n' => {
                self.bump();
                TokenKind::Newline
            }
            '\'' | '"' => return self.string(c, line, column),
            '*' => {
                self.bump();
                if self.peek() == Some('*') {
                    self.bump();
                    TokenKind::DoubleWildcard
                } else {
                    TokenKind::Wildcard
                }
            }
            '.' => {
                self.bump();
                TokenKind::Dot
            }
            ',' => {
                self.bump();
                TokenKind::Comma
            }
            '[' => {
                self.bump();
                TokenKind::LBracket
            }
            ']' => {
                self.bump();
                TokenKind::RBracket
            }
            '(' => {
                self.bump();
                TokenKind::LParen
            }
            ')' => {
                self.bump();
                TokenKind::RParen
            }
            '=' => {
                self.bump();
                TokenKind::Operator("=".to_string())
            }
            '!' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Operator("!=".to_string())
                } else {
                    return Err(self.lex_error("expected '=' after '!'", line, column));
                }
            }
            '<' | '>' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Operator(format!("{}=", c))
                } else {
                    TokenKind::Operator(c.to_string())
                }
            }
            // Digits straight after a '.' form a path segment (`api.1.2`).
            c if c.is_ascii_digit() && self.follows_dot() => return Ok(self.word(line, column)),
            c if c.is_ascii_digit() => return self.number(line, column),
            '-' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                return self.number(line, column)
            }
            c if c.is_ascii_alphabetic() || c == '_' => return Ok(self.word(line, column)),
            other => {
                return Err(self.lex_error(
                    &format!("unexpected character '{}'", other.escape_default()),
                    line,
                    column,
                ))
            }
        };

        let lexeme = match &kind {
            TokenKind::Newline => "\n".to_string(),
            TokenKind::Operator(op) => op.clone(),
            _ => self.chars[self.pos_of(line, column)..self.pos].iter().collect(),
        };
        Ok(Token {
            kind,
            lexeme,
            line,
            column,
        })
    }

    /// Skip spaces, tabs, carriage returns and comments. Stops at `\n`.
    fn skip_blanks(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => self.bump(),
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> Result<Token, CclError> {
        let start = self.pos;
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(self.lex_error("unterminated string", line, column));
                }
                Some(c) if c == quote => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    let (esc_line, esc_col) = (self.line, self.column);
                    self.bump();
                    let escaped = match self.peek() {
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some('"') => '"',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        None | Some('\n') => {
                            return Err(self.lex_error("unterminated string", line, column));
                        }
                        Some(other) => {
                            return Err(self.lex_error(
                                &format!("invalid escape '\\{}'", other),
                                esc_line,
                                esc_col,
                            ));
                        }
                    };
                    self.bump();
                    value.push(escaped);
                }
                Some(c) => {
                    self.bump();
                    value.push(c);
                }
            }
        }
        Ok(Token {
            kind: TokenKind::Str(value),
            lexeme: self.chars[start..self.pos].iter().collect(),
            line,
            column,
        })
    }

    fn follows_dot(&self) -> bool {
        self.pos > 0 && self.chars[self.pos - 1] == '.'
    }

    fn number(&mut self, line: usize, column: usize) -> Result<Token, CclError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        self.eat_digits();
        // A '.' only belongs to the number when a digit follows it.
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
            self.bump();
            self.eat_digits();
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        let value = lexeme
            .parse::<f64>()
            .map_err(|_| self.lex_error(&format!("invalid number '{}'", lexeme), line, column))?;
        Ok(Token {
            kind: TokenKind::Number(value),
            lexeme,
            line,
            column,
        })
    }

    fn word(&mut self, line: usize, column: usize) -> Token {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                self.bump();
            } else {
                break;
            }
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        let kind = TokenKind::keyword(&lexeme).unwrap_or_else(|| TokenKind::Ident(lexeme.clone()));
        Token {
            kind,
            lexeme,
            line,
            column,
        }
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    /// Character index of a token that started at `line:column` on the current
    /// line. Only used for single-line punctuation tokens.
    fn pos_of(&self, line: usize, column: usize) -> usize {
        debug_assert_eq!(line, self.line);
        self.pos - (self.column - column)
    }

    fn lex_error(&self, message: &str, line: usize, column: usize) -> CclError {
        CclError::Lex {
            message: message.to_string(),
            line,
            column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn permit_statement_tokens() {
        assert_eq!(
            kinds("permit file.read on '/data/**'"),
            vec![
                TokenKind::Permit,
                TokenKind::Ident("file".to_string()),
                TokenKind::Dot,
                TokenKind::Ident("read".to_string()),
                TokenKind::On,
                TokenKind::Str("/data/**".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn wildcards_and_operators() {
        assert_eq!(
            kinds("* ** = != < <= > >="),
            vec![
                TokenKind::Wildcard,
                TokenKind::DoubleWildcard,
                TokenKind::Operator("=".to_string()),
                TokenKind::Operator("!=".to_string()),
                TokenKind::Operator("<".to_string()),
                TokenKind::Operator("<=".to_string()),
                TokenKind::Operator(">".to_string()),
                TokenKind::Operator(">=".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(
            kinds("Permit permit"),
            vec![
                TokenKind::Ident("Permit".to_string()),
                TokenKind::Permit,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_dropped_but_newlines_kept() {
        assert_eq!(
            kinds("# header\ndeny x on '/a' # trailing\n"),
            vec![
                TokenKind::Newline,
                TokenKind::Deny,
                TokenKind::Ident("x".to_string()),
                TokenKind::On,
                TokenKind::Str("/a".to_string()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_integer_fraction_negative() {
        assert_eq!(
            kinds("100 0.5 -3"),
            vec![
                TokenKind::Number(100.0),
                TokenKind::Number(0.5),
                TokenKind::Number(-3.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes_and_double_quotes() {
        assert_eq!(
            kinds(r#""it\'s" 'say \"hi\"\n'"#),
            vec![
                TokenKind::Str("it's".to_string()),
                TokenKind::Str("say \"hi\"\n".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn positions_are_one_based() {
        let tokens = tokenize("permit read\n  on '/x'").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 8));
        assert_eq!(tokens[1].lexeme, "read");
        // tokens[2] is the newline
        assert_eq!((tokens[3].line, tokens[3].column), (2, 3));
        assert_eq!((tokens[4].line, tokens[4].column), (2, 6));
        assert_eq!(tokens[4].lexeme, "'/x'");
    }

    #[test]
    fn unterminated_string_points_at_opening_quote() {
        let err = tokenize("permit read on '/x").unwrap_err();
        match err {
            CclError::Lex {
                message,
                line,
                column,
            } => {
                assert!(message.contains("unterminated"));
                assert_eq!((line, column), (1, 16));
            }
            other => panic!("expected Lex error, got {:?}", other),
        }
    }

    #[test]
    fn illegal_character_is_rejected() {
        let err = tokenize("permit read on @").unwrap_err();
        assert_eq!(err.line(), Some(1));
        assert_eq!(err.column(), Some(16));
        assert!(err.to_string().contains("unexpected character '@'"));
    }

    #[test]
    fn bare_bang_is_rejected() {
        assert!(tokenize("x ! 1").is_err());
    }

    #[test]
    fn digits_after_dot_are_a_segment() {
        assert_eq!(
            kinds("api.1.2 x = 1.5"),
            vec![
                TokenKind::Ident("api".to_string()),
                TokenKind::Dot,
                TokenKind::Ident("1".to_string()),
                TokenKind::Dot,
                TokenKind::Ident("2".to_string()),
                TokenKind::Ident("x".to_string()),
                TokenKind::Operator("=".to_string()),
                TokenKind::Number(1.5),
                TokenKind::Eof,
            ]
        );
        // a space breaks the segment: this is a dot then a number
        assert_eq!(kinds(". 2")[1], TokenKind::Number(2.0));
    }

    #[test]
    fn identifiers_allow_dash_and_underscore() {
        assert_eq!(
            kinds("api_v2 read-only"),
            vec![
                TokenKind::Ident("api_v2".to_string()),
                TokenKind::Ident("read-only".to_string()),
                TokenKind::Eof,
            ]
        );
    }
}
