// parser.rs — Recursive-descent parser: tokens → Document.
//
// Grammar:
//
//   document     = { statement NEWLINE }* EOF
//   statement    = permit_deny | require_stmt | limit_stmt
//   permit_deny  = (PERMIT|DENY) action ON resource [WHEN condition] [SEVERITY level]
//   require_stmt = REQUIRE action ON resource [WHEN condition] [SEVERITY level]
//   limit_stmt   = LIMIT action NUMBER PER NUMBER TIMEUNIT [SEVERITY level]
//   condition    = or_expr
//   or_expr      = and_expr { OR and_expr }*
//   and_expr     = not_expr { AND not_expr }*
//   not_expr     = NOT not_expr | primary
//   primary      = "(" condition ")" | field OPERATOR value
//
// The first malformed token aborts the parse; callers never see a partial
// document. Condition nesting is bounded so adversarial input cannot exhaust
// the stack.

use serde::{Deserialize, Serialize};

use crate::ast::{
    AccessRule, Condition, Document, LimitRule, Operator, Severity, Statement, Value,
    MAX_DOCUMENT_CONDITION_DEPTH,
};
use crate::error::CclError;
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};

/// Upper bound for [`ParserOptions::max_condition_depth`]. One parser level
/// can produce two tree levels (`a or b and (...)`), so this keeps every
/// parsed condition within [`MAX_DOCUMENT_CONDITION_DEPTH`].
pub const MAX_CONDITION_DEPTH: usize = MAX_DOCUMENT_CONDITION_DEPTH / 2;

/// Parser settings. Usually loaded as part of [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserOptions {
    /// Maximum nesting of parenthesized groups and `not` chains in a `when`
    /// clause. Values above [`MAX_CONDITION_DEPTH`] are clamped.
    #[serde(default = "default_max_condition_depth")]
    pub max_condition_depth: usize,

    /// Reject unknown time units in `limit` statements instead of treating
    /// them as seconds.
    #[serde(default)]
    pub strict_time_units: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_condition_depth: default_max_condition_depth(),
            strict_time_units: false,
        }
    }
}

fn default_max_condition_depth() -> usize {
    32
}

/// Parse CCL source with default options.
pub fn parse(source: &str) -> Result<Document, CclError> {
    parse_with(source, &ParserOptions::default())
}

/// Parse CCL source with explicit options.
pub fn parse_with(source: &str, options: &ParserOptions) -> Result<Document, CclError> {
    let tokens = tokenize(source)?;
    let document = Parser::new(tokens, options.clone()).parse_document()?;
    tracing::debug!(
        statements = document.len(),
        permits = document.permits().count(),
        denies = document.denies().count(),
        obligations = document.obligations().count(),
        limits = document.limits().count(),
        "parsed CCL document"
    );
    Ok(document)
}

/// Seconds per time unit; `None` for units the language does not know.
pub fn time_unit_seconds(unit: &str) -> Option<u64> {
    match unit {
        "second" | "seconds" => Some(1),
        "minute" | "minutes" => Some(60),
        "hour" | "hours" => Some(3_600),
        "day" | "days" => Some(86_400),
        _ => None,
    }
}

/// Cursor over one token buffer.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    options: ParserOptions,
}

impl Parser {
    /// `tokens` must end with [`TokenKind::Eof`], as [`tokenize`] guarantees.
    pub fn new(mut tokens: Vec<Token>, mut options: ParserOptions) -> Self {
        options.max_condition_depth = options.max_condition_depth.min(MAX_CONDITION_DEPTH);
        if tokens.last().map(|t| &t.kind) != Some(&TokenKind::Eof) {
            let (line, column) = tokens.last().map(|t| (t.line, t.column)).unwrap_or((1, 1));
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                line,
                column,
            });
        }
        Self {
            tokens,
            pos: 0,
            depth: 0,
            options,
        }
    }

    pub fn parse_document(mut self) -> Result<Document, CclError> {
        let mut statements = Vec::new();
        loop {
            while self.check(&TokenKind::Newline) {
                self.advance();
            }
            if self.check(&TokenKind::Eof) {
                break;
            }
            statements.push(self.parse_statement()?);
            match self.current().kind {
                TokenKind::Newline => self.advance(),
                TokenKind::Eof => {}
                _ => return Err(self.expected("end of line after statement")),
            }
        }
        Document::new(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, CclError> {
        match self.current().kind {
            TokenKind::Permit => Ok(Statement::Permit(self.parse_access_rule()?)),
            TokenKind::Deny => Ok(Statement::Deny(self.parse_access_rule()?)),
            TokenKind::Require => Ok(Statement::Require(self.parse_access_rule()?)),
            TokenKind::Limit => Ok(Statement::Limit(self.parse_limit()?)),
            _ => Err(self.expected("'permit', 'deny', 'require' or 'limit'")),
        }
    }

    /// Body of `permit`/`deny`/`require`; the keyword is still current.
    fn parse_access_rule(&mut self) -> Result<AccessRule, CclError> {
        let line = self.current().line;
        self.advance();
        let action = self.parse_action()?;
        self.expect(TokenKind::On)?;
        let resource = self.parse_resource()?;
        let condition = if self.check(&TokenKind::When) {
            self.advance();
            Some(self.parse_condition()?)
        } else {
            None
        };
        let severity = self.parse_severity_clause()?;
        Ok(AccessRule {
            action,
            resource,
            condition,
            severity,
            line,
        })
    }

    fn parse_limit(&mut self) -> Result<LimitRule, CclError> {
        let line = self.current().line;
        self.advance();
        let action = self.parse_action()?;
        let count = self.expect_whole_number("limit count")?;
        self.expect(TokenKind::Per)?;
        let amount = self.expect_whole_number("period length")?;

        let unit_token = self.current().clone();
        let unit = match &unit_token.kind {
            TokenKind::Ident(unit) => unit.clone(),
            _ => return Err(self.expected("time unit (seconds, minutes, hours or days)")),
        };
        self.advance();
        let multiplier = match time_unit_seconds(&unit) {
            Some(m) => m,
            None if self.options.strict_time_units => {
                return Err(syntax_error(
                    &unit_token,
                    format!(
                        "unknown time unit '{}' (expected seconds, minutes, hours or days)",
                        unit
                    ),
                ));
            }
            None => {
                tracing::warn!(
                    unit = %unit,
                    line = unit_token.line,
                    "unknown time unit in limit statement; treating as seconds"
                );
                1
            }
        };
        let period_seconds = amount
            .checked_mul(multiplier)
            .ok_or_else(|| syntax_error(&unit_token, "limit period is too large".to_string()))?;
        if period_seconds == 0 {
            return Err(syntax_error(
                &unit_token,
                "limit period must be greater than zero".to_string(),
            ));
        }

        let severity = self.parse_severity_clause()?;
        Ok(LimitRule {
            action,
            count,
            period_seconds,
            severity,
            line,
        })
    }

    /// Dot-separated segments: identifiers, `*` or `**`, with a bare word
    /// (keyword or number) allowed after the first dot.
    fn parse_action(&mut self) -> Result<String, CclError> {
        let mut segments = Vec::new();
        match &self.current().kind {
            TokenKind::Ident(name) => segments.push(name.clone()),
            TokenKind::Wildcard => segments.push("*".to_string()),
            TokenKind::DoubleWildcard => segments.push("**".to_string()),
            _ => return Err(self.expected("action pattern")),
        }
        self.advance();

        while self.check(&TokenKind::Dot) {
            self.advance();
            let segment = match &self.current().kind {
                TokenKind::Ident(name) => name.clone(),
                TokenKind::Wildcard => "*".to_string(),
                TokenKind::DoubleWildcard => "**".to_string(),
                // Reserved words are fine after a dot (`data.limit`).
                kind if is_keyword(kind) => self.current().lexeme.clone(),
                _ => return Err(self.expected("action segment after '.'")),
            };
            self.advance();
            segments.push(segment);
        }
        Ok(segments.join("."))
    }

    fn parse_resource(&mut self) -> Result<String, CclError> {
        let resource = match &self.current().kind {
            TokenKind::Str(s) if s.is_empty() => {
                return Err(syntax_error(self.current(), "empty resource pattern".to_string()))
            }
            TokenKind::Str(s) => s.clone(),
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Wildcard => "*".to_string(),
            TokenKind::DoubleWildcard => "**".to_string(),
            _ => return Err(self.expected("resource")),
        };
        self.advance();
        Ok(resource)
    }

    fn parse_severity_clause(&mut self) -> Result<Severity, CclError> {
        if !self.check(&TokenKind::Severity) {
            return Ok(Severity::default());
        }
        self.advance();
        let token = self.current().clone();
        match &token.kind {
            TokenKind::Ident(level) => {
                let severity = level
                    .parse::<Severity>()
                    .map_err(|msg| syntax_error(&token, msg))?;
                self.advance();
                Ok(severity)
            }
            _ => Err(self.expected("severity level")),
        }
    }

    // ── Conditions ───────────────────────────────────────────────

    fn parse_condition(&mut self) -> Result<Condition, CclError> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> Result<Condition, CclError> {
        self.enter()?;
        let mut operands = vec![self.parse_and_expr()?];
        while self.check(&TokenKind::Or) {
            self.advance();
            operands.push(self.parse_and_expr()?);
        }
        self.leave();
        Ok(fold(operands, |operands| Condition::Or { operands }))
    }

    fn parse_and_expr(&mut self) -> Result<Condition, CclError> {
        let mut operands = vec![self.parse_not_expr()?];
        while self.check(&TokenKind::And) {
            self.advance();
            operands.push(self.parse_not_expr()?);
        }
        Ok(fold(operands, |operands| Condition::And { operands }))
    }

    fn parse_not_expr(&mut self) -> Result<Condition, CclError> {
        if self.check(&TokenKind::Not) {
            self.advance();
            self.enter()?;
            let operand = self.parse_not_expr()?;
            self.leave();
            return Ok(Condition::Not {
                operand: Box::new(operand),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Condition, CclError> {
        if self.check(&TokenKind::LParen) {
            self.advance();
            let inner = self.parse_condition()?;
            self.expect(TokenKind::RParen)?;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Condition, CclError> {
        let field = self.parse_field()?;

        let operator = match &self.current().kind {
            TokenKind::Operator(sym) => Operator::from_symbol(sym),
            TokenKind::Ident(word) => Operator::from_symbol(word),
            _ => None,
        }
        .ok_or_else(|| self.expected("comparison operator"))?;
        self.advance();

        let value_token = self.current().clone();
        let value = self.parse_value()?;

        if operator.expects_array() && !matches!(value, Value::Array(_)) {
            return Err(syntax_error(
                &value_token,
                format!("operator '{}' requires an array value", operator),
            ));
        }
        if operator == Operator::Matches {
            match &value {
                Value::String(re) => {
                    regex::Regex::new(re).map_err(|e| {
                        syntax_error(&value_token, format!("invalid regex '{}': {}", re, e))
                    })?;
                }
                _ => {
                    return Err(syntax_error(
                        &value_token,
                        "operator 'matches' requires a string pattern".to_string(),
                    ))
                }
            }
        }

        Ok(Condition::Comparison {
            field,
            operator,
            value,
        })
    }

    fn parse_field(&mut self) -> Result<String, CclError> {
        let mut segments = match &self.current().kind {
            TokenKind::Ident(name) => vec![name.clone()],
            _ => return Err(self.expected("field name")),
        };
        self.advance();
        while self.check(&TokenKind::Dot) {
            self.advance();
            let segment = match &self.current().kind {
                TokenKind::Ident(name) => name.clone(),
                kind if is_keyword(kind) => self.current().lexeme.clone(),
                _ => return Err(self.expected("field segment after '.'")),
            };
            self.advance();
            segments.push(segment);
        }
        Ok(segments.join("."))
    }

    fn parse_value(&mut self) -> Result<Value, CclError> {
        let value = match &self.current().kind {
            TokenKind::Str(s) => Value::String(s.clone()),
            TokenKind::Number(n) => Value::Number(*n),
            TokenKind::Ident(word) if word == "true" => Value::Bool(true),
            TokenKind::Ident(word) if word == "false" => Value::Bool(false),
            TokenKind::LBracket => return self.parse_array(),
            _ => return Err(self.expected("value (string, number, boolean or array)")),
        };
        self.advance();
        Ok(value)
    }

    fn parse_array(&mut self) -> Result<Value, CclError> {
        self.enter()?;
        self.advance();
        let mut items = vec![self.parse_value()?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            items.push(self.parse_value()?);
        }
        self.expect(TokenKind::RBracket)?;
        self.leave();
        Ok(Value::Array(items))
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn enter(&mut self) -> Result<(), CclError> {
        self.depth += 1;
        if self.depth > self.options.max_condition_depth {
            let max = self.options.max_condition_depth;
            return Err(syntax_error(
                self.current(),
                format!("condition nesting exceeds the maximum depth of {}", max),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn expect_whole_number(&mut self, what: &str) -> Result<u64, CclError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Number(n) if n >= 0.0 && n.fract() == 0.0 && n <= u64::MAX as f64 => {
                self.advance();
                Ok(n as u64)
            }
            TokenKind::Number(_) => Err(syntax_error(
                &token,
                format!("{} must be a non-negative whole number", what),
            )),
            _ => Err(self.expected(what)),
        }
    }

    fn current(&self) -> &Token {
        // `new` guarantees a trailing Eof and `advance` never moves past it.
        &self.tokens[self.pos]
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), CclError> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.expected(&kind.to_string()))
        }
    }

    fn expected(&self, what: &str) -> CclError {
        let token = self.current();
        syntax_error(token, format!("expected {}, found {}", what, token.kind))
    }
}

fn syntax_error(token: &Token, message: String) -> CclError {
    CclError::Syntax {
        message,
        line: token.line,
        column: token.column,
    }
}

fn is_keyword(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Permit
            | TokenKind::Deny
            | TokenKind::Require
            | TokenKind::Limit
            | TokenKind::On
            | TokenKind::When
            | TokenKind::Per
            | TokenKind::And
            | TokenKind::Or
            | TokenKind::Not
            | TokenKind::Severity
    )
}

/// A single operand stays bare; repeated same-level operands form one flat node.
fn fold(mut operands: Vec<Condition>, build: impl FnOnce(Vec<Condition>) -> Condition) -> Condition {
    if operands.len() == 1 {
        if let Some(only) = operands.pop() {
            return only;
        }
    }
    build(operands)
}
