// ast.rs — Typed statement model for parsed CCL documents.
//
// A Document is an ordered list of statements plus four bucket views
// (permits, denies, obligations, limits). The buckets are index partitions
// computed once at construction; the statement list is private, so the
// views can never drift out of sync with it.
//
// The `Display` impls render canonical CCL source. Parsing the rendered text
// yields the same statements (modulo `line`).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CclError;
use crate::pattern;

/// Hard ceiling on condition nesting for documents that bypass the parser.
pub const MAX_DOCUMENT_CONDITION_DEPTH: usize = 128;

/// Priority/strength annotation attached to every statement.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    #[default]
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(format!(
                "unknown severity '{}' (expected critical, high, medium or low)",
                other
            )),
        }
    }
}

/// Discriminant of a [`Statement`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Permit,
    Deny,
    Require,
    Limit,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Permit => write!(f, "permit"),
            StatementKind::Deny => write!(f, "deny"),
            StatementKind::Require => write!(f, "require"),
            StatementKind::Limit => write!(f, "limit"),
        }
    }
}

/// Body shared by `permit`, `deny` and `require` statements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessRule {
    /// Dot-segmented action pattern (e.g. `file.read`, `file.*`, `**`).
    pub action: String,
    /// Slash-segmented resource pattern (e.g. `/data/**`).
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub severity: Severity,
    /// 1-based source line (0 for statements built in code).
    #[serde(default)]
    pub line: usize,
}

/// Body of a `limit` statement. The period is normalized to seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitRule {
    pub action: String,
    pub count: u64,
    pub period_seconds: u64,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub line: usize,
}

/// One CCL statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    Permit(AccessRule),
    Deny(AccessRule),
    Require(AccessRule),
    Limit(LimitRule),
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Permit(_) => StatementKind::Permit,
            Statement::Deny(_) => StatementKind::Deny,
            Statement::Require(_) => StatementKind::Require,
            Statement::Limit(_) => StatementKind::Limit,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            Statement::Permit(r) | Statement::Deny(r) | Statement::Require(r) => &r.action,
            Statement::Limit(l) => &l.action,
        }
    }

    /// Resource pattern. Limits apply to every resource, so they report `**`.
    pub fn resource(&self) -> &str {
        match self {
            Statement::Permit(r) | Statement::Deny(r) | Statement::Require(r) => &r.resource,
            Statement::Limit(_) => "**",
        }
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Statement::Permit(r) | Statement::Deny(r) | Statement::Require(r) => {
                r.condition.as_ref()
            }
            Statement::Limit(_) => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Statement::Permit(r) | Statement::Deny(r) | Statement::Require(r) => r.severity,
            Statement::Limit(l) => l.severity,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Statement::Permit(r) | Statement::Deny(r) | Statement::Require(r) => r.line,
            Statement::Limit(l) => l.line,
        }
    }

    pub fn as_access_rule(&self) -> Option<&AccessRule> {
        match self {
            Statement::Permit(r) | Statement::Deny(r) | Statement::Require(r) => Some(r),
            Statement::Limit(_) => None,
        }
    }

    pub fn as_limit(&self) -> Option<&LimitRule> {
        match self {
            Statement::Limit(l) => Some(l),
            _ => None,
        }
    }

    /// Same statement with `line` cleared, for position-insensitive comparison.
    pub fn without_line(&self) -> Statement {
        let mut s = self.clone();
        match &mut s {
            Statement::Permit(r) | Statement::Deny(r) | Statement::Require(r) => r.line = 0,
            Statement::Limit(l) => l.line = 0,
        }
        s
    }

    fn validate(&self, regexes: &mut RegexCache) -> Result<(), CclError> {
        pattern::validate_action_pattern(self.action()).map_err(CclError::invalid)?;
        match self {
            Statement::Permit(r) | Statement::Deny(r) | Statement::Require(r) => {
                if r.resource.is_empty() {
                    return Err(CclError::invalid(format!(
                        "{} '{}' has an empty resource pattern",
                        self.kind(),
                        r.action
                    )));
                }
                if let Some(cond) = &r.condition {
                    cond.validate(1, regexes)?;
                }
            }
            Statement::Limit(l) => {
                if l.period_seconds == 0 {
                    return Err(CclError::invalid(format!(
                        "limit on '{}' has a zero-length period",
                        l.action
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Comparison operators usable in `when` clauses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
    #[serde(rename = "starts_with")]
    StartsWith,
    #[serde(rename = "ends_with")]
    EndsWith,
    #[serde(rename = "matches")]
    Matches,
}

impl Operator {
    /// Resolve a symbolic operator token or an operator word.
    pub fn from_symbol(s: &str) -> Option<Operator> {
        let op = match s {
            "=" => Operator::Eq,
            "!=" => Operator::Ne,
            "<" => Operator::Lt,
            ">" => Operator::Gt,
            "<=" => Operator::Le,
            ">=" => Operator::Ge,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "contains" => Operator::Contains,
            "not_contains" => Operator::NotContains,
            "starts_with" => Operator::StartsWith,
            "ends_with" => Operator::EndsWith,
            "matches" => Operator::Matches,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
            Operator::Matches => "matches",
        }
    }

    /// Membership operators take an array on the right-hand side.
    pub fn expects_array(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A literal on the right-hand side of a comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
}

impl Value {
    /// `[]` anywhere in the value. The grammar has no empty array literal.
    fn has_empty_array(&self) -> bool {
        match self {
            Value::Array(items) => items.is_empty() || items.iter().any(Value::has_empty_array),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write_quoted(f, s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Boolean condition tree of a `when` clause.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Comparison {
        /// Dotted path into the evaluation context (e.g. `user.role`).
        field: String,
        operator: Operator,
        value: Value,
    },
    And {
        operands: Vec<Condition>,
    },
    Or {
        operands: Vec<Condition>,
    },
    Not {
        operand: Box<Condition>,
    },
}

impl Condition {
    /// Nesting depth of the tree; a lone comparison has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            Condition::Comparison { .. } => 1,
            Condition::And { operands } | Condition::Or { operands } => {
                1 + operands.iter().map(Condition::depth).max().unwrap_or(0)
            }
            Condition::Not { operand } => 1 + operand.depth(),
        }
    }

    fn validate(&self, depth: usize, regexes: &mut RegexCache) -> Result<(), CclError> {
        if depth > MAX_DOCUMENT_CONDITION_DEPTH {
            return Err(CclError::invalid(format!(
                "condition nesting exceeds {} levels",
                MAX_DOCUMENT_CONDITION_DEPTH
            )));
        }
        match self {
            Condition::Comparison {
                field,
                operator,
                value,
            } => {
                if field.is_empty() || field.split('.').any(str::is_empty) {
                    return Err(CclError::invalid(format!("malformed field path '{}'", field)));
                }
                if operator.expects_array() && !matches!(value, Value::Array(_)) {
                    return Err(CclError::invalid(format!(
                        "operator '{}' on '{}' requires an array value",
                        operator, field
                    )));
                }
                if value.has_empty_array() {
                    return Err(CclError::invalid(format!(
                        "comparison on '{}' has an empty array value",
                        field
                    )));
                }
                if *operator == Operator::Matches {
                    match value {
                        Value::String(re) => regexes.insert(re)?,
                        _ => {
                            return Err(CclError::invalid(format!(
                                "operator 'matches' on '{}' requires a string pattern",
                                field
                            )))
                        }
                    }
                }
                Ok(())
            }
            Condition::And { operands } | Condition::Or { operands } => {
                if operands.len() < 2 {
                    return Err(CclError::invalid(
                        "'and'/'or' conditions need at least two operands",
                    ));
                }
                operands.iter().try_for_each(|c| c.validate(depth + 1, regexes))
            }
            Condition::Not { operand } => operand.validate(depth + 1, regexes),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Comparison {
                field,
                operator,
                value,
            } => write!(f, "{} {} {}", field, operator, value),
            Condition::And { operands } => {
                for (i, op) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " and ")?;
                    }
                    match op {
                        Condition::And { .. } | Condition::Or { .. } => write!(f, "({})", op)?,
                        _ => write!(f, "{}", op)?,
                    }
                }
                Ok(())
            }
            Condition::Or { operands } => {
                for (i, op) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    match op {
                        Condition::Or { .. } => write!(f, "({})", op)?,
                        _ => write!(f, "{}", op)?,
                    }
                }
                Ok(())
            }
            Condition::Not { operand } => match operand.as_ref() {
                Condition::And { .. } | Condition::Or { .. } => write!(f, "not ({})", operand),
                _ => write!(f, "not {}", operand),
            },
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Permit(r) | Statement::Deny(r) | Statement::Require(r) => {
                write!(f, "{} {} on ", self.kind(), r.action)?;
                write_resource(f, &r.resource)?;
                if let Some(cond) = &r.condition {
                    write!(f, " when {}", cond)?;
                }
                write_severity(f, r.severity)
            }
            Statement::Limit(l) => {
                let (amount, unit) = largest_unit(l.period_seconds);
                write!(f, "limit {} {} per {} {}", l.action, l.count, amount, unit)?;
                write_severity(f, l.severity)
            }
        }
    }
}

fn write_severity(f: &mut fmt::Formatter<'_>, severity: Severity) -> fmt::Result {
    if severity == Severity::default() {
        Ok(())
    } else {
        write!(f, " severity {}", severity)
    }
}

fn write_resource(f: &mut fmt::Formatter<'_>, resource: &str) -> fmt::Result {
    match resource {
        "*" | "**" => f.write_str(resource),
        _ => write_quoted(f, resource),
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("'")
}

/// Render a period in the largest unit that divides it evenly.
fn largest_unit(seconds: u64) -> (u64, &'static str) {
    for (size, unit) in [(86_400, "days"), (3_600, "hours"), (60, "minutes")] {
        if seconds >= size && seconds % size == 0 {
            return (seconds / size, unit);
        }
    }
    (seconds, "seconds")
}

/// Compiled `matches` patterns of one document, keyed by pattern text.
#[derive(Debug, Clone, Default)]
pub(crate) struct RegexCache(HashMap<String, Regex>);

impl RegexCache {
    fn insert(&mut self, pattern: &str) -> Result<(), CclError> {
        if !self.0.contains_key(pattern) {
            let re = Regex::new(pattern)
                .map_err(|e| CclError::invalid(format!("invalid regex '{}': {}", pattern, e)))?;
            self.0.insert(pattern.to_string(), re);
        }
        Ok(())
    }

    /// Patterns outside the cache are compiled on the spot; an invalid one
    /// never matches.
    pub(crate) fn is_match(&self, pattern: &str, text: &str) -> bool {
        match self.0.get(pattern) {
            Some(re) => re.is_match(text),
            None => Regex::new(pattern).is_ok_and(|re| re.is_match(text)),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// A parsed CCL document. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DocumentRepr", into = "DocumentRepr")]
pub struct Document {
    statements: Vec<Statement>,
    permits: Vec<usize>,
    denies: Vec<usize>,
    obligations: Vec<usize>,
    limits: Vec<usize>,
    regexes: RegexCache,
}

/// Buckets and regexes are derived from the statements, so they are all
/// that is compared.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.statements == other.statements
    }
}

/// Wire form: only the flat statement list is serialized.
#[derive(Serialize, Deserialize)]
struct DocumentRepr {
    statements: Vec<Statement>,
}

impl TryFrom<DocumentRepr> for Document {
    type Error = CclError;

    fn try_from(repr: DocumentRepr) -> Result<Self, Self::Error> {
        Document::new(repr.statements)
    }
}

impl From<Document> for DocumentRepr {
    fn from(doc: Document) -> Self {
        DocumentRepr {
            statements: doc.statements,
        }
    }
}

impl Document {
    /// Build a document, validating every statement.
    pub fn new(statements: Vec<Statement>) -> Result<Self, CclError> {
        let mut regexes = RegexCache::default();
        for statement in &statements {
            statement.validate(&mut regexes)?;
        }
        Ok(Self::partition(statements, regexes))
    }

    /// A document with no statements (denies everything when evaluated).
    pub fn empty() -> Self {
        Self::partition(Vec::new(), RegexCache::default())
    }

    fn partition(statements: Vec<Statement>, regexes: RegexCache) -> Self {
        let mut permits = Vec::new();
        let mut denies = Vec::new();
        let mut obligations = Vec::new();
        let mut limits = Vec::new();
        for (i, s) in statements.iter().enumerate() {
            match s.kind() {
                StatementKind::Permit => permits.push(i),
                StatementKind::Deny => denies.push(i),
                StatementKind::Require => obligations.push(i),
                StatementKind::Limit => limits.push(i),
            }
        }
        Self {
            statements,
            permits,
            denies,
            obligations,
            limits,
            regexes,
        }
    }

    /// All statements in source order.
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn permits(&self) -> impl Iterator<Item = &Statement> + '_ {
        self.bucket(&self.permits)
    }

    pub fn denies(&self) -> impl Iterator<Item = &Statement> + '_ {
        self.bucket(&self.denies)
    }

    /// `require` statements.
    pub fn obligations(&self) -> impl Iterator<Item = &Statement> + '_ {
        self.bucket(&self.obligations)
    }

    pub fn limits(&self) -> impl Iterator<Item = &Statement> + '_ {
        self.bucket(&self.limits)
    }

    pub(crate) fn regexes(&self) -> &RegexCache {
        &self.regexes
    }

    fn bucket<'a>(&'a self, indices: &'a [usize]) -> impl Iterator<Item = &'a Statement> + 'a {
        indices.iter().map(move |&i| &self.statements[i])
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            writeln!(f, "{}", statement)?;
        }
        Ok(())
    }
}
