// evaluator.rs — Runtime decision algorithm.
//
// `evaluate()` is the single chokepoint: every candidate action flows through
// it and it always returns a Decision (never an error). It checks:
//
// 1. Which statements match? (action + resource pattern + condition)
// 2. Rank the matches: deny > unmet require > exceeded limit > permit,
//    then most specific pattern, then earliest in source.
// 3. The head of the ranked list decides. Only a permit at the head allows.
// 4. Nothing matched → deny ("no matching rule"). Fail closed.
//
// The evaluator is stateless. Rate-limit usage and fulfilled obligations
// are supplied by the caller through reserved context keys.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::ast::{Condition, Document, Operator, RegexCache, Severity, Statement, Value};
use crate::pattern::{pattern_matches, resource_matches, Specificity};
use crate::rate_limit::governing_limit;

/// Field→value map that `when` clauses are evaluated against.
///
/// Values are JSON so nested objects resolve dotted paths:
/// `{"user": {"role": "admin"}}` satisfies `user.role = 'admin'`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, JsonValue>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Resolve a dotted field path. An exact top-level key wins over nested
    /// traversal, so `{"user.role": ..}` and `{"user": {"role": ..}}` both work.
    pub fn resolve(&self, path: &str) -> Option<&JsonValue> {
        if let Some(v) = self.0.get(path) {
            return Some(v);
        }
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }
}

impl From<Map<String, JsonValue>> for Context {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

/// Non-object JSON values yield an empty context.
impl From<JsonValue> for Context {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// Evaluator settings. Usually loaded as part of [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorOptions {
    /// Context key holding how many times the action was already performed
    /// in the current rate-limit window.
    #[serde(default = "default_limit_count_key")]
    pub limit_count_key: String,

    /// Context key holding the list of obligation actions already fulfilled.
    #[serde(default = "default_obligations_key")]
    pub obligations_key: String,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            limit_count_key: default_limit_count_key(),
            obligations_key: default_obligations_key(),
        }
    }
}

fn default_limit_count_key() -> String {
    "_limit_count".to_string()
}

fn default_obligations_key() -> String {
    "_obligations_met".to_string()
}

/// The result of evaluating one action against one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub permitted: bool,
    /// The deciding statement (head of `all_matches`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_statement: Option<Statement>,
    /// Every matching statement, highest precedence first.
    pub all_matches: Vec<Statement>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// How a matching statement bears on the outcome. Lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchRank {
    Deny,
    UnmetObligation,
    LimitExceeded,
    Permit,
    MetObligation,
    WithinLimit,
}

struct Match<'a> {
    rank: MatchRank,
    specificity: Specificity,
    index: usize,
    statement: &'a Statement,
    /// Usage reported for a matched limit.
    used: Option<f64>,
}

/// One `evaluate` call's inputs, plus what is derived once per call.
struct Request<'r> {
    action: &'r str,
    resource: &'r str,
    context: &'r Context,
    /// Index of the one limit statement that applies to `action`.
    governing_limit: Option<usize>,
    regexes: &'r RegexCache,
}

/// Stateless evaluator; cheap to construct and safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    options: EvaluatorOptions,
}

impl Evaluator {
    pub fn new(options: EvaluatorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EvaluatorOptions {
        &self.options
    }

    /// Decide whether `action` on `resource` is permitted under `document`.
    pub fn evaluate(
        &self,
        document: &Document,
        action: &str,
        resource: &str,
        context: &Context,
    ) -> Decision {
        let request = Request {
            action,
            resource,
            context,
            governing_limit: governing_limit(document, action).map(|(index, _)| index),
            regexes: document.regexes(),
        };
        let mut matches: Vec<Match<'_>> = document
            .statements()
            .iter()
            .enumerate()
            .filter_map(|(index, statement)| self.classify(index, statement, &request))
            .collect();

        matches.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then_with(|| b.specificity.cmp(&a.specificity))
                .then_with(|| a.index.cmp(&b.index))
        });

        let decision = match matches.first() {
            None => Decision {
                permitted: false,
                matched_statement: None,
                all_matches: Vec::new(),
                reason: "no matching rule".to_string(),
                severity: None,
            },
            Some(head) => {
                let permitted = head.rank == MatchRank::Permit;
                Decision {
                    permitted,
                    matched_statement: Some(head.statement.clone()),
                    all_matches: matches.iter().map(|m| m.statement.clone()).collect(),
                    reason: reason_for(head),
                    severity: Some(head.statement.severity()),
                }
            }
        };

        tracing::debug!(
            action = %action,
            resource = %resource,
            permitted = decision.permitted,
            matches = decision.all_matches.len(),
            reason = %decision.reason,
            "evaluated action"
        );
        decision
    }

    fn classify<'a>(
        &self,
        index: usize,
        statement: &'a Statement,
        request: &Request<'_>,
    ) -> Option<Match<'a>> {
        let context = request.context;
        if !pattern_matches(statement.action(), request.action) {
            return None;
        }

        let mut used = None;
        let rank = match statement {
            // Only the governing limit takes part; broader ones are shadowed.
            Statement::Limit(_) if request.governing_limit != Some(index) => return None,
            Statement::Limit(limit) => {
                used = context
                    .resolve(&self.options.limit_count_key)
                    .and_then(JsonValue::as_f64);
                match used {
                    Some(n) if n >= limit.count as f64 => MatchRank::LimitExceeded,
                    _ => MatchRank::WithinLimit,
                }
            }
            Statement::Permit(rule) | Statement::Deny(rule) | Statement::Require(rule) => {
                if !resource_matches(&rule.resource, request.resource) {
                    return None;
                }
                if let Some(cond) = &rule.condition {
                    if !condition_holds(cond, context, request.regexes) {
                        tracing::trace!(line = rule.line, "condition false; statement skipped");
                        return None;
                    }
                }
                match statement {
                    Statement::Deny(_) => MatchRank::Deny,
                    Statement::Require(_) if self.obligation_met(&rule.action, context) => {
                        MatchRank::MetObligation
                    }
                    Statement::Require(_) => MatchRank::UnmetObligation,
                    _ => MatchRank::Permit,
                }
            }
        };

        tracing::trace!(line = statement.line(), ?rank, "statement matched");
        Some(Match {
            rank,
            specificity: Specificity::of(statement.action(), statement.resource()),
            index,
            statement,
            used,
        })
    }

    fn obligation_met(&self, obligation: &str, context: &Context) -> bool {
        context
            .resolve(&self.options.obligations_key)
            .and_then(JsonValue::as_array)
            .is_some_and(|done| {
                done.iter()
                    .filter_map(JsonValue::as_str)
                    .any(|performed| pattern_matches(obligation, performed))
            })
    }
}

/// Evaluate with default options.
pub fn evaluate(document: &Document, action: &str, resource: &str, context: &Context) -> Decision {
    Evaluator::default().evaluate(document, action, resource, context)
}

fn reason_for(head: &Match<'_>) -> String {
    let statement = head.statement;
    let severity = statement.severity();
    match head.rank {
        MatchRank::Deny => format!(
            "denied by rule on '{}' (severity {})",
            statement.resource(),
            severity
        ),
        MatchRank::UnmetObligation => format!(
            "obligation '{}' on '{}' not met (severity {})",
            statement.action(),
            statement.resource(),
            severity
        ),
        MatchRank::LimitExceeded => match statement {
            Statement::Limit(limit) => format!(
                "rate limit exceeded for '{}': {} of {} per {} seconds used (severity {})",
                limit.action,
                head.used.unwrap_or_default(),
                limit.count,
                limit.period_seconds,
                severity
            ),
            _ => format!("rate limit exceeded (severity {})", severity),
        },
        MatchRank::Permit => format!("permitted by rule on '{}'", statement.resource()),
        MatchRank::MetObligation | MatchRank::WithinLimit => {
            "no matching permit rule".to_string()
        }
    }
}

/// Evaluate a condition tree. Missing fields and type mismatches make the
/// comparison false; they never error.
pub fn evaluate_condition(condition: &Condition, context: &Context) -> bool {
    condition_holds(condition, context, &RegexCache::default())
}

/// [`evaluate_condition`] with the document's compiled `matches` patterns.
fn condition_holds(condition: &Condition, context: &Context, regexes: &RegexCache) -> bool {
    match condition {
        Condition::Comparison {
            field,
            operator,
            value,
        } => compare(context.resolve(field), *operator, value, regexes),
        Condition::And { operands } => operands
            .iter()
            .all(|c| condition_holds(c, context, regexes)),
        Condition::Or { operands } => operands
            .iter()
            .any(|c| condition_holds(c, context, regexes)),
        Condition::Not { operand } => !condition_holds(operand, context, regexes),
    }
}

fn compare(
    actual: Option<&JsonValue>,
    operator: Operator,
    expected: &Value,
    regexes: &RegexCache,
) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match operator {
        Operator::Eq => scalar_eq(actual, expected) == Some(true),
        Operator::Ne => scalar_eq(actual, expected) == Some(false),
        Operator::Lt => numeric_cmp(actual, expected) == Some(Ordering::Less),
        Operator::Gt => numeric_cmp(actual, expected) == Some(Ordering::Greater),
        Operator::Le => matches!(
            numeric_cmp(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Ge => matches!(
            numeric_cmp(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::In => membership(actual, expected) == Some(true),
        Operator::NotIn => membership(actual, expected) == Some(false),
        Operator::Contains => containment(actual, expected) == Some(true),
        Operator::NotContains => containment(actual, expected) == Some(false),
        Operator::StartsWith => match (actual, expected) {
            (JsonValue::String(a), Value::String(e)) => a.starts_with(e.as_str()),
            _ => false,
        },
        Operator::EndsWith => match (actual, expected) {
            (JsonValue::String(a), Value::String(e)) => a.ends_with(e.as_str()),
            _ => false,
        },
        Operator::Matches => match (actual, expected) {
            (JsonValue::String(a), Value::String(re)) => regexes.is_match(re, a),
            _ => false,
        },
    }
}

/// `Some(equal?)` for two scalars of the same type, `None` otherwise.
fn scalar_eq(actual: &JsonValue, expected: &Value) -> Option<bool> {
    match (actual, expected) {
        (JsonValue::String(a), Value::String(e)) => Some(a == e),
        (JsonValue::Number(a), Value::Number(e)) => a.as_f64().map(|a| a == *e),
        (JsonValue::Bool(a), Value::Bool(e)) => Some(a == e),
        _ => None,
    }
}

fn numeric_cmp(actual: &JsonValue, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (JsonValue::Number(a), Value::Number(e)) => a.as_f64()?.partial_cmp(e),
        _ => None,
    }
}

/// `Some(found?)` when `actual` is a scalar and `expected` an array.
fn membership(actual: &JsonValue, expected: &Value) -> Option<bool> {
    let Value::Array(items) = expected else {
        return None;
    };
    if !is_scalar(actual) {
        return None;
    }
    Some(items.iter().any(|item| scalar_eq(actual, item) == Some(true)))
}

/// `Some(found?)` for array-contains-scalar or string-contains-substring.
fn containment(actual: &JsonValue, expected: &Value) -> Option<bool> {
    match (actual, expected) {
        (JsonValue::Array(items), e) => {
            Some(items.iter().any(|item| scalar_eq(item, e) == Some(true)))
        }
        (JsonValue::String(a), Value::String(e)) => Some(a.contains(e.as_str())),
        _ => None,
    }
}

fn is_scalar(v: &JsonValue) -> bool {
    matches!(v, JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use serde_json::json;

    fn ctx(value: JsonValue) -> Context {
        Context::from(value)
    }

    #[test]
    fn empty_document_denies() {
        let decision = evaluate(&Document::empty(), "file.read", "/x", &Context::new());
        assert!(!decision.permitted);
        assert_eq!(decision.reason, "no matching rule");
        assert!(decision.matched_statement.is_none());
        assert!(decision.all_matches.is_empty());
        assert_eq!(decision.severity, None);
    }

    #[test]
    fn permit_allows_matching_action() {
        let doc = parse("permit file.read on '/data/**'").unwrap();
        let decision = evaluate(&doc, "file.read", "/data/report.csv", &Context::new());
        assert!(decision.permitted);
        assert_eq!(decision.reason, "permitted by rule on '/data/**'");
        assert_eq!(decision.severity, Some(Severity::High));

        let other = evaluate(&doc, "file.write", "/data/report.csv", &Context::new());
        assert!(!other.permitted);
    }

    #[test]
    fn deny_beats_permit() {
        let doc = parse("permit * on '**'\ndeny * on '/admin/**' severity critical").unwrap();
        let decision = evaluate(&doc, "x", "/admin/secrets", &Context::new());
        assert!(!decision.permitted);
        assert_eq!(decision.reason, "denied by rule on '/admin/**' (severity critical)");
        assert_eq!(decision.severity, Some(Severity::Critical));
        assert_eq!(decision.all_matches.len(), 2);
        assert_eq!(decision.all_matches[0].kind(), crate::StatementKind::Deny);

        assert!(evaluate(&doc, "x", "/public/page", &Context::new()).permitted);
    }

    #[test]
    fn bracketed_resource_deny_is_not_bypassed() {
        let doc = parse("permit read on '**'\ndeny read on '/files/a[1]'\ndeny read on '/tmp/x?'").unwrap();
        assert!(!evaluate(&doc, "read", "/files/a[1]", &Context::new()).permitted);
        assert!(!evaluate(&doc, "read", "/tmp/x?", &Context::new()).permitted);
        assert!(evaluate(&doc, "read", "/files/a1", &Context::new()).permitted);
        assert!(evaluate(&doc, "read", "/tmp/xy", &Context::new()).permitted);
    }

    #[test]
    fn most_specific_permit_is_selected() {
        let doc = parse("permit read on '**' severity low\npermit read on '/data' severity critical").unwrap();
        let decision = evaluate(&doc, "read", "/data", &Context::new());
        assert!(decision.permitted);
        assert_eq!(decision.matched_statement.unwrap().line(), 2);
        assert_eq!(decision.severity, Some(Severity::Critical));
    }

    #[test]
    fn source_order_breaks_ties() {
        let doc = parse("permit read on '/a' severity low\npermit read on '/a' severity medium").unwrap();
        let decision = evaluate(&doc, "read", "/a", &Context::new());
        assert_eq!(decision.matched_statement.unwrap().line(), 1);
    }

    #[test]
    fn condition_against_nested_context() {
        let doc = parse("permit read on '/data' when user.role = 'admin'").unwrap();
        let admin = ctx(json!({"user": {"role": "admin"}}));
        let guest = ctx(json!({"user": {"role": "guest"}}));
        assert!(evaluate(&doc, "read", "/data", &admin).permitted);
        assert!(!evaluate(&doc, "read", "/data", &guest).permitted);
        assert!(!evaluate(&doc, "read", "/data", &Context::new()).permitted);
    }

    #[test]
    fn flat_dotted_key_resolves() {
        let doc = parse("permit read on '/data' when user.role = 'admin'").unwrap();
        let flat = Context::new().with("user.role", "admin");
        assert!(evaluate(&doc, "read", "/data", &flat).permitted);
    }

    #[test]
    fn missing_field_makes_deny_condition_false() {
        let doc = parse("permit * on **\ndeny * on ** when env != 'dev'").unwrap();
        // env missing: the deny's comparison is false, so the permit decides
        assert!(evaluate(&doc, "x", "/y", &Context::new()).permitted);
        assert!(!evaluate(&doc, "x", "/y", &ctx(json!({"env": "prod"}))).permitted);
        assert!(evaluate(&doc, "x", "/y", &ctx(json!({"env": "dev"}))).permitted);
    }

    #[test]
    fn non_scalar_comparison_is_false() {
        let doc = parse("permit * on ** when tags = 'a'\npermit * on ** when tags != 'a'").unwrap();
        let decision = evaluate(&doc, "x", "/y", &ctx(json!({"tags": ["a"]})));
        assert!(!decision.permitted);
    }

    #[test]
    fn numeric_and_string_operators() {
        let c = ctx(json!({"risk": 0.3, "path": "/home/user/notes.txt", "tags": ["pii", "eu"], "role": "ops"}));
        let cases = [
            ("risk < 0.5", true),
            ("risk >= 0.3", true),
            ("risk > 0.3", false),
            ("risk <= 0.2", false),
            ("path starts_with '/home'", true),
            ("path ends_with '.txt'", true),
            ("path contains 'user'", true),
            ("path matches '^/home/[a-z]+/'", true),
            ("tags contains 'pii'", true),
            ("tags not_contains 'us'", true),
            ("role in ['ops', 'admin']", true),
            ("role not_in ['ops', 'admin']", false),
            ("role = 1", false),
            ("role != 1", false),
        ];
        for (cond, expected) in cases {
            let doc = parse(&format!("permit x on * when {}", cond)).unwrap();
            assert_eq!(
                evaluate(&doc, "x", "/r", &c).permitted,
                expected,
                "condition: {}",
                cond
            );
        }
    }

    #[test]
    fn matches_operator_inside_and_outside_a_document() {
        let doc = parse("permit x on * when path matches '^/home/' or alt matches '^/home/'").unwrap();
        assert!(evaluate(&doc, "x", "/r", &ctx(json!({"alt": "/home/ann"}))).permitted);
        assert!(!evaluate(&doc, "x", "/r", &ctx(json!({"path": "/etc"}))).permitted);

        let cond = doc.statements()[0].condition().unwrap();
        assert!(evaluate_condition(cond, &ctx(json!({"path": "/home/bob"}))));
        let bad = Condition::Comparison {
            field: "path".to_string(),
            operator: Operator::Matches,
            value: Value::String("(".to_string()),
        };
        assert!(!evaluate_condition(&bad, &ctx(json!({"path": "("}))));
    }

    #[test]
    fn boolean_logic() {
        let doc = parse("permit x on * when (a = 1 or b = 1) and not c = 1").unwrap();
        assert!(evaluate(&doc, "x", "/r", &ctx(json!({"a": 1, "c": 0}))).permitted);
        assert!(!evaluate(&doc, "x", "/r", &ctx(json!({"a": 1, "c": 1}))).permitted);
        assert!(!evaluate(&doc, "x", "/r", &ctx(json!({"a": 0, "b": 0}))).permitted);
        // `not` over a missing field is true
        assert!(evaluate(&doc, "x", "/r", &ctx(json!({"b": 1}))).permitted);
    }

    #[test]
    fn unmet_obligation_blocks() {
        let doc = parse("permit deploy on '/prod/**'\nrequire deploy on '/prod/**' severity critical").unwrap();
        let blocked = evaluate(&doc, "deploy", "/prod/api", &Context::new());
        assert!(!blocked.permitted);
        assert!(blocked.reason.contains("obligation 'deploy'"));
        assert_eq!(blocked.severity, Some(Severity::Critical));

        let met = ctx(json!({"_obligations_met": ["deploy"]}));
        let allowed = evaluate(&doc, "deploy", "/prod/api", &met);
        assert!(allowed.permitted);
        assert_eq!(allowed.all_matches.len(), 2);
        assert_eq!(allowed.all_matches[0].kind(), crate::StatementKind::Permit);
    }

    #[test]
    fn met_obligation_alone_does_not_permit() {
        let doc = parse("require audit.log on **").unwrap();
        let met = ctx(json!({"_obligations_met": ["audit.log"]}));
        let decision = evaluate(&doc, "audit.log", "/x", &met);
        assert!(!decision.permitted);
        assert_eq!(decision.reason, "no matching permit rule");
    }

    #[test]
    fn exceeded_limit_blocks() {
        let doc = parse("permit api.call on **\nlimit api.call 3 per 1 minute").unwrap();
        let under = ctx(json!({"_limit_count": 2}));
        let at = ctx(json!({"_limit_count": 3}));
        assert!(evaluate(&doc, "api.call", "/x", &under).permitted);
        assert!(evaluate(&doc, "api.call", "/x", &Context::new()).permitted);

        let decision = evaluate(&doc, "api.call", "/x", &at);
        assert!(!decision.permitted);
        assert!(decision.reason.starts_with("rate limit exceeded for 'api.call'"));
    }

    #[test]
    fn deny_outranks_obligation_and_limit() {
        let doc = parse("limit x 1 per 1 second\nrequire x on **\ndeny x on **").unwrap();
        let decision = evaluate(&doc, "x", "/y", &ctx(json!({"_limit_count": 5})));
        let kinds: Vec<_> = decision.all_matches.iter().map(Statement::kind).collect();
        assert_eq!(
            kinds,
            vec![
                crate::StatementKind::Deny,
                crate::StatementKind::Require,
                crate::StatementKind::Limit
            ]
        );
    }

    #[test]
    fn most_specific_limit_governs() {
        let doc = parse("permit api.* on **\nlimit api.* 5 per 1 hour\nlimit api.call 100 per 1 hour").unwrap();
        let c = ctx(json!({"_limit_count": 50}));

        let call = evaluate(&doc, "api.call", "/svc", &c);
        assert!(call.permitted, "{}", call.reason);
        assert_eq!(call.all_matches.len(), 2);
        assert_eq!(call.all_matches[1].as_limit().map(|l| l.count), Some(100));

        let list = evaluate(&doc, "api.list", "/svc", &c);
        assert!(!list.permitted);
        assert!(list.reason.contains("'api.*'"));

        let now = chrono::Utc::now();
        let status = crate::check_rate_limit(&doc, "api.call", 50, now, now);
        assert_eq!(call.permitted, !status.exceeded);
    }

    #[test]
    fn tightest_of_equally_specific_limits_governs() {
        let doc = parse("permit x on **\nlimit x 100 per 1 hour\nlimit x 20 per 1 hour").unwrap();
        assert!(!evaluate(&doc, "x", "/r", &ctx(json!({"_limit_count": 20}))).permitted);
        assert!(evaluate(&doc, "x", "/r", &ctx(json!({"_limit_count": 19}))).permitted);
    }

    #[test]
    fn custom_context_keys() {
        let evaluator = Evaluator::new(EvaluatorOptions {
            limit_count_key: "usage.count".to_string(),
            obligations_key: "done".to_string(),
        });
        let doc = parse("permit x on **\nlimit x 2 per 1 hour\nrequire x on **").unwrap();
        let c = ctx(json!({"usage": {"count": 1}, "done": ["x"]}));
        assert!(evaluator.evaluate(&doc, "x", "/y", &c).permitted);
        let c = ctx(json!({"usage": {"count": 2}, "done": ["x"]}));
        assert!(!evaluator.evaluate(&doc, "x", "/y", &c).permitted);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let doc = parse("permit * on **\ndeny write on '/etc/**'").unwrap();
        let c = ctx(json!({"user": "a"}));
        let first = evaluate(&doc, "write", "/etc/passwd", &c);
        let second = evaluate(&doc, "write", "/etc/passwd", &c);
        assert_eq!(first, second);
    }

    #[test]
    fn decision_serializes_for_audit() {
        let doc = parse("deny * on ** severity critical").unwrap();
        let decision = evaluate(&doc, "x", "/y", &Context::new());
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["permitted"], false);
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["matched_statement"]["type"], "deny");
        let restored: Decision = serde_json::from_value(json).unwrap();
        assert_eq!(restored, decision);
    }

    #[test]
    fn documents_are_shareable_across_threads() {
        let doc = std::sync::Arc::new(parse("permit read on '/data/**'").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let doc = doc.clone();
                std::thread::spawn(move || {
                    evaluate(&doc, "read", &format!("/data/{}", i), &Context::new()).permitted
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }
}
