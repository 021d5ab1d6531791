// narrowing.rs — Delegation check: a child document may only restrict.
//
// A child is a legal narrowing of its parent when it:
//
//   - permits nothing the parent denies (unless it repeats that deny itself),
//   - keeps every obligation the parent imposes, at equal or broader scope,
//   - carries every parent rate limit with a child limit over an equal or
//     broader action, and never loosens a limit on an overlapping action.
//
// The check is pairwise and pure. Chains of more than two documents are
// walked one adjacent pair at a time (see `covenant::validate_chain`).

use serde::{Deserialize, Serialize};

use crate::ast::{AccessRule, Document, LimitRule, Statement};
use crate::pattern::{pattern_covers, patterns_intersect, PatternKind};

/// One way in which a child document exceeds its parent's authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrowingViolation {
    /// The offending child statement. `None` when the violation is an
    /// omission (the child lacks a statement it must carry).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_statement: Option<Statement>,
    pub parent_statement: Statement,
    pub reason: String,
}

/// Compare `child` against `parent`. An empty result means the child is a
/// valid delegation (an exact copy always is).
pub fn validate_narrowing(parent: &Document, child: &Document) -> Vec<NarrowingViolation> {
    let mut violations = Vec::new();

    for parent_stmt in parent.denies() {
        let Some(deny) = parent_stmt.as_access_rule() else {
            continue;
        };
        if child.denies().filter_map(Statement::as_access_rule).any(|d| covers(d, deny)) {
            continue;
        }
        for child_stmt in child.permits() {
            let Some(permit) = child_stmt.as_access_rule() else {
                continue;
            };
            if overlaps(permit, deny) {
                violations.push(NarrowingViolation {
                    child_statement: Some(child_stmt.clone()),
                    parent_statement: parent_stmt.clone(),
                    reason: format!(
                        "child permits '{}' on '{}' despite parent denial",
                        permit.action, permit.resource
                    ),
                });
            }
        }
    }

    for parent_stmt in parent.obligations() {
        let Some(require) = parent_stmt.as_access_rule() else {
            continue;
        };
        let child_requires: Vec<(&Statement, &AccessRule)> = child
            .obligations()
            .filter_map(|s| s.as_access_rule().map(|r| (s, r)))
            .collect();
        if child_requires.iter().any(|(_, r)| covers(r, require)) {
            continue;
        }
        let narrower = child_requires.iter().find(|(_, r)| overlaps(r, require));
        let reason = match narrower {
            Some(_) => format!(
                "child narrows obligation '{}' on '{}' required by parent",
                require.action, require.resource
            ),
            None => format!(
                "child omits obligation '{}' on '{}' required by parent",
                require.action, require.resource
            ),
        };
        violations.push(NarrowingViolation {
            child_statement: narrower.map(|(s, _)| (*s).clone()),
            parent_statement: parent_stmt.clone(),
            reason,
        });
    }

    for parent_stmt in parent.limits() {
        let Some(parent_limit) = parent_stmt.as_limit() else {
            continue;
        };
        let child_limits: Vec<(&Statement, &LimitRule)> = child
            .limits()
            .filter_map(|s| s.as_limit().map(|l| (s, l)))
            .collect();
        let carried = child_limits.iter().any(|(_, l)| {
            pattern_covers(PatternKind::Action, &l.action, &parent_limit.action)
        });
        if !carried {
            let narrower = child_limits.iter().find(|(_, l)| {
                patterns_intersect(PatternKind::Action, &l.action, &parent_limit.action)
            });
            let reason = match narrower {
                Some(_) => format!(
                    "child narrows limit on '{}' imposed by parent",
                    parent_limit.action
                ),
                None => format!(
                    "child omits limit on '{}' imposed by parent",
                    parent_limit.action
                ),
            };
            violations.push(NarrowingViolation {
                child_statement: narrower.map(|(s, _)| (*s).clone()),
                parent_statement: parent_stmt.clone(),
                reason,
            });
        }
        for (child_stmt, child_limit) in child_limits {
            if patterns_intersect(PatternKind::Action, &child_limit.action, &parent_limit.action)
                && looser(child_limit, parent_limit)
            {
                violations.push(NarrowingViolation {
                    child_statement: Some(child_stmt.clone()),
                    parent_statement: parent_stmt.clone(),
                    reason: format!(
                        "child limit on '{}' allows {} per {} seconds, looser than parent's {} per {} seconds",
                        child_limit.action,
                        child_limit.count,
                        child_limit.period_seconds,
                        parent_limit.count,
                        parent_limit.period_seconds
                    ),
                });
            }
        }
    }

    if !violations.is_empty() {
        tracing::debug!(count = violations.len(), "narrowing violations found");
    }
    violations
}

/// Both patterns of `a` intersect those of `b`.
fn overlaps(a: &AccessRule, b: &AccessRule) -> bool {
    patterns_intersect(PatternKind::Action, &a.action, &b.action)
        && patterns_intersect(PatternKind::Resource, &a.resource, &b.resource)
}

/// `broad` applies wherever `narrow` does: its patterns contain `narrow`'s and
/// its condition is absent or identical.
fn covers(broad: &AccessRule, narrow: &AccessRule) -> bool {
    pattern_covers(PatternKind::Action, &broad.action, &narrow.action)
        && pattern_covers(PatternKind::Resource, &broad.resource, &narrow.resource)
        && (broad.condition.is_none() || broad.condition == narrow.condition)
}

/// `child` allows a higher rate than `parent` (compared without division).
fn looser(child: &LimitRule, parent: &LimitRule) -> bool {
    u128::from(child.count) * u128::from(parent.period_seconds)
        > u128::from(parent.count) * u128::from(child.period_seconds)
}
