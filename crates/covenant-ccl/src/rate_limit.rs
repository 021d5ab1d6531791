// rate_limit.rs — Caller-side helper for `limit` statements.
//
// The engine keeps no counters. Callers track how many times an action ran
// since `period_start` and ask here whether one more call is allowed.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ast::{Document, LimitRule};
use crate::pattern::{pattern_matches, Specificity};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub exceeded: bool,
    /// Calls left in the current window; `None` when no limit applies.
    pub remaining: Option<u64>,
    /// The governing limit, if any.
    pub limit: Option<LimitRule>,
}

impl RateLimitStatus {
    fn unlimited() -> Self {
        Self {
            exceeded: false,
            remaining: None,
            limit: None,
        }
    }
}

/// The `limit` that applies to `action`, with its statement index.
///
/// The most specific matching limit governs. Among equally specific limits
/// the tightest rate wins, then the earliest statement.
pub(crate) fn governing_limit<'a>(
    document: &'a Document,
    action: &str,
) -> Option<(usize, &'a LimitRule)> {
    let mut best: Option<(Specificity, usize, &LimitRule)> = None;
    for (index, statement) in document.statements().iter().enumerate() {
        let Some(limit) = statement.as_limit() else {
            continue;
        };
        if !pattern_matches(&limit.action, action) {
            continue;
        }
        let spec = Specificity::of(&limit.action, "**");
        let better = match &best {
            None => true,
            Some((b, _, current)) => match spec.cmp(b) {
                Ordering::Greater => true,
                Ordering::Equal => tighter(limit, current),
                Ordering::Less => false,
            },
        };
        if better {
            best = Some((spec, index, limit));
        }
    }
    best.map(|(_, index, limit)| (index, limit))
}

/// `a` allows strictly fewer calls per second than `b`.
fn tighter(a: &LimitRule, b: &LimitRule) -> bool {
    u128::from(a.count) * u128::from(b.period_seconds)
        < u128::from(b.count) * u128::from(a.period_seconds)
}

/// Check `action` against the governing `limit` in `document`.
///
/// Once `now` is a full period past `period_start` the window has rolled
/// over and `current_count` is treated as zero.
pub fn check_rate_limit(
    document: &Document,
    action: &str,
    current_count: u64,
    period_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> RateLimitStatus {
    let Some((_, limit)) = governing_limit(document, action) else {
        return RateLimitStatus::unlimited();
    };

    let elapsed = now.signed_duration_since(period_start).num_seconds();
    let used = if elapsed >= 0 && elapsed as u64 >= limit.period_seconds {
        tracing::trace!(action = %action, elapsed, "rate-limit window rolled over");
        0
    } else {
        current_count
    };

    let status = RateLimitStatus {
        exceeded: used >= limit.count,
        remaining: Some(limit.count.saturating_sub(used)),
        limit: Some(limit.clone()),
    };
    if status.exceeded {
        tracing::debug!(
            action = %action,
            count = limit.count,
            period_seconds = limit.period_seconds,
            used,
            "rate limit exceeded"
        );
    }
    status
}
