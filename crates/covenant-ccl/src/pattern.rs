// pattern.rs — Hierarchical identifier matching for actions and resources.
//
// Actions are dot-segmented (`file.read`), resources are slash-segmented
// (`/data/reports`). In both:
//
//   - a literal segment matches itself (case-sensitive)
//   - `*` matches exactly one segment
//   - `**` matches zero or more segments, in any position
//
// Resource segments may also embed `*` (`*.rs`), matched against a single
// segment with the `glob` crate; they never cross `/`. `*` is the only
// metacharacter: `?`, `[` and `]` in a pattern are plain text.
//
// Every function here is total: malformed patterns simply fail to match.
// Matching, intersection and containment are dynamic programs over segment
// indices, so cost is bounded by |pattern| x |candidate| with no recursion.

use std::cmp::Ordering;

use glob::Pattern as GlobPattern;

use crate::token::TokenKind;

/// Which kind of identifier a pattern describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Dot-separated action identifiers.
    Action,
    /// Slash-separated resource paths; leading/trailing `/` are ignored.
    Resource,
}

impl PatternKind {
    fn split(self, s: &str) -> Vec<&str> {
        let s = match self {
            PatternKind::Action => s,
            PatternKind::Resource => s.trim_matches('/'),
        };
        if s.is_empty() {
            return Vec::new();
        }
        let sep = match self {
            PatternKind::Action => '.',
            PatternKind::Resource => '/',
        };
        s.split(sep).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Glob(&'a str),
    Any,
    AnyDepth,
}

impl<'a> Segment<'a> {
    fn classify(s: &'a str) -> Self {
        match s {
            "**" => Segment::AnyDepth,
            "*" => Segment::Any,
            _ if s.contains('*') => Segment::Glob(s),
            _ => Segment::Literal(s),
        }
    }

    fn rank(self) -> u8 {
        match self {
            Segment::Literal(_) => 3,
            Segment::Glob(_) => 2,
            Segment::Any => 1,
            Segment::AnyDepth => 0,
        }
    }

    fn is_wildcard(self) -> bool {
        !matches!(self, Segment::Literal(_))
    }

    /// Does this single-segment pattern match a concrete segment?
    fn matches(self, candidate: &str) -> bool {
        match self {
            Segment::Literal(lit) => lit == candidate,
            Segment::Glob(g) => glob_segment_matches(g, candidate),
            Segment::Any | Segment::AnyDepth => true,
        }
    }
}

/// Glob-match one segment. Everything but `*` is escaped first, so
/// `/files/a[1]*` only matches names that start with `a[1]`.
fn glob_segment_matches(pattern: &str, candidate: &str) -> bool {
    if pattern == candidate {
        return true;
    }
    let escaped = pattern
        .split('*')
        .map(GlobPattern::escape)
        .collect::<Vec<_>>()
        .join("*");
    match GlobPattern::new(&escaped) {
        Ok(p) => p.matches(candidate),
        Err(_) => false,
    }
}

fn segments(kind: PatternKind, s: &str) -> Vec<Segment<'_>> {
    kind.split(s).into_iter().map(Segment::classify).collect()
}

/// Match a dot-segmented action pattern against an action identifier.
///
/// `pattern_matches("file.*", "file.read")` is true;
/// `pattern_matches("file.*", "file.read.extra")` is false;
/// `pattern_matches("**", "anything.at.all")` is true.
pub fn pattern_matches(pattern: &str, candidate: &str) -> bool {
    matches_kind(PatternKind::Action, pattern, candidate)
}

/// Match a slash-segmented resource pattern against a resource path.
pub fn resource_matches(pattern: &str, candidate: &str) -> bool {
    matches_kind(PatternKind::Resource, pattern, candidate)
}

/// Match a pattern of the given kind against a concrete identifier.
pub fn matches_kind(kind: PatternKind, pattern: &str, candidate: &str) -> bool {
    let p = segments(kind, pattern);
    let c = kind.split(candidate);
    let (n, m) = (p.len(), c.len());

    // next[j]: does p[i+1..] match c[j..]; cur[j]: does p[i..] match c[j..]
    let mut next = vec![false; m + 1];
    next[m] = true;
    for i in (0..n).rev() {
        let mut cur = vec![false; m + 1];
        for j in (0..=m).rev() {
            cur[j] = match p[i] {
                Segment::AnyDepth => next[j] || (j < m && cur[j + 1]),
                seg => j < m && seg.matches(c[j]) && next[j + 1],
            };
        }
        next = cur;
    }
    next[0]
}

/// Two single-segment patterns can match a common segment.
fn segments_intersect(a: Segment<'_>, b: Segment<'_>) -> bool {
    match (a, b) {
        (Segment::Any | Segment::AnyDepth, _) | (_, Segment::Any | Segment::AnyDepth) => true,
        (Segment::Literal(x), Segment::Literal(y)) => x == y,
        (Segment::Glob(g), Segment::Literal(l)) | (Segment::Literal(l), Segment::Glob(g)) => {
            glob_segment_matches(g, l)
        }
        // Unknown in general; assume overlap.
        (Segment::Glob(_), Segment::Glob(_)) => true,
    }
}

/// Every segment matched by `narrow` is matched by `broad`.
fn segment_covers(broad: Segment<'_>, narrow: Segment<'_>) -> bool {
    match (broad, narrow) {
        (Segment::Any, Segment::AnyDepth) => false,
        (Segment::Any, _) => true,
        (Segment::Literal(x), Segment::Literal(y)) => x == y,
        (Segment::Glob(g), Segment::Literal(l)) => glob_segment_matches(g, l),
        (Segment::Glob(g), Segment::Glob(h)) => g == h,
        _ => false,
    }
}

/// Is there at least one identifier matched by both patterns?
pub fn patterns_intersect(kind: PatternKind, a: &str, b: &str) -> bool {
    let p = segments(kind, a);
    let q = segments(kind, b);
    let (n, m) = (p.len(), q.len());

    // table[i][j]: p[i..] and q[j..] share a candidate
    let mut table = vec![vec![false; m + 1]; n + 1];
    for i in (0..=n).rev() {
        for j in (0..=m).rev() {
            table[i][j] = if i == n && j == m {
                true
            } else if i < n && p[i] == Segment::AnyDepth {
                table[i + 1][j] || (j < m && table[i][j + 1])
            } else if j < m && q[j] == Segment::AnyDepth {
                table[i][j + 1] || (i < n && table[i + 1][j])
            } else if i == n || j == m {
                false
            } else {
                segments_intersect(p[i], q[j]) && table[i + 1][j + 1]
            };
        }
    }
    table[0][0]
}

/// Does `broad` match every identifier that `narrow` matches?
///
/// Answers conservatively: `false` when containment cannot be shown.
pub fn pattern_covers(kind: PatternKind, broad: &str, narrow: &str) -> bool {
    let p = segments(kind, broad);
    let q = segments(kind, narrow);
    let (n, m) = (p.len(), q.len());

    let mut table = vec![vec![false; m + 1]; n + 1];
    for i in (0..=n).rev() {
        for j in (0..=m).rev() {
            table[i][j] = if i == n {
                j == m
            } else if p[i] == Segment::AnyDepth {
                table[i + 1][j] || (j < m && table[i][j + 1])
            } else if j == m || q[j] == Segment::AnyDepth {
                false
            } else {
                segment_covers(p[i], q[j]) && table[i + 1][j + 1]
            };
        }
    }
    table[0][0]
}

/// Check that an action pattern is well formed: non-empty dot-separated
/// segments, each `*`, `**` or a word of ASCII letters, digits, `_` and `-`.
/// Only the first segment is held to the identifier rules (a letter or `_`
/// first, not a keyword), since later ones may be numeric (`api.v1.2`).
pub fn validate_action_pattern(pattern: &str) -> Result<(), String> {
    if pattern.is_empty() {
        return Err("empty action pattern".to_string());
    }
    for (i, seg) in pattern.split('.').enumerate() {
        if seg.is_empty() {
            return Err(format!("empty segment in action pattern '{}'", pattern));
        }
        if seg == "*" || seg == "**" {
            continue;
        }
        if seg.contains('*') {
            return Err(format!(
                "wildcard must be a whole segment in action pattern '{}'",
                pattern
            ));
        }
        if !seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(format!("invalid segment '{}' in action pattern '{}'", seg, pattern));
        }
        let first = seg.chars().next().unwrap_or('-');
        let leads = if i == 0 {
            first.is_ascii_alphabetic() || first == '_'
        } else {
            first.is_ascii_alphanumeric() || first == '_'
        };
        if !leads {
            return Err(format!("invalid segment '{}' in action pattern '{}'", seg, pattern));
        }
        if i == 0 && TokenKind::keyword(seg).is_some() {
            return Err(format!(
                "action pattern '{}' starts with the keyword '{}'",
                pattern, seg
            ));
        }
    }
    Ok(())
}

/// How specific a statement's patterns are. Greater = more specific.
///
/// Ordered by: fewer wildcard segments, then segment ranks compared left to
/// right (literal > glob > `*` > `**`; action before resource), then more
/// segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specificity {
    wildcards: usize,
    action_ranks: Vec<u8>,
    resource_ranks: Vec<u8>,
}

impl Specificity {
    pub fn of(action: &str, resource: &str) -> Self {
        let action_segs = segments(PatternKind::Action, action);
        let resource_segs = segments(PatternKind::Resource, resource);
        let wildcards = action_segs
            .iter()
            .chain(resource_segs.iter())
            .filter(|s| s.is_wildcard())
            .count();
        Self {
            wildcards,
            action_ranks: action_segs.iter().map(|s| s.rank()).collect(),
            resource_ranks: resource_segs.iter().map(|s| s.rank()).collect(),
        }
    }
}

impl Ord for Specificity {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .wildcards
            .cmp(&self.wildcards)
            .then_with(|| self.action_ranks.cmp(&other.action_ranks))
            .then_with(|| self.resource_ranks.cmp(&other.resource_ranks))
    }
}

impl PartialOrd for Specificity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Action matching ──────────────────────────────────────────

    #[test]
    fn single_wildcard_matches_exactly_one_segment() {
        assert!(pattern_matches("file.*", "file.read"));
        assert!(!pattern_matches("file.*", "file.read.extra"));
        assert!(!pattern_matches("file.*", "file"));
        assert!(pattern_matches("*.read", "file.read"));
    }

    #[test]
    fn double_wildcard_matches_everything() {
        assert!(pattern_matches("**", "anything.at.all"));
        assert!(pattern_matches("**", "x"));
        assert!(pattern_matches("**", ""));
    }

    #[test]
    fn trailing_double_wildcard_is_prefix_match() {
        assert!(pattern_matches("file.**", "file"));
        assert!(pattern_matches("file.**", "file.read"));
        assert!(pattern_matches("file.**", "file.read.deep"));
        assert!(!pattern_matches("file.**", "net.read"));
        assert!(pattern_matches("*.**", "net.read.deep"));
    }

    #[test]
    fn inner_double_wildcard_spans_segments() {
        assert!(pattern_matches("api.**.get", "api.get"));
        assert!(pattern_matches("api.**.get", "api.v1.users.get"));
        assert!(!pattern_matches("api.**.get", "api.v1.users.post"));
    }

    #[test]
    fn literal_matching_is_case_sensitive() {
        assert!(pattern_matches("file.read", "file.read"));
        assert!(!pattern_matches("file.read", "File.read"));
        assert!(!pattern_matches("file.read", "file.write"));
    }

    #[test]
    fn segment_count_must_match_without_double_wildcard() {
        assert!(!pattern_matches("a.b", "a.b.c"));
        assert!(!pattern_matches("a.b.c", "a.b"));
        assert!(!pattern_matches("a", ""));
    }

    #[test]
    fn malformed_patterns_fail_without_panicking() {
        assert!(!pattern_matches("", "x"));
        assert!(!pattern_matches("a..b", "a.b"));
        assert!(pattern_matches("a..b", "a..b"));
    }

    // ── Resource matching ────────────────────────────────────────

    #[test]
    fn resource_paths_ignore_outer_slashes() {
        assert!(resource_matches("/data", "/data"));
        assert!(resource_matches("/data", "data/"));
        assert!(resource_matches("*", "/data"));
        assert!(!resource_matches("*", "/data/file"));
    }

    #[test]
    fn resource_double_wildcard() {
        assert!(resource_matches("/admin/**", "/admin/secrets"));
        assert!(resource_matches("/admin/**", "/admin"));
        assert!(resource_matches("/admin/**", "/admin/a/b/c"));
        assert!(!resource_matches("/admin/**", "/public/a"));
        assert!(resource_matches("**", "/anything/at/all"));
    }

    #[test]
    fn resource_glob_segment_stays_in_segment() {
        assert!(resource_matches("/src/*.rs", "/src/main.rs"));
        assert!(!resource_matches("/src/*.rs", "/src/sub/main.rs"));
        assert!(!resource_matches("/src/*.rs", "/src/main.py"));
    }

    #[test]
    fn brackets_and_question_marks_are_literal() {
        assert!(resource_matches("/files/a[1]", "/files/a[1]"));
        assert!(!resource_matches("/files/a[1]", "/files/a1"));
        assert!(resource_matches("/search?q", "/search?q"));
        assert!(!resource_matches("/files/a?", "/files/ab"));
        assert!(resource_matches("/q/[a", "/q/[a"));
        assert!(!resource_matches("/q/[a", "/q/a"));
    }

    #[test]
    fn star_glob_escapes_other_metacharacters() {
        assert!(resource_matches("/files/a[1]*", "/files/a[1].txt"));
        assert!(!resource_matches("/files/a[1]*", "/files/a1.txt"));
        assert!(resource_matches("/files/*?", "/files/x?"));
        assert!(!resource_matches("/files/*?", "/files/xy"));
    }

    #[test]
    fn literal_bracket_paths_intersect_and_cover_themselves() {
        let r = PatternKind::Resource;
        assert!(patterns_intersect(r, "/files/a[1]", "/files/a[1]"));
        assert!(!patterns_intersect(r, "/files/a[1]", "/files/a1"));
        assert!(pattern_covers(r, "/files/a[1]", "/files/a[1]"));
        assert!(pattern_covers(r, "/files/a*", "/files/a[1]"));
    }

    // ── Intersection and containment ─────────────────────────────

    #[test]
    fn intersection_of_patterns() {
        let a = PatternKind::Action;
        assert!(patterns_intersect(a, "write", "write"));
        assert!(!patterns_intersect(a, "write", "read"));
        assert!(patterns_intersect(a, "*", "write"));
        assert!(patterns_intersect(a, "file.*", "*.read"));
        assert!(!patterns_intersect(a, "file.*", "net.*"));
        assert!(patterns_intersect(a, "**.a.x", "b.**"));
        assert!(!patterns_intersect(a, "**.a", "**.b"));

        let r = PatternKind::Resource;
        assert!(patterns_intersect(r, "/secrets", "/secrets"));
        assert!(patterns_intersect(r, "**", "/admin/**"));
        assert!(patterns_intersect(r, "/admin/*", "/admin/**"));
        assert!(!patterns_intersect(r, "/public/**", "/admin/**"));
        assert!(patterns_intersect(r, "/src/*.rs", "/src/main.rs"));
    }

    #[test]
    fn containment_of_patterns() {
        let a = PatternKind::Action;
        assert!(pattern_covers(a, "**", "file.read"));
        assert!(pattern_covers(a, "file.*", "file.read"));
        assert!(!pattern_covers(a, "file.read", "file.*"));
        assert!(pattern_covers(a, "file.**", "file.*"));
        assert!(!pattern_covers(a, "file.*", "file.**"));
        assert!(pattern_covers(a, "audit.log", "audit.log"));

        let r = PatternKind::Resource;
        assert!(pattern_covers(r, "/admin/**", "/admin/secrets/*"));
        assert!(!pattern_covers(r, "/admin/secrets/*", "/admin/**"));
        assert!(pattern_covers(r, "/src/*.rs", "/src/lib.rs"));
        assert!(pattern_covers(r, "**", "**"));
    }

    // ── Specificity ──────────────────────────────────────────────

    #[test]
    fn literal_beats_wildcards() {
        let literal = Specificity::of("file.read", "/data");
        let star = Specificity::of("file.*", "/data");
        let globstar = Specificity::of("file.read", "**");
        assert!(literal > star);
        assert!(literal > globstar);
    }

    #[test]
    fn star_beats_double_star_position_by_position() {
        let star = Specificity::of("*", "/data");
        let globstar = Specificity::of("**", "/data");
        assert!(star > globstar);
        let left = Specificity::of("file.*", "**");
        let right = Specificity::of("*.read", "**");
        assert!(left > right);
    }

    #[test]
    fn validate_action_patterns() {
        assert!(validate_action_pattern("file.read").is_ok());
        assert!(validate_action_pattern("file.*").is_ok());
        assert!(validate_action_pattern("**").is_ok());
        assert!(validate_action_pattern("").is_err());
        assert!(validate_action_pattern("file.").is_err());
        assert!(validate_action_pattern("fi*le").is_err());
    }

    #[test]
    fn action_segments_must_be_words() {
        assert!(validate_action_pattern("api.v1.2").is_ok());
        assert!(validate_action_pattern("net.http-get").is_ok());
        assert!(validate_action_pattern("**.read").is_ok());
        assert!(validate_action_pattern("data.limit").is_ok());

        for bad in ["file read", "1st.step", "-x", "api.-1", "a/b", "limit.x", "a.b'c"] {
            assert!(validate_action_pattern(bad).is_err(), "{} accepted", bad);
        }
    }
}
