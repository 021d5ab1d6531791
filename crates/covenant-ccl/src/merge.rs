// merge.rs — Effective policy of a delegation (parent ∧ child).
//
// Restrictions accumulate: every deny, require and limit from either
// document is kept. Grants intersect: a child permit survives only if some
// parent permit covers it. Within each kind, parent statements come first.

use crate::ast::{Document, Statement};
use crate::error::CclError;
use crate::pattern::{pattern_covers, PatternKind};

/// Combine `parent` and `child` into the document that actually governs the
/// child's holder.
pub fn merge(parent: &Document, child: &Document) -> Result<Document, CclError> {
    let mut statements: Vec<Statement> = Vec::with_capacity(parent.len() + child.len());

    statements.extend(parent.denies().cloned());
    statements.extend(child.denies().cloned());
    statements.extend(parent.obligations().cloned());
    statements.extend(child.obligations().cloned());
    statements.extend(parent.limits().cloned());
    statements.extend(child.limits().cloned());

    statements.extend(parent.permits().cloned());
    for permit in child.permits() {
        if parent.permits().any(|p| permit_covers(p, permit)) {
            statements.push(permit.clone());
        } else {
            tracing::warn!(
                action = %permit.action(),
                resource = %permit.resource(),
                line = permit.line(),
                "dropping child permit not granted by parent"
            );
        }
    }

    Document::new(statements)
}

fn permit_covers(parent: &Statement, child: &Statement) -> bool {
    let (Some(p), Some(c)) = (parent.as_access_rule(), child.as_access_rule()) else {
        return false;
    };
    pattern_covers(PatternKind::Action, &p.action, &c.action)
        && pattern_covers(PatternKind::Resource, &p.resource, &c.resource)
        && (p.condition.is_none() || p.condition == c.condition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{evaluate, Context};
    use crate::parser::parse;
    use crate::StatementKind;

    fn merged(parent: &str, child: &str) -> Document {
        merge(&parse(parent).unwrap(), &parse(child).unwrap()).unwrap()
    }

    #[test]
    fn restrictions_from_both_sides_are_kept() {
        let doc = merged(
            "deny write on '/secrets'\nrequire audit.log on **\nlimit api.call 10 per 1 minute",
            "deny delete on '**'\nlimit api.call 5 per 1 minute",
        );
        assert_eq!(doc.denies().count(), 2);
        assert_eq!(doc.obligations().count(), 1);
        assert_eq!(doc.limits().count(), 2);
    }

    #[test]
    fn only_covered_child_permits_survive() {
        let doc = merged(
            "permit file.* on '/data/**'",
            "permit file.read on '/data/reports'\npermit net.fetch on '**'",
        );
        let permits: Vec<_> = doc.permits().map(|s| s.action().to_string()).collect();
        assert_eq!(permits, vec!["file.*", "file.read"]);
    }

    #[test]
    fn parent_statements_come_first() {
        let doc = merged("deny a on '/x'", "deny b on '/y'");
        let actions: Vec<_> = doc.denies().map(Statement::action).collect();
        assert_eq!(actions, vec!["a", "b"]);
    }

    #[test]
    fn merged_document_enforces_parent_deny() {
        let doc = merged("permit * on '**'\ndeny write on '/secrets'", "permit write on '/secrets'");
        let decision = evaluate(&doc, "write", "/secrets", &Context::new());
        assert!(!decision.permitted);
        assert_eq!(
            decision.matched_statement.map(|s| s.kind()),
            Some(StatementKind::Deny)
        );
    }

    #[test]
    fn conditional_parent_permit_does_not_cover_unconditional_child() {
        let doc = merged(
            "permit read on '**' when role = 'admin'",
            "permit read on '/data'",
        );
        assert_eq!(doc.permits().count(), 1);
    }

    #[test]
    fn merging_with_empty_child_keeps_parent() {
        let parent = parse("permit * on '**'\ndeny x on '/y'").unwrap();
        let doc = merge(&parent, &Document::empty()).unwrap();
        assert_eq!(doc.len(), 2);
    }
}
