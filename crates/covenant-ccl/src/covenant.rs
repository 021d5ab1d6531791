// covenant.rs — Covenant envelope: who granted which CCL document to whom.
//
// A Covenant wraps a parsed Document with delegation metadata. Children point
// at their parent through `parent_id`, forming a chain of authority that
// `validate_chain` checks one adjacent pair at a time.
//
// `canonical_form` is the byte string an external signer signs. It renders
// the constraints as canonical CCL, so comments and whitespace in the
// original source do not affect the hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::ast::Document;
use crate::error::CclError;
use crate::evaluator::{Context, Decision, Evaluator};
use crate::narrowing::{validate_narrowing, NarrowingViolation};
use crate::parser::parse;

/// A CCL document issued by one party to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CovenantRepr", into = "CovenantRepr")]
pub struct Covenant {
    pub id: Uuid,
    pub issuer: String,
    pub beneficiary: String,
    /// The covenant this one was derived from; `None` for a root.
    pub parent_id: Option<Uuid>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    constraints: String,
    document: Document,
}

/// Wire form: the constraints travel as CCL source and are re-parsed on load.
#[derive(Serialize, Deserialize)]
struct CovenantRepr {
    id: Uuid,
    issuer: String,
    beneficiary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<Uuid>,
    constraints: String,
    issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<CovenantRepr> for Covenant {
    type Error = CclError;

    fn try_from(repr: CovenantRepr) -> Result<Self, Self::Error> {
        let document = parse(&repr.constraints)?;
        Ok(Self {
            id: repr.id,
            issuer: repr.issuer,
            beneficiary: repr.beneficiary,
            parent_id: repr.parent_id,
            issued_at: repr.issued_at,
            expires_at: repr.expires_at,
            constraints: repr.constraints,
            document,
        })
    }
}

impl From<Covenant> for CovenantRepr {
    fn from(c: Covenant) -> Self {
        Self {
            id: c.id,
            issuer: c.issuer,
            beneficiary: c.beneficiary,
            parent_id: c.parent_id,
            constraints: c.constraints,
            issued_at: c.issued_at,
            expires_at: c.expires_at,
        }
    }
}

impl Covenant {
    /// Issue a root covenant. Fails if `constraints` is not valid CCL.
    pub fn new(
        issuer: impl Into<String>,
        beneficiary: impl Into<String>,
        constraints: impl Into<String>,
    ) -> Result<Self, CclError> {
        let constraints = constraints.into();
        let document = parse(&constraints)?;
        Ok(Self {
            id: Uuid::new_v4(),
            issuer: issuer.into(),
            beneficiary: beneficiary.into(),
            parent_id: None,
            issued_at: Utc::now(),
            expires_at: None,
            constraints,
            document,
        })
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Delegate to `beneficiary`. The current beneficiary becomes the issuer
    /// and the child inherits this covenant's expiry.
    ///
    /// This does not check narrowing; use [`validate_chain`] for that.
    pub fn derive_child(
        &self,
        beneficiary: impl Into<String>,
        constraints: impl Into<String>,
    ) -> Result<Covenant, CclError> {
        let mut child = Covenant::new(self.beneficiary.clone(), beneficiary, constraints)?;
        child.parent_id = Some(self.id);
        child.expires_at = self.expires_at;
        Ok(child)
    }

    /// CCL source as issued.
    pub fn constraints(&self) -> &str {
        &self.constraints
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Evaluate an action under this covenant. Expired covenants deny everything.
    pub fn evaluate(
        &self,
        evaluator: &Evaluator,
        action: &str,
        resource: &str,
        context: &Context,
        now: DateTime<Utc>,
    ) -> Decision {
        if self.is_expired(now) {
            tracing::debug!(covenant = %self.id, "covenant expired; denying");
            return Decision {
                permitted: false,
                matched_statement: None,
                all_matches: Vec::new(),
                reason: format!("covenant {} expired", self.id),
                severity: None,
            };
        }
        evaluator.evaluate(&self.document, action, resource, context)
    }

    /// Deterministic JSON rendering (sorted keys, canonical CCL constraints).
    pub fn canonical_form(&self) -> String {
        serde_json::json!({
            "id": self.id,
            "issuer": self.issuer,
            "beneficiary": self.beneficiary,
            "parent_id": self.parent_id,
            "constraints": self.document.to_string(),
            "issued_at": self.issued_at.to_rfc3339(),
            "expires_at": self.expires_at.map(|t| t.to_rfc3339()),
        })
        .to_string()
    }

    /// Lowercase hex SHA-256 of [`canonical_form`](Self::canonical_form).
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_form().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A defect in a delegation chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainViolation {
    /// The covenant at `depth` does not name its predecessor as parent.
    #[error("covenant at depth {depth} does not link to {expected_parent}")]
    BrokenLink {
        depth: usize,
        expected_parent: Uuid,
        found_parent: Option<Uuid>,
    },

    /// The covenant at `depth` may be used after its parent expires.
    #[error("covenant at depth {depth} outlives its parent")]
    OutlivesParent { depth: usize },

    /// The covenant at `depth` grants more than its parent.
    #[error("covenant at depth {depth} exceeds its parent: {}", violation.reason)]
    Narrowing {
        depth: usize,
        violation: NarrowingViolation,
    },
}

/// Check a chain ordered root first. `depth` in each violation is the index
/// of the offending child.
pub fn validate_chain(chain: &[Covenant]) -> Vec<ChainViolation> {
    let mut violations = Vec::new();
    for (i, pair) in chain.windows(2).enumerate() {
        let (parent, child) = (&pair[0], &pair[1]);
        let depth = i + 1;

        if child.parent_id != Some(parent.id) {
            violations.push(ChainViolation::BrokenLink {
                depth,
                expected_parent: parent.id,
                found_parent: child.parent_id,
            });
        }

        if let Some(parent_expiry) = parent.expires_at {
            if child.expires_at.map_or(true, |e| e > parent_expiry) {
                violations.push(ChainViolation::OutlivesParent { depth });
            }
        }

        violations.extend(
            validate_narrowing(&parent.document, &child.document)
                .into_iter()
                .map(|violation| ChainViolation::Narrowing { depth, violation }),
        );
    }
    if !violations.is_empty() {
        tracing::debug!(
            length = chain.len(),
            violations = violations.len(),
            "delegation chain rejected"
        );
    }
    violations
}
