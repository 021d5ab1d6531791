//! # covenant-ccl
//!
//! Compiler and evaluation engine for the Covenant Constraint Language (CCL).
//!
//! CCL documents state what an agent may (`permit`), must not (`deny`), must
//! also do (`require`) and how often it may act (`limit`). Source text is
//! parsed into an immutable [`Document`]; the [`Evaluator`] decides individual
//! actions against it; [`validate_narrowing`] checks that a delegated document
//! only restricts its parent.
//!
//! ## Key invariants
//!
//! - **Default deny**: no matching statement → denied.
//! - **Deny wins**: a matching deny outranks any permit, however specific.
//! - **Fail closed on bad input**: a syntax error rejects the whole document.
//! - **No I/O while evaluating**: counters and context come from the caller.
//!
//! ## Quick Example
//!
//! ```rust
//! use covenant_ccl::{evaluate, parse, Context};
//!
//! let doc = parse("permit * on '**'\ndeny * on '/admin/**' severity critical").unwrap();
//! let decision = evaluate(&doc, "file.read", "/admin/secrets", &Context::new());
//! assert!(!decision.permitted);
//! ```

pub mod ast;
pub mod config;
pub mod covenant;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod merge;
pub mod narrowing;
pub mod parser;
pub mod pattern;
pub mod rate_limit;
pub mod token;

pub use ast::{
    AccessRule, Condition, Document, LimitRule, Operator, Severity, Statement, StatementKind,
    Value,
};
pub use config::EngineConfig;
pub use covenant::{validate_chain, ChainViolation, Covenant};
pub use error::{CclError, ConfigError};
pub use evaluator::{evaluate, Context, Decision, Evaluator, EvaluatorOptions};
pub use lexer::tokenize;
pub use merge::merge;
pub use narrowing::{validate_narrowing, NarrowingViolation};
pub use parser::{parse, parse_with, ParserOptions};
pub use pattern::{pattern_matches, resource_matches};
pub use rate_limit::{check_rate_limit, RateLimitStatus};

/// Render a document as canonical CCL source, one statement per line.
///
/// `parse(&serialize(&doc))` yields the same statements apart from line numbers.
pub fn serialize(document: &Document) -> String {
    document.to_string()
}
