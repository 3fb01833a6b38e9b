//! DBGate Ruleset - Admission-Control Rule Engine
//!
//! A request admission-control and priority-adjustment engine for the
//! DBGate dispatcher, providing:
//! - An ordered rule model with exact/glob/regexp string criteria and
//!   16-byte SQL fingerprint criteria
//! - Deterministic short-circuit evaluation with reject/unreject actions
//!   and clamped priority arithmetic
//! - A line-oriented, versioned persistence format with strict error
//!   reporting, plus a diagnostic dump
//! - An injectable active-ruleset context with atomic whole-object
//!   replacement
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Loader    │────▶│   RuleSet    │◀────│   Context    │
//! │ (parse/save)│     │  (snapshot)  │     │ (Arc swap)   │
//! └─────────────┘     └──────┬───────┘     └──────────────┘
//!                            │
//!                            ▼
//!                     ┌──────────────┐     ┌──────────────┐
//!                     │  Evaluator   │────▶│RuleSetResult │
//!                     │ (per request)│     │ (to scheduler)│
//!                     └──────────────┘     └──────────────┘
//! ```
//!
//! Evaluation is read-only against an immutable `RuleSet`; any number of
//! requests may be evaluated concurrently against the same snapshot.

mod context;
mod error;
mod evaluator;
mod loader;
mod matcher;
mod priority;
pub mod types;

// Re-export public API
pub use context::RulesetContext;
pub use error::{Result, RulesetError};
pub use evaluator::{evaluate_rule, evaluate_ruleset, MatchOverrides, RuleMatch};
pub use loader::{
    decode_fingerprint_hex, dump_ruleset, encode_fingerprint_hex, load_ruleset, parse_ruleset,
    save_ruleset, serialize_ruleset, RULESET_VERSION,
};
pub use matcher::{comparator_for_mode, memory_compare, MemComparator, StrComparator, StringMatch};
pub use priority::{adjust, Priority};

// Re-export model types for convenience
pub use types::{
    Fingerprint, MatchKind, MatchMode, RequestSnapshot, RuleAction, RuleFlags, RuleItem, RuleSet,
    RuleSetResult, FINGERPRINT_LEN, MAX_RULE_NO,
};
