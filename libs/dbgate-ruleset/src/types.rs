//! Ruleset data model
//!
//! Core types for admission-control rule evaluation:
//! - RuleSet: immutable-once-published snapshot of ordered rules
//! - RuleItem: one rule (action, flags, match mode, criteria)
//! - RuleSetResult: per-request decision accumulator
//! - RequestSnapshot: read-only attributes of one incoming request
//!
//! Enum tokens (Display/parse) are stable and reversible; they are the
//! vocabulary of both the persistence grammar and the diagnostic dump.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::priority::Priority;

/// Length of a SQL fingerprint digest in bytes
pub const FINGERPRINT_LEN: usize = 16;

/// Largest rule number accepted by the loader
pub const MAX_RULE_NO: u16 = 1000;

/// 16-byte digest identifying the normalized shape of a SQL statement
pub type Fingerprint = [u8; FINGERPRINT_LEN];

// ============================================================================
// Enum vocabulary
// ============================================================================

/// What to do when a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    /// Take no action (test for match only)
    #[default]
    None,
    /// Reject the request; it may be retried elsewhere
    Reject,
    /// Reject the request with no retry permitted
    RejectAll,
    /// Undo both `Reject` and `RejectAll`
    Unreject,
    /// Lower the request priority by the rule's adjustment
    LowerPriority,
    /// Raise the request priority by the rule's adjustment
    RaisePriority,
}

impl RuleAction {
    /// Canonical persistence token
    pub fn token(self) -> &'static str {
        match self {
            RuleAction::None => "NONE",
            RuleAction::Reject => "REJECT",
            RuleAction::RejectAll => "REJECT_ALL",
            RuleAction::Unreject => "UNREJECT",
            RuleAction::LowerPriority => "LOW_PRIO",
            RuleAction::RaisePriority => "HIGH_PRIO",
        }
    }

    /// Parse a persistence token, case-insensitively
    pub fn parse(token: &str) -> Option<RuleAction> {
        let token = token.trim();
        for action in [
            RuleAction::None,
            RuleAction::Reject,
            RuleAction::RejectAll,
            RuleAction::Unreject,
            RuleAction::LowerPriority,
            RuleAction::RaisePriority,
        ] {
            if token.eq_ignore_ascii_case(action.token()) {
                return Some(action);
            }
        }
        None
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Behavioral flags of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleFlags {
    /// Emit a trace message when the rule matches
    #[serde(default)]
    pub print: bool,
    /// Halt ruleset evaluation after this rule matches
    #[serde(default)]
    pub stop: bool,
}

impl RuleFlags {
    /// True when no flag is set
    pub fn is_empty(self) -> bool {
        !self.print && !self.stop
    }
}

impl fmt::Display for RuleFlags {
    /// Canonical token order: PRINT, STOP; "NONE" for the empty set
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (set, token) in [(self.print, "PRINT"), (self.stop, "STOP")] {
            if set {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(token)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Base kind of string comparison for a rule's criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchKind {
    /// No matching; string criteria on the rule cannot be evaluated
    #[default]
    None,
    /// Byte-exact comparison
    Exact,
    /// Shell-style wildcards: `*`, `?`, and `[...]` character classes
    Glob,
    /// Regular-expression match, compiled per attempt
    Regexp,
}

impl MatchKind {
    fn token(self) -> &'static str {
        match self {
            MatchKind::None => "NONE",
            MatchKind::Exact => "EXACT",
            MatchKind::Glob => "GLOB",
            MatchKind::Regexp => "REGEXP",
        }
    }
}

/// Match mode of one rule: a base kind plus the orthogonal NOCASE modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchMode {
    /// Base comparison kind (mutually exclusive)
    pub kind: MatchKind,
    /// Fold ASCII case before comparing
    #[serde(default)]
    pub no_case: bool,
}

impl MatchMode {
    /// Convenience constructor
    pub fn new(kind: MatchKind, no_case: bool) -> MatchMode {
        MatchMode { kind, no_case }
    }
}

impl fmt::Display for MatchMode {
    /// Canonical token order: base kind, then NOCASE
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.no_case) {
            (MatchKind::None, false) => f.write_str("NONE"),
            (MatchKind::None, true) => f.write_str("NOCASE"),
            (kind, false) => f.write_str(kind.token()),
            (kind, true) => write!(f, "{} NOCASE", kind.token()),
        }
    }
}

// ============================================================================
// Rule model
// ============================================================================

/// One admission-control rule
///
/// All criteria on a rule are implicitly ANDed. A rule with no criteria at
/// all matches every request (used for catch-all rules). A `rule_no` of
/// zero marks an unloaded placeholder slot: the evaluator skips it and the
/// serializer does not emit it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleItem {
    /// 1-based rule number; 0 = unloaded slot
    pub rule_no: u16,

    /// Action applied to the result when the rule matches
    pub action: RuleAction,

    /// Non-negative priority adjustment magnitude; the sign is derived
    /// from the action at apply time
    pub adjustment: u32,

    /// Behavioral flags (stop-on-match, trace-on-match)
    pub flags: RuleFlags,

    /// String comparison strategy for the rule's criteria
    pub mode: MatchMode,

    /// Origin host criterion
    pub origin_host: Option<String>,

    /// Origin task/program name criterion
    pub origin_task: Option<String>,

    /// Username criterion; only matches authenticated requests
    pub user: Option<String>,

    /// SQL text criterion
    pub sql: Option<String>,

    /// SQL fingerprint criterion, compared byte-exact
    pub fingerprint: Option<Fingerprint>,
}

impl RuleItem {
    /// Whether this slot holds a loaded rule
    pub fn is_loaded(&self) -> bool {
        self.rule_no != 0
    }

    /// Whether any string criterion is present
    pub fn has_string_criteria(&self) -> bool {
        self.origin_host.is_some()
            || self.origin_task.is_some()
            || self.user.is_some()
            || self.sql.is_some()
    }

    /// Whether any criterion at all is present
    pub fn has_criteria(&self) -> bool {
        self.has_string_criteria() || self.fingerprint.is_some()
    }
}

/// An ordered, immutable-once-published set of rules
///
/// Index order equals evaluation order equals rule number order. Published
/// rulesets are replaced wholesale (see `RulesetContext`), never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    /// Monotonic load ordinal stamped by the owning context
    pub generation: u64,

    /// Wall-clock time this snapshot was built
    pub loaded_at: DateTime<Utc>,

    /// Rule slots; index i holds rule number i + 1 (or a placeholder)
    pub rules: Vec<RuleItem>,
}

impl RuleSet {
    /// Create an empty ruleset with the given generation stamp
    pub fn new(generation: u64) -> RuleSet {
        RuleSet {
            generation,
            loaded_at: Utc::now(),
            rules: Vec::new(),
        }
    }

    /// Number of loaded rules (placeholder slots excluded)
    pub fn rule_count(&self) -> usize {
        self.rules.iter().filter(|r| r.is_loaded()).count()
    }

    /// Number of loaded rules carrying a fingerprint criterion
    pub fn fingerprint_count(&self) -> usize {
        self.rules
            .iter()
            .filter(|r| r.is_loaded() && r.fingerprint.is_some())
            .count()
    }

    /// Iterate over loaded rules in evaluation order
    pub fn loaded_rules(&self) -> impl Iterator<Item = &RuleItem> {
        self.rules.iter().filter(|r| r.is_loaded())
    }

    /// Slot for `rule_no`, growing the array with zero-numbered
    /// placeholders as needed and marking the slot loaded
    ///
    /// `rule_no` must be in `[1, MAX_RULE_NO]`; the loader enforces this
    /// before calling.
    pub fn slot_mut(&mut self, rule_no: u16) -> &mut RuleItem {
        debug_assert!(rule_no >= 1 && rule_no <= MAX_RULE_NO);
        let index = usize::from(rule_no) - 1;
        if index >= self.rules.len() {
            self.rules.resize_with(index + 1, RuleItem::default);
        }
        let slot = &mut self.rules[index];
        slot.rule_no = rule_no;
        slot
    }
}

// ============================================================================
// Evaluation input and output
// ============================================================================

/// Read-only attributes of one incoming request
///
/// Supplied by the connection/session layer; the fingerprint is computed by
/// an external digesting collaborator over normalized SQL text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// Host the connection originated from
    pub origin_host: String,

    /// Task/program name on the originating host
    pub origin_task: String,

    /// Authenticated username; `None` when the session is unauthenticated
    pub user: Option<String>,

    /// SQL text of the request
    pub sql: String,

    /// Fingerprint of the normalized SQL text
    pub fingerprint: Fingerprint,
}

/// Accumulated decision for one request
///
/// Created fresh per request, threaded through every rule in order, then
/// handed to the external admission/scheduling collaborator. `reject` and
/// `reject_all` are separate bits so the retryable/non-retryable
/// distinction survives; `Unreject` clears both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleSetResult {
    /// Reject the request; retry on another node is permitted
    pub reject: bool,

    /// Reject the request; no retry permitted
    pub reject_all: bool,

    /// Scheduling priority the request should be enqueued at
    pub priority: Priority,

    /// Rule number that most recently changed the decision
    pub rule_no: Option<u16>,
}

impl RuleSetResult {
    /// Whether any reject bit is set
    pub fn is_rejected(&self) -> bool {
        self.reject || self.reject_all
    }

    /// Whether a rejected request may be retried on another node
    pub fn is_retryable(&self) -> bool {
        !self.reject_all
    }
}

impl fmt::Display for RuleSetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("action=")?;
        match (self.reject, self.reject_all) {
            (false, false) => f.write_str("NONE")?,
            (true, false) => f.write_str("REJECT")?,
            (false, true) => f.write_str("REJECT_ALL")?,
            (true, true) => f.write_str("REJECT REJECT_ALL")?,
        }
        write!(f, ", priority={}", self.priority)
    }
}
