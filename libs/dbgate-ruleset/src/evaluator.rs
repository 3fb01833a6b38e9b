//! Rule and ruleset evaluation
//!
//! Applies one immutable ruleset snapshot to one request snapshot,
//! accumulating the admission decision in a `RuleSetResult`. Evaluation is
//! read-only against the ruleset: any number of passes may run concurrently
//! over the same snapshot.
//!
//! Per-rule outcomes are deliberately four-valued: `True`/`Stop` count as
//! matches, `False` is a criterion mismatch, and `None` means the rule could
//! not be evaluated at all (criteria present but no usable comparator) —
//! distinct from a mismatch for diagnostics.

use crate::matcher::{self, MemComparator, StrComparator};
use crate::priority;
use crate::types::{RequestSnapshot, RuleAction, RuleItem, RuleSet, RuleSetResult};

/// Outcome of evaluating one rule against one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMatch {
    /// The rule has criteria but no usable comparator; not evaluable
    None,
    /// At least one criterion did not match
    False,
    /// All criteria matched (or the rule has none); continue with the next rule
    True,
    /// Matched, and the rule's STOP flag halts the pass
    Stop,
}

impl RuleMatch {
    /// Whether this outcome counts as a match
    pub fn is_match(self) -> bool {
        matches!(self, RuleMatch::True | RuleMatch::Stop)
    }
}

/// Injected comparator overrides for one evaluation pass
///
/// `string` replaces the comparator a rule's own mode would resolve to;
/// tests and administrative tooling use it to force re-evaluation under a
/// specific strategy. `memory` compares fingerprint criteria; the default
/// is byte-exact equality, and setting it to `None` makes fingerprint rules
/// not evaluable (`RuleMatch::None`).
#[derive(Clone, Copy)]
pub struct MatchOverrides {
    /// Override for the string comparator; `None` resolves from the rule's mode
    pub string: Option<StrComparator>,
    /// Comparator for fingerprint criteria
    pub memory: Option<MemComparator>,
}

impl Default for MatchOverrides {
    fn default() -> Self {
        MatchOverrides {
            string: None,
            memory: Some(matcher::memory_compare),
        }
    }
}

/// Evaluate one rule against one request, mutating `result` on match
pub fn evaluate_rule(
    rule: &RuleItem,
    overrides: MatchOverrides,
    snapshot: &RequestSnapshot,
    result: &mut RuleSetResult,
) -> RuleMatch {
    let string_cmp = overrides
        .string
        .or_else(|| matcher::comparator_for_mode(rule.mode));

    if let Some(cmp) = string_cmp {
        // Fixed criterion order; first mismatch short-circuits
        if let Some(pattern) = &rule.origin_host {
            if !cmp(&snapshot.origin_host, pattern).is_match() {
                return RuleMatch::False;
            }
        }
        if let Some(pattern) = &rule.origin_task {
            if !cmp(&snapshot.origin_task, pattern).is_match() {
                return RuleMatch::False;
            }
        }
        if let Some(pattern) = &rule.user {
            // A user criterion additionally requires an authenticated session
            match &snapshot.user {
                Some(user) if cmp(user, pattern).is_match() => {},
                _ => return RuleMatch::False,
            }
        }
        if let Some(pattern) = &rule.sql {
            if !cmp(&snapshot.sql, pattern).is_match() {
                return RuleMatch::False;
            }
        }
    } else if rule.has_string_criteria() {
        return RuleMatch::None;
    }

    if let Some(fingerprint) = &rule.fingerprint {
        match overrides.memory {
            Some(cmp) => {
                if !cmp(&snapshot.fingerprint, fingerprint) {
                    return RuleMatch::False;
                }
            },
            None => return RuleMatch::None,
        }
    }

    // Reached only when the rule has no criteria (vacuous match) or every
    // criterion matched under the resolved comparators.
    apply_action(rule, result);

    if rule.flags.print {
        tracing::info!(
            "rule #{} matched: action={} adjustment={} -> [{}]",
            rule.rule_no,
            rule.action,
            rule.adjustment,
            result
        );
    }

    if rule.flags.stop {
        RuleMatch::Stop
    } else {
        RuleMatch::True
    }
}

fn apply_action(rule: &RuleItem, result: &mut RuleSetResult) {
    match rule.action {
        RuleAction::None => {
            // Caller only wanted to test for a match
            return;
        },
        RuleAction::Reject => {
            result.reject = true;
        },
        RuleAction::RejectAll => {
            result.reject_all = true;
        },
        RuleAction::Unreject => {
            result.reject = false;
            result.reject_all = false;
        },
        RuleAction::LowerPriority | RuleAction::RaisePriority => {
            result.priority = priority::adjust(rule.action, result.priority, rule.adjustment);
        },
    }
    if rule.is_loaded() {
        result.rule_no = Some(rule.rule_no);
    }
}

/// Evaluate every loaded rule of `rules` in stored order
///
/// Returns the number of rules that matched. A `Stop` outcome counts as a
/// match and terminates the pass; `False` and `None` continue without
/// counting. Pure in its inputs: identical ruleset, snapshot and overrides
/// always produce the identical count and result.
pub fn evaluate_ruleset(
    rules: &RuleSet,
    snapshot: &RequestSnapshot,
    overrides: MatchOverrides,
    result: &mut RuleSetResult,
) -> usize {
    let mut count = 0;
    for rule in rules.loaded_rules() {
        match evaluate_rule(rule, overrides, snapshot, result) {
            RuleMatch::Stop => {
                count += 1;
                break;
            },
            RuleMatch::True => count += 1,
            RuleMatch::False | RuleMatch::None => {},
        }
    }
    count
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::matcher::StringMatch;
    use crate::priority::Priority;
    use crate::types::{MatchKind, MatchMode, RuleFlags};

    fn snapshot() -> RequestSnapshot {
        RequestSnapshot {
            origin_host: "app-host-01".to_string(),
            origin_task: "billing".to_string(),
            user: Some("alice".to_string()),
            sql: "select 1".to_string(),
            fingerprint: [0xAB; 16],
        }
    }

    fn exact_rule() -> RuleItem {
        RuleItem {
            rule_no: 1,
            mode: MatchMode::new(MatchKind::Exact, false),
            ..RuleItem::default()
        }
    }

    #[test]
    fn test_rule_without_criteria_always_matches() {
        let rule = RuleItem {
            rule_no: 1,
            ..RuleItem::default()
        };
        let mut result = RuleSetResult::default();
        let outcome = evaluate_rule(&rule, MatchOverrides::default(), &snapshot(), &mut result);
        assert_eq!(outcome, RuleMatch::True);
    }

    #[test]
    fn test_exact_criterion() {
        let mut rule = exact_rule();
        rule.origin_host = Some("app-host-01".to_string());
        let mut result = RuleSetResult::default();
        assert_eq!(
            evaluate_rule(&rule, MatchOverrides::default(), &snapshot(), &mut result),
            RuleMatch::True
        );

        rule.origin_host = Some("APP-HOST-01".to_string());
        assert_eq!(
            evaluate_rule(&rule, MatchOverrides::default(), &snapshot(), &mut result),
            RuleMatch::False
        );

        rule.mode.no_case = true;
        assert_eq!(
            evaluate_rule(&rule, MatchOverrides::default(), &snapshot(), &mut result),
            RuleMatch::True
        );
    }

    #[test]
    fn test_user_criterion_requires_authentication() {
        let mut rule = exact_rule();
        rule.user = Some("alice".to_string());

        let mut result = RuleSetResult::default();
        let mut unauthenticated = snapshot();
        unauthenticated.user = None;

        assert_eq!(
            evaluate_rule(
                &rule,
                MatchOverrides::default(),
                &unauthenticated,
                &mut result
            ),
            RuleMatch::False
        );
        assert_eq!(
            evaluate_rule(&rule, MatchOverrides::default(), &snapshot(), &mut result),
            RuleMatch::True
        );
    }

    #[test]
    fn test_criteria_without_comparator_not_evaluable() {
        let mut rule = RuleItem {
            rule_no: 1,
            ..RuleItem::default()
        };
        rule.sql = Some("select 1".to_string());

        let mut result = RuleSetResult::default();
        assert_eq!(
            evaluate_rule(&rule, MatchOverrides::default(), &snapshot(), &mut result),
            RuleMatch::None
        );

        // Fingerprint criterion with the binary comparator disabled
        let mut rule = exact_rule();
        rule.fingerprint = Some([0xAB; 16]);
        let overrides = MatchOverrides {
            string: None,
            memory: None,
        };
        assert_eq!(
            evaluate_rule(&rule, overrides, &snapshot(), &mut result),
            RuleMatch::None
        );
    }

    #[test]
    fn test_fingerprint_byte_equality() {
        let mut rule = exact_rule();
        rule.fingerprint = Some([0u8; 16]);

        let mut result = RuleSetResult::default();
        let mut zeroed = snapshot();
        zeroed.fingerprint = [0u8; 16];
        assert_eq!(
            evaluate_rule(&rule, MatchOverrides::default(), &zeroed, &mut result),
            RuleMatch::True
        );

        // A single differing byte is a mismatch
        zeroed.fingerprint[7] = 1;
        assert_eq!(
            evaluate_rule(&rule, MatchOverrides::default(), &zeroed, &mut result),
            RuleMatch::False
        );
    }

    #[test]
    fn test_string_comparator_override_wins_over_mode() {
        fn never_match(_subject: &str, _pattern: &str) -> StringMatch {
            StringMatch::NotMatched
        }

        let mut rule = exact_rule();
        rule.origin_host = Some("app-host-01".to_string());

        let overrides = MatchOverrides {
            string: Some(never_match),
            ..MatchOverrides::default()
        };
        let mut result = RuleSetResult::default();
        assert_eq!(
            evaluate_rule(&rule, overrides, &snapshot(), &mut result),
            RuleMatch::False
        );
    }

    #[test]
    fn test_stop_halts_the_pass() {
        let mut rules = RuleSet::new(1);
        rules.slot_mut(1).flags = RuleFlags {
            print: false,
            stop: true,
        };
        rules.slot_mut(1).action = RuleAction::Reject;
        rules.slot_mut(2).action = RuleAction::LowerPriority;
        rules.slot_mut(2).adjustment = 100;

        let mut result = RuleSetResult::default();
        let count = evaluate_ruleset(&rules, &snapshot(), MatchOverrides::default(), &mut result);

        assert_eq!(count, 1);
        assert!(result.reject);
        // Rule 2 never ran
        assert_eq!(result.priority, Priority::DEFAULT);
        assert_eq!(result.rule_no, Some(1));
    }

    #[test]
    fn test_unreject_clears_both_bits() {
        let mut rules = RuleSet::new(1);
        rules.slot_mut(1).action = RuleAction::RejectAll;
        rules.slot_mut(2).action = RuleAction::Unreject;
        rules.slot_mut(2).flags.stop = true;

        let mut result = RuleSetResult::default();
        let count = evaluate_ruleset(&rules, &snapshot(), MatchOverrides::default(), &mut result);

        assert_eq!(count, 2);
        assert!(!result.is_rejected());
        assert_eq!(result.rule_no, Some(2));
    }

    #[test]
    fn test_priority_actions_accumulate() {
        let mut rules = RuleSet::new(1);
        rules.slot_mut(1).action = RuleAction::RaisePriority;
        rules.slot_mut(1).adjustment = 300;
        rules.slot_mut(2).action = RuleAction::LowerPriority;
        rules.slot_mut(2).adjustment = 100;

        let mut result = RuleSetResult::default();
        let count = evaluate_ruleset(&rules, &snapshot(), MatchOverrides::default(), &mut result);

        assert_eq!(count, 2);
        assert_eq!(result.priority, Priority(4_800));
    }

    #[test]
    fn test_placeholder_slots_are_skipped() {
        let mut rules = RuleSet::new(1);
        // Slot 3 is loaded; slots 1 and 2 are zero-numbered placeholders
        rules.slot_mut(3).action = RuleAction::Reject;

        let mut result = RuleSetResult::default();
        let count = evaluate_ruleset(&rules, &snapshot(), MatchOverrides::default(), &mut result);

        // Placeholders would match vacuously if they were evaluated
        assert_eq!(count, 1);
        assert_eq!(result.rule_no, Some(3));
    }

    #[test]
    fn test_empty_ruleset_leaves_result_untouched() {
        let rules = RuleSet::new(1);
        let mut result = RuleSetResult::default();
        let before = result;
        let count = evaluate_ruleset(&rules, &snapshot(), MatchOverrides::default(), &mut result);
        assert_eq!(count, 0);
        assert_eq!(result, before);
    }

    #[test]
    fn test_mismatching_rule_does_not_touch_result() {
        let mut rules = RuleSet::new(1);
        {
            let rule = rules.slot_mut(1);
            rule.mode = MatchMode::new(MatchKind::Exact, false);
            rule.origin_host = Some("other-host".to_string());
            rule.action = RuleAction::RejectAll;
        }

        let mut result = RuleSetResult::default();
        let count = evaluate_ruleset(&rules, &snapshot(), MatchOverrides::default(), &mut result);
        assert_eq!(count, 0);
        assert!(!result.is_rejected());
        assert_eq!(result.rule_no, None);
    }
}
