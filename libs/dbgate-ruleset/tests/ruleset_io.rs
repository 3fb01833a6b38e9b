//! Integration tests for ruleset persistence and end-to-end evaluation
//!
//! Exercises the loader/serializer pair against real files and the
//! evaluator against rulesets built through the documented grammar.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::fs;
use std::io::Write;

use dbgate_ruleset::{
    evaluate_ruleset, load_ruleset, save_ruleset, serialize_ruleset, MatchOverrides, Priority,
    RequestSnapshot, RuleSetResult, RulesetContext, RulesetError,
};
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp file");
    file
}

fn snapshot(host: &str, task: &str, user: Option<&str>, sql: &str) -> RequestSnapshot {
    RequestSnapshot {
        origin_host: host.to_string(),
        origin_task: task.to_string(),
        user: user.map(str::to_string),
        sql: sql.to_string(),
        fingerprint: [0u8; 16],
    }
}

const SAMPLE: &str = "\
# Admission rules for the billing pool
version 1

rule 1 action HIGH_PRIO adjustment 500 mode {EXACT NOCASE} originTask billing
rule 2 action REJECT flags {STOP} mode {GLOB} originHost batch-*
rule 3 action LOW_PRIO adjustment 1500 mode {REGEXP NOCASE} sql ^select .* order by
rule 4 action REJECT_ALL fingerprint X'000102030405060708090A0B0C0D0E0F'
";

#[test]
fn test_load_save_load_round_trip() {
    let input = write_temp(SAMPLE);
    let rules = load_ruleset(input.path(), 1).unwrap();
    assert_eq!(rules.rule_count(), 4);
    assert_eq!(rules.fingerprint_count(), 1);

    let output = NamedTempFile::new().unwrap();
    save_ruleset(output.path(), &rules).unwrap();
    let reloaded = load_ruleset(output.path(), 2).unwrap();

    assert_eq!(rules.rules, reloaded.rules);
    assert_eq!(reloaded.generation, 2);

    // Saving again produces byte-identical text (canonical form)
    let text = fs::read_to_string(output.path()).unwrap();
    assert_eq!(text, serialize_ruleset(&reloaded));
}

#[test]
fn test_end_to_end_evaluation() {
    let input = write_temp(SAMPLE);
    let rules = load_ruleset(input.path(), 1).unwrap();

    // Rule 1 raises billing traffic, rule 3 lowers sorted selects
    let request = snapshot(
        "app-07",
        "BILLING",
        Some("alice"),
        "SELECT a FROM t ORDER BY a",
    );
    let mut result = RuleSetResult::default();
    let count = evaluate_ruleset(&rules, &request, MatchOverrides::default(), &mut result);
    assert_eq!(count, 2);
    assert!(!result.is_rejected());
    assert_eq!(result.priority, Priority(6_000));
    assert_eq!(result.rule_no, Some(3));

    // Rule 2 stops the pass before rule 3 can adjust anything
    let request = snapshot("batch-42", "billing", None, "select * from t order by 1");
    let mut result = RuleSetResult::default();
    let count = evaluate_ruleset(&rules, &request, MatchOverrides::default(), &mut result);
    assert_eq!(count, 2);
    assert!(result.reject);
    assert!(result.is_retryable());
    assert_eq!(result.priority, Priority(4_500));
    assert_eq!(result.rule_no, Some(2));

    // Rule 4 matches on its fingerprint criterion and forbids retry
    let mut request = snapshot("app-07", "reports", None, "delete from t");
    request.fingerprint = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
    let mut result = RuleSetResult::default();
    evaluate_ruleset(&rules, &request, MatchOverrides::default(), &mut result);
    assert!(result.reject_all);
    assert!(!result.is_retryable());
}

#[test]
fn test_evaluation_is_repeatable() {
    let input = write_temp(SAMPLE);
    let rules = load_ruleset(input.path(), 1).unwrap();
    let request = snapshot("batch-1", "billing", Some("bob"), "select 1");

    let mut first = RuleSetResult::default();
    let mut second = RuleSetResult::default();
    let count_a = evaluate_ruleset(&rules, &request, MatchOverrides::default(), &mut first);
    let count_b = evaluate_ruleset(&rules, &request, MatchOverrides::default(), &mut second);

    assert_eq!(count_a, count_b);
    assert_eq!(first, second);
}

#[test]
fn test_version_2_load_fails_without_publishing() {
    let good = write_temp("version 1\nrule 1 action REJECT\n");
    let bad = write_temp("version 2\nrule 1 action REJECT\n");

    let ctx = RulesetContext::new();
    ctx.load_file(good.path()).unwrap();
    let active = ctx.current().unwrap();

    let err = ctx.load_file(bad.path()).unwrap_err();
    assert!(matches!(err, RulesetError::Parse { line: 1, .. }));

    // The previously active ruleset is unaffected
    let still_active = ctx.current().unwrap();
    assert_eq!(still_active.generation, active.generation);
    assert_eq!(still_active.rules, active.rules);
}

#[test]
fn test_load_error_names_file_and_line() {
    let bad = write_temp("version 1\nrule 1 action REJECT\nrule 2 mode {EXACT REGEXP}\n");
    let err = load_ruleset(bad.path(), 1).unwrap_err();
    let text = err.to_string();
    assert!(text.contains(&bad.path().display().to_string()), "{}", text);
    assert!(text.contains(":3:"), "{}", text);
    assert!(text.contains("mode"), "{}", text);
}

#[test]
fn test_missing_file_is_io_error() {
    let err = load_ruleset(std::path::Path::new("/nonexistent/rules.txt"), 1).unwrap_err();
    assert!(matches!(err, RulesetError::Io { .. }));
}

#[test]
fn test_context_generations_increase() {
    let file = write_temp("version 1\nrule 1 action REJECT\n");
    let ctx = RulesetContext::new();
    let first = ctx.load_file(file.path()).unwrap();
    let second = ctx.load_file(file.path()).unwrap();
    assert!(second.generation > first.generation);
}
