//! Ruleset persistence: textual load, save and diagnostic dump
//!
//! The persistence format is line-oriented ASCII. Blank lines and lines
//! starting with `#` are ignored. The first substantive line must be
//! `version 1`. Every other line is
//!
//! ```text
//! rule <n> <field> <value> [<field> <value> ...]
//! ```
//!
//! with `n` in `[1, 1000]`. Repeated lines for the same rule number merge
//! into the same slot; intermediate slots are zero-numbered placeholders.
//! Token-set fields (`flags`, `mode`) accept a bare token, a comma list or
//! a brace-delimited set (`{EXACT NOCASE}`). The `sql` field consumes the
//! remainder of its line and is therefore always last. Any malformed token
//! aborts the whole load; no partial ruleset is ever returned.
//!
//! The serializer is the structural inverse and emits token sets in one
//! fixed canonical order, so `load(save(R))` reproduces `R` for any
//! loadable `R`.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{Result, RulesetError};
use crate::types::{
    Fingerprint, MatchKind, MatchMode, RuleAction, RuleFlags, RuleSet, FINGERPRINT_LEN,
    MAX_RULE_NO,
};

/// The only persistence format version this loader accepts
pub const RULESET_VERSION: u32 = 1;

/// Load a ruleset file, stamping it with `generation`
pub fn load_ruleset(path: &Path, generation: u64) -> Result<RuleSet> {
    let file = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| RulesetError::Io {
        file: file.clone(),
        source,
    })?;
    parse_ruleset(&text, &file, generation)
}

/// Parse ruleset text; `source` names the file for error reporting
pub fn parse_ruleset(text: &str, source: &str, generation: u64) -> Result<RuleSet> {
    let mut rules = RuleSet::new(generation);
    let mut saw_version = false;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut cur = Cursor::new(line);
        let directive = match cur.next_token() {
            Some(tok) => tok,
            None => continue,
        };

        if !saw_version {
            if !directive.eq_ignore_ascii_case("version") {
                return Err(RulesetError::parse(
                    source,
                    line_no,
                    format!("expected version directive, found '{}'", directive),
                ));
            }
            let tok = cur.next_token().ok_or_else(|| {
                RulesetError::parse(source, line_no, "missing version number")
            })?;
            let version: u32 = tok.parse().map_err(|_| {
                RulesetError::parse(source, line_no, format!("bad version number '{}'", tok))
            })?;
            if version != RULESET_VERSION {
                return Err(RulesetError::parse(
                    source,
                    line_no,
                    format!("unsupported ruleset version {}", version),
                ));
            }
            if let Some(extra) = cur.next_token() {
                return Err(RulesetError::parse(
                    source,
                    line_no,
                    format!("unexpected token '{}' after version", extra),
                ));
            }
            saw_version = true;
            continue;
        }

        if !directive.eq_ignore_ascii_case("rule") {
            return Err(RulesetError::parse(
                source,
                line_no,
                format!("unknown directive '{}'", directive),
            ));
        }
        parse_rule_line(&mut cur, &mut rules, source, line_no)?;
    }

    if !saw_version {
        return Err(RulesetError::parse(
            source,
            1,
            "missing version directive",
        ));
    }

    Ok(rules)
}

fn parse_rule_line(
    cur: &mut Cursor<'_>,
    rules: &mut RuleSet,
    source: &str,
    line_no: usize,
) -> Result<()> {
    let tok = cur
        .next_token()
        .ok_or_else(|| RulesetError::parse(source, line_no, "missing rule number"))?;
    let rule_no: u16 = tok.parse().map_err(|_| {
        RulesetError::parse(source, line_no, format!("bad rule number '{}'", tok))
    })?;
    if rule_no < 1 || rule_no > MAX_RULE_NO {
        return Err(RulesetError::parse(
            source,
            line_no,
            format!("rule number {} out of range [1, {}]", rule_no, MAX_RULE_NO),
        ));
    }

    let rule = rules.slot_mut(rule_no);

    while let Some(field) = cur.next_token() {
        match field.to_ascii_lowercase().as_str() {
            "action" => {
                let tok = need_value(cur, source, line_no, field)?;
                rule.action = RuleAction::parse(tok).ok_or_else(|| {
                    RulesetError::parse(
                        source,
                        line_no,
                        format!("field 'action': unknown action '{}'", tok),
                    )
                })?;
            },
            "adjustment" => {
                let tok = need_value(cur, source, line_no, field)?;
                rule.adjustment = parse_adjustment(tok, source, line_no)?;
            },
            "flags" => {
                let tokens = read_token_set(cur, source, line_no, "flags")?;
                rule.flags = parse_flags(&tokens, source, line_no)?;
            },
            "mode" => {
                let tokens = read_token_set(cur, source, line_no, "mode")?;
                rule.mode = parse_mode(&tokens, source, line_no)?;
            },
            "originhost" => {
                rule.origin_host = Some(need_value(cur, source, line_no, field)?.to_string());
            },
            "origintask" => {
                rule.origin_task = Some(need_value(cur, source, line_no, field)?.to_string());
            },
            "user" => {
                rule.user = Some(need_value(cur, source, line_no, field)?.to_string());
            },
            "fingerprint" => {
                let tok = need_value(cur, source, line_no, field)?;
                rule.fingerprint = Some(parse_fingerprint_literal(tok).ok_or_else(|| {
                    RulesetError::parse(
                        source,
                        line_no,
                        format!(
                            "field 'fingerprint': malformed blob literal '{}' \
                             (expected X'<{} hex digits>')",
                            tok,
                            FINGERPRINT_LEN * 2
                        ),
                    )
                })?);
            },
            "sql" => {
                // Free text up to end of line, so always the final field
                let text = cur.rest_of_line();
                if text.is_empty() {
                    return Err(RulesetError::parse(
                        source,
                        line_no,
                        "missing value for field 'sql'",
                    ));
                }
                rule.sql = Some(text.to_string());
            },
            _ => {
                return Err(RulesetError::parse(
                    source,
                    line_no,
                    format!("unknown field '{}'", field),
                ));
            },
        }
    }

    Ok(())
}

fn need_value<'a>(
    cur: &mut Cursor<'a>,
    source: &str,
    line_no: usize,
    field: &str,
) -> Result<&'a str> {
    cur.next_token().ok_or_else(|| {
        RulesetError::parse(
            source,
            line_no,
            format!("missing value for field '{}'", field),
        )
    })
}

fn parse_adjustment(tok: &str, source: &str, line_no: usize) -> Result<u32> {
    let digits = tok.strip_prefix('+').unwrap_or(tok);
    let value: i64 = digits.parse().map_err(|_| {
        RulesetError::parse(
            source,
            line_no,
            format!("field 'adjustment': bad integer '{}'", tok),
        )
    })?;
    if value < 0 {
        // Magnitudes only; the sign comes from the action at apply time
        return Err(RulesetError::parse(
            source,
            line_no,
            format!("field 'adjustment': must be non-negative, got {}", value),
        ));
    }
    u32::try_from(value).map_err(|_| {
        RulesetError::parse(
            source,
            line_no,
            format!("field 'adjustment': value {} out of range", value),
        )
    })
}

/// Read a token-set value: one bare token, a comma list, or `{...}`
/// spanning whitespace until the closing brace
fn read_token_set<'a>(
    cur: &mut Cursor<'a>,
    source: &str,
    line_no: usize,
    field: &str,
) -> Result<Vec<&'a str>> {
    let first = need_value(cur, source, line_no, field)?;
    let mut parts: Vec<&'a str> = Vec::new();

    if let Some(stripped) = first.strip_prefix('{') {
        let mut chunk = stripped;
        loop {
            if let Some(inner) = chunk.strip_suffix('}') {
                push_set_tokens(&mut parts, inner);
                break;
            }
            push_set_tokens(&mut parts, chunk);
            chunk = cur.next_token().ok_or_else(|| {
                RulesetError::parse(
                    source,
                    line_no,
                    format!("field '{}': unbalanced token-set braces", field),
                )
            })?;
        }
    } else {
        push_set_tokens(&mut parts, first);
    }

    if parts.is_empty() {
        return Err(RulesetError::parse(
            source,
            line_no,
            format!("field '{}': empty token set", field),
        ));
    }
    Ok(parts)
}

fn push_set_tokens<'a>(parts: &mut Vec<&'a str>, chunk: &'a str) {
    parts.extend(chunk.split(',').filter(|t| !t.is_empty()));
}

fn parse_flags(tokens: &[&str], source: &str, line_no: usize) -> Result<RuleFlags> {
    let mut flags = RuleFlags::default();
    for tok in tokens {
        if tok.eq_ignore_ascii_case("NONE") {
            // Explicit empty marker, ignored alongside real flags
        } else if tok.eq_ignore_ascii_case("PRINT") {
            flags.print = true;
        } else if tok.eq_ignore_ascii_case("STOP") {
            flags.stop = true;
        } else {
            return Err(RulesetError::parse(
                source,
                line_no,
                format!("field 'flags': unknown flag '{}'", tok),
            ));
        }
    }
    Ok(flags)
}

fn parse_mode(tokens: &[&str], source: &str, line_no: usize) -> Result<MatchMode> {
    let mut mode = MatchMode::default();
    for tok in tokens {
        let kind = if tok.eq_ignore_ascii_case("NONE") {
            continue;
        } else if tok.eq_ignore_ascii_case("NOCASE") {
            mode.no_case = true;
            continue;
        } else if tok.eq_ignore_ascii_case("EXACT") {
            MatchKind::Exact
        } else if tok.eq_ignore_ascii_case("GLOB") {
            MatchKind::Glob
        } else if tok.eq_ignore_ascii_case("REGEXP") {
            MatchKind::Regexp
        } else {
            return Err(RulesetError::parse(
                source,
                line_no,
                format!("field 'mode': unknown mode '{}'", tok),
            ));
        };
        // Base kinds are mutually exclusive
        if mode.kind != MatchKind::None {
            return Err(RulesetError::parse(
                source,
                line_no,
                format!("field 'mode': conflicting match mode '{}'", tok),
            ));
        }
        mode.kind = kind;
    }
    Ok(mode)
}

// ============================================================================
// Serializer and diagnostic dump
// ============================================================================

/// Encode a ruleset back into the persistence grammar
///
/// Fields are emitted only when non-default, in a fixed order with `sql`
/// last; placeholder slots are skipped.
pub fn serialize_ruleset(rules: &RuleSet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "version {}", RULESET_VERSION);
    for rule in rules.loaded_rules() {
        let _ = write!(out, "rule {}", rule.rule_no);
        if rule.action != RuleAction::None {
            let _ = write!(out, " action {}", rule.action);
        }
        if rule.adjustment != 0 {
            let _ = write!(out, " adjustment {}", rule.adjustment);
        }
        if !rule.flags.is_empty() {
            let _ = write!(out, " flags {{{}}}", rule.flags);
        }
        if rule.mode != MatchMode::default() {
            let _ = write!(out, " mode {{{}}}", rule.mode);
        }
        if let Some(host) = &rule.origin_host {
            let _ = write!(out, " originHost {}", host);
        }
        if let Some(task) = &rule.origin_task {
            let _ = write!(out, " originTask {}", task);
        }
        if let Some(user) = &rule.user {
            let _ = write!(out, " user {}", user);
        }
        if let Some(fingerprint) = &rule.fingerprint {
            let _ = write!(out, " fingerprint X'{}'", encode_fingerprint_hex(fingerprint));
        }
        if let Some(sql) = &rule.sql {
            let _ = write!(out, " sql {}", sql);
        }
        out.push('\n');
    }
    out
}

/// Write a ruleset to `path` in the persistence grammar
pub fn save_ruleset(path: &Path, rules: &RuleSet) -> Result<()> {
    fs::write(path, serialize_ruleset(rules)).map_err(|source| RulesetError::Io {
        file: path.display().to_string(),
        source,
    })
}

/// Render a human-readable dump for operational inspection
///
/// One line per loaded rule plus a header; not required to round-trip.
pub fn dump_ruleset(rules: &RuleSet) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "ruleset generation {}: {} rules ({} with fingerprints), loaded at {}",
        rules.generation,
        rules.rule_count(),
        rules.fingerprint_count(),
        rules.loaded_at.to_rfc3339()
    );
    for rule in rules.loaded_rules() {
        let _ = write!(
            out,
            "rule #{}: action={}, adjustment={}, flags={{{}}}, mode={{{}}}",
            rule.rule_no, rule.action, rule.adjustment, rule.flags, rule.mode
        );
        if let Some(host) = &rule.origin_host {
            let _ = write!(out, ", originHost={}", host);
        }
        if let Some(task) = &rule.origin_task {
            let _ = write!(out, ", originTask={}", task);
        }
        if let Some(user) = &rule.user {
            let _ = write!(out, ", user={}", user);
        }
        if let Some(fingerprint) = &rule.fingerprint {
            let _ = write!(out, ", fingerprint={}", encode_fingerprint_hex(fingerprint));
        }
        if let Some(sql) = &rule.sql {
            let _ = write!(out, ", sql={}", sql);
        }
        out.push('\n');
    }
    out
}

// ============================================================================
// Fingerprint hex helpers
// ============================================================================

/// Encode a fingerprint as 32 uppercase hex digits
pub fn encode_fingerprint_hex(fingerprint: &Fingerprint) -> String {
    let mut out = String::with_capacity(FINGERPRINT_LEN * 2);
    for byte in fingerprint {
        // Writing to a String buffer is infallible
        let _ = write!(out, "{:02X}", byte);
    }
    out
}

/// Decode exactly 32 hex digits into a fingerprint
pub fn decode_fingerprint_hex(hex: &str) -> Option<Fingerprint> {
    let bytes = hex.as_bytes();
    if bytes.len() != FINGERPRINT_LEN * 2 {
        return None;
    }
    let mut out = [0u8; FINGERPRINT_LEN];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out[i] = (hi * 16 + lo) as u8;
    }
    Some(out)
}

/// Parse an `X'...'` blob literal into a fingerprint
fn parse_fingerprint_literal(tok: &str) -> Option<Fingerprint> {
    let inner = tok
        .strip_prefix("X'")
        .or_else(|| tok.strip_prefix("x'"))?
        .strip_suffix('\'')?;
    decode_fingerprint_hex(inner)
}

/// Whitespace tokenizer that can hand back the untouched rest of a line
struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Cursor<'a> {
        Cursor { rest: line }
    }

    fn next_token(&mut self) -> Option<&'a str> {
        self.rest = self.rest.trim_start();
        if self.rest.is_empty() {
            return None;
        }
        let end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        let (token, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(token)
    }

    fn rest_of_line(&mut self) -> &'a str {
        let out = self.rest.trim();
        self.rest = "";
        out
    }
}
