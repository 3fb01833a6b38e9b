//! Match-mode resolver and string comparators
//!
//! Maps a rule's `MatchMode` to a comparator of (subject, pattern). The
//! comparator type is a plain function pointer so tests and administrative
//! tools can inject one, overriding the rule's own mode.
//!
//! Regular expressions are compiled freshly per match attempt; a compile
//! failure is logged and reported as `StringMatch::Error`, which callers
//! fold into "not matched" so a single bad pattern cannot take the whole
//! evaluation pass down.

use regex::RegexBuilder;

use crate::types::{MatchKind, MatchMode};

/// Tri-state outcome of a single string comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMatch {
    /// Subject matched the pattern
    Matched,
    /// Subject did not match the pattern
    NotMatched,
    /// The pattern engine failed (e.g. invalid regular expression)
    Error,
}

impl StringMatch {
    /// Boolean adapter: an `Error` outcome counts as not matched
    pub fn is_match(self) -> bool {
        self == StringMatch::Matched
    }
}

/// String comparator of (subject, pattern)
pub type StrComparator = fn(&str, &str) -> StringMatch;

/// Binary comparator of (subject, pattern), true on equality
pub type MemComparator = fn(&[u8], &[u8]) -> bool;

/// Resolve the comparator for `mode`, or `None` if the mode performs no
/// matching (rules with string criteria are then not evaluable)
pub fn comparator_for_mode(mode: MatchMode) -> Option<StrComparator> {
    match mode.kind {
        MatchKind::None => None,
        MatchKind::Exact => Some(if mode.no_case {
            exact_nocase_match
        } else {
            exact_match
        }),
        MatchKind::Glob => Some(if mode.no_case {
            glob_nocase_match
        } else {
            glob_match
        }),
        MatchKind::Regexp => Some(if mode.no_case {
            regexp_nocase_match
        } else {
            regexp_match
        }),
    }
}

/// Default binary comparator: byte-exact equality
pub fn memory_compare(subject: &[u8], pattern: &[u8]) -> bool {
    subject == pattern
}

fn exact_match(subject: &str, pattern: &str) -> StringMatch {
    bool_match(subject == pattern)
}

fn exact_nocase_match(subject: &str, pattern: &str) -> StringMatch {
    bool_match(subject.eq_ignore_ascii_case(pattern))
}

fn glob_match(subject: &str, pattern: &str) -> StringMatch {
    let pat: Vec<char> = pattern.chars().collect();
    let sub: Vec<char> = subject.chars().collect();
    bool_match(glob(&pat, &sub, false))
}

fn glob_nocase_match(subject: &str, pattern: &str) -> StringMatch {
    let pat: Vec<char> = pattern.chars().collect();
    let sub: Vec<char> = subject.chars().collect();
    bool_match(glob(&pat, &sub, true))
}

fn regexp_match(subject: &str, pattern: &str) -> StringMatch {
    do_regexp_match(subject, pattern, false)
}

fn regexp_nocase_match(subject: &str, pattern: &str) -> StringMatch {
    do_regexp_match(subject, pattern, true)
}

fn bool_match(matched: bool) -> StringMatch {
    if matched {
        StringMatch::Matched
    } else {
        StringMatch::NotMatched
    }
}

fn do_regexp_match(subject: &str, pattern: &str, no_case: bool) -> StringMatch {
    let re = match RegexBuilder::new(pattern).case_insensitive(no_case).build() {
        Ok(re) => re,
        Err(err) => {
            tracing::error!(
                "cannot compile regular expression \"{}\": {}",
                pattern,
                err
            );
            return StringMatch::Error;
        },
    };
    bool_match(re.is_match(subject))
}

fn fold(c: char, no_case: bool) -> char {
    if no_case {
        c.to_ascii_lowercase()
    } else {
        c
    }
}

/// Shell-style wildcard match: `*` any run, `?` one char, `[...]` classes
/// with `-` ranges and leading `^` negation; a `]` directly after the
/// opening bracket (or the negation) is a literal. An unterminated class
/// never matches.
fn glob(pat: &[char], sub: &[char], no_case: bool) -> bool {
    let mut p = 0;
    let mut s = 0;
    while p < pat.len() {
        match pat[p] {
            '*' => {
                // Collapse consecutive stars, then try every suffix
                while p + 1 < pat.len() && pat[p + 1] == '*' {
                    p += 1;
                }
                if p + 1 == pat.len() {
                    return true;
                }
                let rest = &pat[p + 1..];
                for start in s..=sub.len() {
                    if glob(rest, &sub[start..], no_case) {
                        return true;
                    }
                }
                return false;
            },
            '?' => {
                if s >= sub.len() {
                    return false;
                }
                p += 1;
                s += 1;
            },
            '[' => {
                if s >= sub.len() {
                    return false;
                }
                match match_class(&pat[p..], sub[s], no_case) {
                    Some(consumed) => {
                        p += consumed;
                        s += 1;
                    },
                    None => return false,
                }
            },
            c => {
                if s >= sub.len() || fold(sub[s], no_case) != fold(c, no_case) {
                    return false;
                }
                p += 1;
                s += 1;
            },
        }
    }
    s == sub.len()
}

/// Match `c` against the class starting at `pat[0] == '['`
///
/// Returns how many pattern chars the class occupies on success, `None`
/// when `c` is not in the class or the class is malformed.
fn match_class(pat: &[char], c: char, no_case: bool) -> Option<usize> {
    debug_assert_eq!(pat[0], '[');
    let mut i = 1;
    let mut negate = false;
    if i < pat.len() && pat[i] == '^' {
        negate = true;
        i += 1;
    }
    let c = fold(c, no_case);
    let mut matched = false;
    let mut first = true;
    while i < pat.len() {
        let pc = pat[i];
        if pc == ']' && !first {
            return if matched != negate { Some(i + 1) } else { None };
        }
        first = false;
        if i + 2 < pat.len() && pat[i + 1] == '-' && pat[i + 2] != ']' {
            let lo = fold(pc, no_case);
            let hi = fold(pat[i + 2], no_case);
            if lo <= c && c <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if fold(pc, no_case) == c {
                matched = true;
            }
            i += 1;
        }
    }
    // Unterminated class
    None
}
