//! Request priority arithmetic
//!
//! Priorities are plain integers where numerically lower values are more
//! urgent: `HIGHEST < DEFAULT < LOWEST`. The external work queue consumes
//! these values directly, so rule-driven adjustments must stay inside the
//! `[HIGHEST, LOWEST]` band for them to compose with the queue's own
//! head/tail sentinel placements.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::RuleAction;

/// Scheduling priority of one request
///
/// Lower numeric value means higher urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i64);

impl Priority {
    /// Most urgent priority a rule can produce
    pub const HIGHEST: Priority = Priority(0);

    /// Least urgent priority a rule can produce
    pub const LOWEST: Priority = Priority(10_000);

    /// Neutral starting priority for a fresh evaluation result
    pub const DEFAULT: Priority = Priority(5_000);

    /// Unconditional front-of-queue insertion, synonym for `HIGHEST`
    pub const HEAD: Priority = Priority::HIGHEST;

    /// Unconditional back-of-queue insertion, synonym for `LOWEST`
    pub const TAIL: Priority = Priority::LOWEST;

    /// Raw numeric value
    pub fn value(self) -> i64 {
        self.0
    }

    /// Bound this priority to `[HIGHEST, LOWEST]`
    pub fn clamp(self) -> Priority {
        if self < Priority::HIGHEST {
            return Priority::HIGHEST;
        }
        if self > Priority::LOWEST {
            return Priority::LOWEST;
        }
        self
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::DEFAULT
    }
}

/// Apply a rule's priority action to `priority`
///
/// `adjustment` is an unsigned magnitude; `RaisePriority` moves the value
/// numerically downward (more urgent), `LowerPriority` upward. Any other
/// action leaves the priority untouched. The result is always clamped.
pub fn adjust(action: RuleAction, priority: Priority, adjustment: u32) -> Priority {
    let delta = match action {
        RuleAction::RaisePriority => -i64::from(adjustment),
        RuleAction::LowerPriority => i64::from(adjustment),
        _ => return priority,
    };
    Priority(priority.0.saturating_add(delta)).clamp()
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Priority::HIGHEST => write!(f, "HIGHEST"),
            Priority::LOWEST => write!(f, "LOWEST"),
            Priority::DEFAULT => write!(f, "DEFAULT"),
            Priority(value) => write!(f, "{}", value),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("HIGHEST") || s.eq_ignore_ascii_case("HEAD") {
            return Ok(Priority::HIGHEST);
        }
        if s.eq_ignore_ascii_case("LOWEST") || s.eq_ignore_ascii_case("TAIL") {
            return Ok(Priority::LOWEST);
        }
        if s.eq_ignore_ascii_case("DEFAULT") {
            return Ok(Priority::DEFAULT);
        }
        s.parse::<i64>()
            .map(Priority)
            .map_err(|_| format!("invalid priority '{}'", s))
    }
}
