//! Active-ruleset ownership
//!
//! The owner of "the active ruleset" is an explicit, injectable value
//! rather than a process-wide static. Publication is whole-object
//! replacement of an `Arc<RuleSet>`: readers clone the `Arc` and keep
//! evaluating their snapshot even while a newer one is installed, so a
//! superseded ruleset is reclaimed only after the last in-flight
//! evaluation drops its reference.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::loader;
use crate::types::RuleSet;

/// Owner of the active ruleset and its generation counter
#[derive(Default)]
pub struct RulesetContext {
    active: RwLock<Option<Arc<RuleSet>>>,
    generation: AtomicU64,
}

impl RulesetContext {
    /// New context with no active ruleset
    pub fn new() -> RulesetContext {
        RulesetContext::default()
    }

    /// Current active ruleset, if any
    ///
    /// The returned `Arc` stays valid for the whole evaluation even if a
    /// replacement is installed concurrently.
    pub fn current(&self) -> Option<Arc<RuleSet>> {
        self.active.read().clone()
    }

    /// Generation stamp of the most recent (attempted) load
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Atomically publish `rules` as the active ruleset
    pub fn install(&self, rules: RuleSet) -> Arc<RuleSet> {
        let rules = Arc::new(rules);
        *self.active.write() = Some(rules.clone());
        rules
    }

    /// Load a ruleset file and publish it on success
    ///
    /// A failed load consumes a generation number but leaves the
    /// previously active ruleset in effect.
    pub fn load_file(&self, path: &Path) -> Result<Arc<RuleSet>> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let rules = loader::load_ruleset(path, generation)?;
        Ok(self.install(rules))
    }

    /// Drop the active ruleset; in-flight evaluations keep their snapshot
    pub fn clear(&self) {
        *self.active.write() = None;
    }
}
