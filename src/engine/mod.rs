//! The delta engine: `compute_delta` and `apply_delta`, plus the comparison
//! context the diff side threads through its recursive walk.

mod apply;
mod diff;

pub use apply::apply_delta;
pub use diff::compute_delta;

use std::collections::HashMap;

use crate::config::CompareOptions;
use crate::error::EngineError;

/// Per-call scratch state for a `compute_delta` invocation: the recursion
/// budget counter and the cycle-tracking visited-pair map. Distinct calls
/// never share a context, so concurrent calls never contend on anything.
pub(crate) struct CompareContext<'a> {
    pub(crate) options: &'a CompareOptions,
    depth: u32,
    visited: HashMap<(usize, usize), ()>,
    reentry_origin: HashMap<usize, usize>,
}

impl<'a> CompareContext<'a> {
    pub(crate) fn new(options: &'a CompareOptions) -> Self {
        Self {
            options,
            depth: 0,
            visited: HashMap::new(),
            reentry_origin: HashMap::new(),
        }
    }

    /// Enter one level of recursion, failing if the budget is exhausted.
    fn enter(&mut self) -> Result<(), EngineError> {
        self.depth += 1;
        if self.depth > self.options.recursion_budget {
            return Err(EngineError::BudgetExceeded { depth: self.depth });
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    /// Record a `(left, right)` address pair visit. Returns `true` if this
    /// exact pair was already visited (the subtree is assumed equal along
    /// that back-edge and must not be walked again). A left address
    /// re-observed paired with a *different* right address is logged but
    /// not suppressed - the recursive walk that follows naturally emits
    /// whatever difference caused the re-entry.
    fn enter_pair(&mut self, left_addr: usize, right_addr: usize) -> bool {
        if !self.options.track_cycles {
            return false;
        }
        if self.visited.contains_key(&(left_addr, right_addr)) {
            return true;
        }
        self.visited.insert((left_addr, right_addr), ());
        match self.reentry_origin.get(&left_addr) {
            Some(&prev_right) if prev_right != right_addr => {
                tracing::debug!(
                    left_addr,
                    right_addr,
                    prev_right,
                    "cycle re-entry observed a different pairing"
                );
            }
            None => {
                self.reentry_origin.insert(left_addr, right_addr);
            }
            _ => {}
        }
        false
    }

    /// Snapshot the cycle-tracking maps so a speculative probe (e.g.
    /// `diff::elements_equal`'s equality check) can run a real `diff_record`
    /// call and then have its visited-pair bookkeeping discarded - only
    /// genuine, non-probe recursion should leave a mark here.
    pub(crate) fn snapshot_cycle_state(&self) -> (HashMap<(usize, usize), ()>, HashMap<usize, usize>) {
        (self.visited.clone(), self.reentry_origin.clone())
    }

    /// Restore cycle-tracking state captured by `snapshot_cycle_state`,
    /// discarding whatever a probe recorded in the meantime.
    pub(crate) fn restore_cycle_state(&mut self, snapshot: (HashMap<(usize, usize), ()>, HashMap<usize, usize>)) {
        self.visited = snapshot.0;
        self.reentry_origin = snapshot.1;
    }
}
