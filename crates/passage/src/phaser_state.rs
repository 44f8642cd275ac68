//! Per-run execution bookkeeping.
//!
//! One [`PhaserState`] is created per top-level pipeline invocation and
//! threaded through every phase. It records which named phases have executed
//! and which sticky postconditions currently apply. The state is clonable so
//! parallel branches of execution can each own an independent copy, and
//! type-reshapeable so validator context is reset when the pipeline's data
//! shape changes.

use std::fmt;

use indexmap::IndexSet;

use crate::{phase::PhaseName, validation::AnyChecker};

pub struct PhaserState<C> {
    /// Names of phases that have already executed in this run, in execution
    /// order.
    pub already_done: IndexSet<PhaseName>,
    /// Nesting depth of the currently running phase; used only for report
    /// indentation, never for control flow.
    pub depth: usize,
    sticky_postconditions: Vec<AnyChecker<C>>,
}

impl<C> PhaserState<C> {
    pub fn new() -> Self {
        Self {
            already_done: IndexSet::new(),
            depth: 0,
            sticky_postconditions: Vec::new(),
        }
    }

    /// An equivalent state for a new data shape.
    ///
    /// Completed-phase history and depth are preserved; sticky postconditions
    /// were defined over the old shape and are discarded.
    #[must_use]
    pub fn change_type(&self) -> Self {
        Self {
            already_done: self.already_done.clone(),
            depth: self.depth,
            sticky_postconditions: Vec::new(),
        }
    }

    /// Registers a sticky postcondition for every phase that runs from here
    /// on. Re-registering the same checker is a no-op.
    pub fn push_sticky(&mut self, checker: AnyChecker<C>) {
        let already_present = self
            .sticky_postconditions
            .iter()
            .any(|existing| existing.same_checker(&checker));
        if !already_present {
            self.sticky_postconditions.push(checker);
        }
    }

    /// Sticky postconditions currently in force, in registration order.
    pub fn sticky_postconditions(&self) -> &[AnyChecker<C>] {
        &self.sticky_postconditions
    }

    /// Merges another state's completed-phase history into this one. Used by
    /// the per-file fan-out to reconcile worker bookkeeping.
    pub fn merge_done(&mut self, other: &Self) {
        for name in &other.already_done {
            self.already_done.insert(name.clone());
        }
    }
}

impl<C> Default for PhaserState<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for PhaserState<C> {
    /// An independent copy with the same contents; mutating the copy never
    /// affects the original.
    fn clone(&self) -> Self {
        Self {
            already_done: self.already_done.clone(),
            depth: self.depth,
            sticky_postconditions: self.sticky_postconditions.clone(),
        }
    }
}

impl<C> fmt::Debug for PhaserState<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaserState")
            .field("already_done", &self.already_done)
            .field("depth", &self.depth)
            .field("sticky_postconditions", &self.sticky_postconditions.len())
            .finish()
    }
}
