// ============================================================================
// spark-observables - SetDiff / ValueDiff
// Transitions of observable sets and single values
// ============================================================================

use std::collections::HashSet;
use std::fmt;

use crate::core::types::Element;

// =============================================================================
// SET DIFF
// =============================================================================

/// Elements added to and removed from a set in one transition.
///
/// Additions and removals are disjoint.
#[derive(Clone, PartialEq, Eq)]
pub struct SetDiff<T: Element> {
    additions: HashSet<T>,
    removals: HashSet<T>,
}

impl<T: Element> SetDiff<T> {
    /// Build a diff from its parts.
    pub fn new(additions: HashSet<T>, removals: HashSet<T>) -> Self {
        debug_assert!(
            additions.is_disjoint(&removals),
            "SetDiff additions and removals overlap"
        );
        Self {
            additions,
            removals,
        }
    }

    /// A diff with no elements
    pub fn empty() -> Self {
        Self::new(HashSet::new(), HashSet::new())
    }

    /// The diff that turns `old` into `new`.
    pub fn compute(old: &HashSet<T>, new: &HashSet<T>) -> Self {
        Self {
            additions: new.difference(old).cloned().collect(),
            removals: old.difference(new).cloned().collect(),
        }
    }

    /// Elements present after but not before
    pub fn additions(&self) -> &HashSet<T> {
        &self.additions
    }

    /// Elements present before but not after
    pub fn removals(&self) -> &HashSet<T> {
        &self.removals
    }

    /// True if nothing was added or removed
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    /// Apply this diff to `set` in place.
    pub fn apply_to(&self, set: &mut HashSet<T>) {
        for element in &self.removals {
            set.remove(element);
        }
        set.extend(self.additions.iter().cloned());
    }
}

impl<T: Element> Default for SetDiff<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Element> fmt::Debug for SetDiff<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetDiff")
            .field("additions", &self.additions)
            .field("removals", &self.removals)
            .finish()
    }
}

// =============================================================================
// VALUE DIFF
// =============================================================================

/// A single value replaced by another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDiff<T> {
    old: T,
    new: T,
}

impl<T> ValueDiff<T> {
    pub fn new(old: T, new: T) -> Self {
        Self { old, new }
    }

    /// The value before the transition
    pub fn old_value(&self) -> &T {
        &self.old
    }

    /// The value after the transition
    pub fn new_value(&self) -> &T {
        &self.new
    }
}

// =============================================================================
// TESTS
// =============================================================================
