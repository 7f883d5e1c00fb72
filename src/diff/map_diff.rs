// ============================================================================
// spark-observables - MapDiff
// Immutable description of one map transition
// ============================================================================

use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::types::Element;

// =============================================================================
// MAP DIFF
// =============================================================================

/// Added, removed and changed keys between two states of a map.
///
/// A key is in at most one of the three sets. Old values exist for removed
/// and changed keys, new values for added and changed keys; asking for any
/// other combination returns `None`.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use spark_observables::MapDiff;
///
/// let before = HashMap::from([("a", 1), ("b", 2)]);
/// let after = HashMap::from([("a", 1), ("b", 3), ("c", 4)]);
///
/// let diff = MapDiff::compute(&before, &after);
/// assert!(diff.changed_keys().contains("b"));
/// assert!(diff.added_keys().contains("c"));
///
/// let mut replay = before.clone();
/// diff.apply_to(&mut replay);
/// assert_eq!(replay, after);
/// ```
#[derive(Clone)]
pub struct MapDiff<K, V> {
    added: HashSet<K>,
    removed: HashSet<K>,
    changed: HashSet<K>,
    old_values: HashMap<K, V>,
    new_values: HashMap<K, V>,
}

impl<K: Element, V: Element> MapDiff<K, V> {
    /// Build a diff from its parts.
    ///
    /// The key sets must be pairwise disjoint and every key must carry the
    /// values its set implies; violations are caught in debug builds.
    pub fn new(
        added: HashSet<K>,
        removed: HashSet<K>,
        changed: HashSet<K>,
        old_values: HashMap<K, V>,
        new_values: HashMap<K, V>,
    ) -> Self {
        let diff = Self {
            added,
            removed,
            changed,
            old_values,
            new_values,
        };
        debug_assert!(diff.is_disjoint(), "MapDiff key sets overlap: {diff}");
        debug_assert!(
            diff.added.iter().all(|k| diff.new_values.contains_key(k))
                && diff.changed.iter().all(|k| {
                    diff.new_values.contains_key(k) && diff.old_values.contains_key(k)
                })
                && diff.removed.iter().all(|k| diff.old_values.contains_key(k)),
            "MapDiff is missing values: {diff}"
        );
        diff
    }

    /// A diff with no keys
    pub fn empty() -> Self {
        Self {
            added: HashSet::new(),
            removed: HashSet::new(),
            changed: HashSet::new(),
            old_values: HashMap::new(),
            new_values: HashMap::new(),
        }
    }

    /// One key added with `value`.
    pub fn single_add(key: K, value: V) -> Self {
        let mut diff = Self::empty();
        diff.new_values.insert(key.clone(), value);
        diff.added.insert(key);
        diff
    }

    /// One key changed from `old` to `new`.
    pub fn single_change(key: K, old: V, new: V) -> Self {
        let mut diff = Self::empty();
        diff.old_values.insert(key.clone(), old);
        diff.new_values.insert(key.clone(), new);
        diff.changed.insert(key);
        diff
    }

    /// One key removed, previously holding `old`.
    pub fn single_remove(key: K, old: V) -> Self {
        let mut diff = Self::empty();
        diff.old_values.insert(key.clone(), old);
        diff.removed.insert(key);
        diff
    }

    /// Every entry of `contents` removed at once.
    pub fn remove_all(contents: HashMap<K, V>) -> Self {
        let removed = contents.keys().cloned().collect();
        Self {
            added: HashSet::new(),
            removed,
            changed: HashSet::new(),
            old_values: contents,
            new_values: HashMap::new(),
        }
    }

    /// The diff that turns `old` into `new`.
    pub fn compute(old: &HashMap<K, V>, new: &HashMap<K, V>) -> Self {
        let mut builder = MapDiffBuilder::new();
        for (key, old_value) in old {
            match new.get(key) {
                Some(new_value) => builder.change(key.clone(), old_value.clone(), new_value.clone()),
                None => builder.remove(key.clone(), old_value.clone()),
            }
        }
        for (key, new_value) in new {
            if !old.contains_key(key) {
                builder.add(key.clone(), new_value.clone());
            }
        }
        builder.build()
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Keys present after but not before
    pub fn added_keys(&self) -> &HashSet<K> {
        &self.added
    }

    /// Keys present before but not after
    pub fn removed_keys(&self) -> &HashSet<K> {
        &self.removed
    }

    /// Keys present in both states with different values
    pub fn changed_keys(&self) -> &HashSet<K> {
        &self.changed
    }

    /// Value before the transition, for removed and changed keys.
    pub fn old_value(&self, key: &K) -> Option<&V> {
        if self.added.contains(key) {
            return None;
        }
        self.old_values.get(key)
    }

    /// Value after the transition, for added and changed keys.
    pub fn new_value(&self, key: &K) -> Option<&V> {
        if self.removed.contains(key) {
            return None;
        }
        self.new_values.get(key)
    }

    /// True if no key is added, removed or changed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// True if the three key sets are pairwise disjoint
    pub fn is_disjoint(&self) -> bool {
        self.added.is_disjoint(&self.removed)
            && self.added.is_disjoint(&self.changed)
            && self.removed.is_disjoint(&self.changed)
    }

    /// Every key this diff mentions
    pub fn affected_keys(&self) -> impl Iterator<Item = &K> {
        self.added
            .iter()
            .chain(self.removed.iter())
            .chain(self.changed.iter())
    }

    // =========================================================================
    // DERIVED VIEWS
    // =========================================================================

    /// Apply this diff to `map` in place.
    ///
    /// Applying the same diff twice to the same base yields the same state.
    pub fn apply_to(&self, map: &mut HashMap<K, V>) {
        for key in &self.removed {
            map.remove(key);
        }
        for key in self.added.iter().chain(self.changed.iter()) {
            if let Some(value) = self.new_values.get(key) {
                map.insert(key.clone(), value.clone());
            }
        }
    }

    /// A read-only view of `base` with this diff applied, computed lazily.
    pub fn simulate_on<'a>(&'a self, base: &'a HashMap<K, V>) -> SimulatedMap<'a, K, V> {
        SimulatedMap { base, diff: self }
    }
}

impl<K: Element, V: Element> PartialEq for MapDiff<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.added == other.added
            && self.removed == other.removed
            && self.changed == other.changed
            && self.affected_keys().all(|k| {
                self.old_value(k) == other.old_value(k) && self.new_value(k) == other.new_value(k)
            })
    }
}

impl<K: Element, V: Element> Eq for MapDiff<K, V> {}

impl<K: Element, V: Element> Default for MapDiff<K, V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K: Element, V: Element> fmt::Display for MapDiff<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MapDiff{{")?;
        let mut first = true;
        let mut entry = |f: &mut fmt::Formatter<'_>, text: String| -> fmt::Result {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{text}")
        };
        for key in &self.added {
            entry(f, format!("added {:?} => {:?}", key, self.new_values.get(key)))?;
        }
        for key in &self.changed {
            entry(
                f,
                format!(
                    "changed {:?}: {:?} -> {:?}",
                    key,
                    self.old_values.get(key),
                    self.new_values.get(key)
                ),
            )?;
        }
        for key in &self.removed {
            entry(f, format!("removed {:?} (was {:?})", key, self.old_values.get(key)))?;
        }
        write!(f, "}}")
    }
}

impl<K: Element, V: Element> fmt::Debug for MapDiff<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// =============================================================================
// MAP DIFF BUILDER
// =============================================================================

enum Pending<V> {
    Added(V),
    Removed(V),
    Changed(V, V),
}

/// Accumulates per-key events into one disjoint `MapDiff`.
///
/// Later events on a key fold into earlier ones: remove then add becomes a
/// change (or nothing, if the value came back), add then remove cancels.
pub struct MapDiffBuilder<K, V> {
    entries: HashMap<K, Pending<V>>,
}

impl<K: Element, V: Element> MapDiffBuilder<K, V> {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Record `key` appearing with `value`.
    pub fn add(&mut self, key: K, value: V) {
        match self.entries.entry(key) {
            MapEntry::Vacant(slot) => {
                slot.insert(Pending::Added(value));
            }
            MapEntry::Occupied(mut slot) => {
                let next = match slot.get() {
                    Pending::Removed(old) if *old == value => None,
                    Pending::Removed(old) => Some(Pending::Changed(old.clone(), value)),
                    Pending::Added(_) => Some(Pending::Added(value)),
                    Pending::Changed(old, _) if *old == value => None,
                    Pending::Changed(old, _) => Some(Pending::Changed(old.clone(), value)),
                };
                match next {
                    Some(next) => {
                        slot.insert(next);
                    }
                    None => {
                        slot.remove();
                    }
                }
            }
        }
    }

    /// Record `key` disappearing, previously holding `old`.
    pub fn remove(&mut self, key: K, old: V) {
        match self.entries.entry(key) {
            MapEntry::Vacant(slot) => {
                slot.insert(Pending::Removed(old));
            }
            MapEntry::Occupied(mut slot) => {
                let next = match slot.get() {
                    Pending::Added(_) => None,
                    Pending::Changed(first, _) => Some(Pending::Removed(first.clone())),
                    Pending::Removed(first) => Some(Pending::Removed(first.clone())),
                };
                match next {
                    Some(next) => {
                        slot.insert(next);
                    }
                    None => {
                        slot.remove();
                    }
                }
            }
        }
    }

    /// Record `key` changing from `old` to `new`. Equal values are ignored.
    pub fn change(&mut self, key: K, old: V, new: V) {
        match self.entries.entry(key) {
            MapEntry::Vacant(slot) => {
                if old != new {
                    slot.insert(Pending::Changed(old, new));
                }
            }
            MapEntry::Occupied(mut slot) => {
                let next = match slot.get() {
                    Pending::Added(_) => Some(Pending::Added(new)),
                    Pending::Changed(first, _) if *first == new => None,
                    Pending::Changed(first, _) | Pending::Removed(first) => {
                        Some(Pending::Changed(first.clone(), new))
                    }
                };
                match next {
                    Some(next) => {
                        slot.insert(next);
                    }
                    None => {
                        slot.remove();
                    }
                }
            }
        }
    }

    /// True if nothing has been recorded (or everything cancelled out)
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Produce the diff.
    pub fn build(self) -> MapDiff<K, V> {
        let mut diff = MapDiff::empty();
        for (key, pending) in self.entries {
            match pending {
                Pending::Added(new) => {
                    diff.new_values.insert(key.clone(), new);
                    diff.added.insert(key);
                }
                Pending::Removed(old) => {
                    diff.old_values.insert(key.clone(), old);
                    diff.removed.insert(key);
                }
                Pending::Changed(old, new) => {
                    diff.old_values.insert(key.clone(), old);
                    diff.new_values.insert(key.clone(), new);
                    diff.changed.insert(key);
                }
            }
        }
        diff
    }
}

impl<K: Element, V: Element> Default for MapDiffBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SIMULATED MAP
// =============================================================================

/// Lazy read-only view of a base map with a diff applied.
///
/// Nothing is copied; every query consults the diff first, then the base.
pub struct SimulatedMap<'a, K, V> {
    base: &'a HashMap<K, V>,
    diff: &'a MapDiff<K, V>,
}

impl<'a, K: Element, V: Element> SimulatedMap<'a, K, V> {
    /// Value for `key` after the diff
    pub fn get(&self, key: &K) -> Option<&'a V> {
        if self.diff.removed.contains(key) {
            return None;
        }
        if self.diff.added.contains(key) || self.diff.changed.contains(key) {
            return self.diff.new_values.get(key);
        }
        self.base.get(key)
    }

    /// True if `key` is present after the diff
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Number of entries after the diff
    pub fn len(&self) -> usize {
        let gained = self
            .diff
            .added
            .iter()
            .filter(|k| !self.base.contains_key(*k))
            .count();
        let lost = self
            .diff
            .removed
            .iter()
            .filter(|k| self.base.contains_key(*k))
            .count();
        self.base.len() + gained - lost
    }

    /// True if no entries remain after the diff
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries after the diff, base order first, then added keys.
    pub fn iter(&self) -> impl Iterator<Item = (&'a K, &'a V)> + '_ {
        let diff = self.diff;
        let base = self.base;
        let kept = base.iter().filter_map(move |(k, v)| {
            if diff.removed.contains(k) {
                None
            } else if diff.changed.contains(k) || diff.added.contains(k) {
                diff.new_values.get_key_value(k)
            } else {
                Some((k, v))
            }
        });
        let fresh = diff
            .added
            .iter()
            .filter(move |k| !base.contains_key(*k))
            .filter_map(move |k| diff.new_values.get_key_value(k));
        kept.chain(fresh)
    }

    /// Materialize the view.
    pub fn to_map(&self) -> HashMap<K, V> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&'static str, i32)]) -> HashMap<&'static str, i32> {
        entries.iter().copied().collect()
    }

    #[test]
    fn single_constructors() {
        let add = MapDiff::single_add("a", 1);
        assert!(add.added_keys().contains("a"));
        assert_eq!(add.new_value(&"a"), Some(&1));
        assert_eq!(add.old_value(&"a"), None);

        let change = MapDiff::single_change("a", 1, 2);
        assert_eq!(change.old_value(&"a"), Some(&1));
        assert_eq!(change.new_value(&"a"), Some(&2));

        let remove = MapDiff::single_remove("a", 2);
        assert_eq!(remove.old_value(&"a"), Some(&2));
        assert_eq!(remove.new_value(&"a"), None);
    }

    #[test]
    fn compute_and_apply() {
        let before = map(&[("a", 1), ("b", 2), ("c", 3)]);
        let after = map(&[("a", 1), ("b", 20), ("d", 4)]);
        let diff = MapDiff::compute(&before, &after);

        assert_eq!(diff.added_keys(), &HashSet::from(["d"]));
        assert_eq!(diff.removed_keys(), &HashSet::from(["c"]));
        assert_eq!(diff.changed_keys(), &HashSet::from(["b"]));
        assert!(diff.is_disjoint());

        let mut replay = before.clone();
        diff.apply_to(&mut replay);
        assert_eq!(replay, after);

        // Reapplying to the same base is idempotent
        let mut again = before.clone();
        diff.apply_to(&mut again);
        diff.apply_to(&mut again);
        assert_eq!(again, after);
    }

    #[test]
    fn unchanged_maps_give_empty_diff() {
        let same = map(&[("a", 1)]);
        assert!(MapDiff::compute(&same, &same).is_empty());
        assert!(MapDiff::<&str, i32>::empty().is_empty());
    }

    #[test]
    fn remove_all_lists_every_key() {
        let diff = MapDiff::remove_all(map(&[("x", 1), ("y", 2)]));
        assert_eq!(diff.removed_keys().len(), 2);
        assert_eq!(diff.old_value(&"y"), Some(&2));
        assert!(diff.added_keys().is_empty());
    }

    #[test]
    fn simulate_on_matches_apply_to() {
        let before = map(&[("a", 1), ("b", 2), ("c", 3)]);
        let after = map(&[("a", 10), ("c", 3), ("e", 5)]);
        let diff = MapDiff::compute(&before, &after);

        let view = diff.simulate_on(&before);
        assert_eq!(view.len(), 3);
        assert_eq!(view.get(&"a"), Some(&10));
        assert_eq!(view.get(&"b"), None);
        assert!(view.contains_key(&"e"));
        assert_eq!(view.to_map(), after);

        // Base untouched
        assert_eq!(before.get("b"), Some(&2));
    }

    #[test]
    fn builder_folds_remove_then_add_into_change() {
        let mut builder = MapDiffBuilder::new();
        builder.remove("k", 1);
        builder.add("k", 2);
        let diff = builder.build();

        assert_eq!(diff.changed_keys(), &HashSet::from(["k"]));
        assert_eq!(diff.old_value(&"k"), Some(&1));
        assert_eq!(diff.new_value(&"k"), Some(&2));
    }

    #[test]
    fn builder_cancels_round_trips() {
        let mut builder = MapDiffBuilder::new();
        builder.remove("k", 1);
        builder.add("k", 1);
        builder.add("j", 5);
        builder.remove("j", 5);
        builder.change("m", 3, 4);
        builder.change("m", 4, 3);
        assert!(builder.is_empty());
        assert!(builder.build().is_empty());
    }

    #[test]
    fn builder_cancels_add_restoring_the_first_value() {
        let mut builder = MapDiffBuilder::new();
        builder.change("k", 1, 2);
        builder.add("k", 1);
        builder.change("j", 1, 2);
        builder.add("j", 3);
        let diff = builder.build();

        assert!(!diff.changed_keys().contains(&"k"));
        assert_eq!(diff.old_value(&"k"), None);
        assert_eq!(diff.changed_keys(), &HashSet::from(["j"]));
        assert_eq!(diff.new_value(&"j"), Some(&3));
    }

    #[test]
    fn builder_keeps_first_old_value() {
        let mut builder = MapDiffBuilder::new();
        builder.change("k", 1, 2);
        builder.change("k", 2, 3);
        builder.remove("k", 3);
        let diff = builder.build();

        assert_eq!(diff.removed_keys(), &HashSet::from(["k"]));
        assert_eq!(diff.old_value(&"k"), Some(&1));
    }

    #[test]
    fn display_mentions_every_key() {
        let diff = MapDiff::single_change("k", 1, 2);
        let text = diff.to_string();
        assert!(text.contains("changed \"k\""));
        assert!(text.contains("Some(1) -> Some(2)"));
    }

    #[test]
    fn equality_ignores_unrelated_values() {
        let a = MapDiff::single_add("a", 1);
        let b = MapDiff::single_add("a", 1);
        let c = MapDiff::single_add("a", 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
