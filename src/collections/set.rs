// ============================================================================
// spark-observables - WritableSet
// A HashSet that fires exactly one diff per mutating call
// ============================================================================

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::collections::traits::ObservableSet;
use crate::core::error::Result;
use crate::core::realm::RealmRef;
use crate::core::types::{DiffCallback, Element, ListenerId, Observable, TypeTag};
use crate::diff::SetDiff;
use crate::reactivity::listeners::{EventKind, Listener};
use crate::reactivity::observable::{ObservableCore, ObservableImpl};

/// Options for creating a writable set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Reported by `element_type()`
    pub element_type: Option<TypeTag>,
}

// =============================================================================
// WRITABLE SET
// =============================================================================

/// An observable set backed by a plain `HashSet`.
///
/// `add_and_remove` applies both halves as one change, which is how the
/// composite map moves intermediate values in and out of its range set.
pub struct WritableSet<T: Element> {
    core: ObservableCore<SetDiff<T>>,
    elements: Mutex<HashSet<T>>,
    element_type: Option<TypeTag>,
}

impl<T: Element> WritableSet<T> {
    /// Create an empty set confined to `realm`.
    pub fn new(realm: RealmRef) -> Arc<Self> {
        Self::with_options(realm, HashSet::new(), SetOptions::default())
    }

    /// Create a set holding `elements`.
    pub fn with_elements(realm: RealmRef, elements: HashSet<T>) -> Arc<Self> {
        Self::with_options(realm, elements, SetOptions::default())
    }

    pub fn with_options(realm: RealmRef, elements: HashSet<T>, options: SetOptions) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let owner: Weak<dyn Observable> = me.clone();
            Self {
                core: ObservableCore::new(realm, owner),
                elements: Mutex::new(elements),
                element_type: options.element_type,
            }
        })
    }

    /// Mark the contents stale (or fresh).
    pub fn set_stale(&self, stale: bool) {
        self.core.set_stale(stale);
    }

    fn fire(&self, diff: SetDiff<T>) -> bool {
        if diff.is_empty() {
            return false;
        }
        tracing::trace!(observable = %self.core.id(), ?diff, "writable set changed");
        self.core.fire_diff(diff);
        true
    }
}

impl<T: Element> ObservableImpl for WritableSet<T> {
    type Diff = SetDiff<T>;

    fn core(&self) -> &ObservableCore<SetDiff<T>> {
        &self.core
    }
}

impl<T: Element> ObservableSet<T> for WritableSet<T> {
    fn add_set_change_listener(&self, listener: DiffCallback<SetDiff<T>>) -> ListenerId {
        self.add_listener(Listener::Diff(listener))
    }

    fn remove_set_change_listener(&self, id: ListenerId) -> bool {
        self.remove_listener(EventKind::Diff, id)
    }

    fn element_type(&self) -> Option<TypeTag> {
        self.element_type
    }

    fn len(&self) -> usize {
        self.core.getter_called();
        self.elements.lock().len()
    }

    fn contains(&self, element: &T) -> bool {
        self.core.getter_called();
        self.elements.lock().contains(element)
    }

    fn elements(&self) -> HashSet<T> {
        self.core.getter_called();
        self.elements.lock().clone()
    }

    fn add(&self, element: T) -> Result<bool> {
        self.core.check_realm();
        let inserted = self.elements.lock().insert(element.clone());
        if inserted {
            self.fire(SetDiff::new(HashSet::from([element]), HashSet::new()));
        }
        Ok(inserted)
    }

    fn remove(&self, element: &T) -> Result<bool> {
        self.core.check_realm();
        // Report the stored element, which may be a distinct but equal instance
        let removed = self.elements.lock().take(element);
        let found = removed.is_some();
        if let Some(stored) = removed {
            self.fire(SetDiff::new(HashSet::new(), HashSet::from([stored])));
        }
        Ok(found)
    }

    fn clear(&self) -> Result<()> {
        self.core.check_realm();
        let removed = std::mem::take(&mut *self.elements.lock());
        self.fire(SetDiff::new(HashSet::new(), removed));
        Ok(())
    }

    fn add_all(&self, elements: Vec<T>) -> Result<bool> {
        self.core.check_realm();
        let added: HashSet<T> = {
            let mut current = self.elements.lock();
            elements
                .into_iter()
                .filter(|e| current.insert(e.clone()))
                .collect()
        };
        Ok(self.fire(SetDiff::new(added, HashSet::new())))
    }

    fn remove_all(&self, elements: Vec<T>) -> Result<bool> {
        self.core.check_realm();
        let removed: HashSet<T> = {
            let mut current = self.elements.lock();
            elements.iter().filter_map(|e| current.take(e)).collect()
        };
        Ok(self.fire(SetDiff::new(HashSet::new(), removed)))
    }

    fn add_and_remove(&self, additions: HashSet<T>, removals: HashSet<T>) -> Result<()> {
        self.core.check_realm();
        let diff = {
            let mut current = self.elements.lock();
            let before = current.clone();
            for element in &removals {
                current.remove(element);
            }
            current.extend(additions);
            SetDiff::compute(&before, &current)
        };
        self.fire(diff);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realm::ThreadRealm;

    fn recorded(set: &WritableSet<i32>) -> Arc<parking_lot::Mutex<Vec<SetDiff<i32>>>> {
        let log: Arc<parking_lot::Mutex<Vec<SetDiff<i32>>>> = Arc::default();
        let sink = log.clone();
        set.add_set_change_listener(Arc::new(move |d: &SetDiff<i32>| sink.lock().push(d.clone())));
        log
    }

    #[test]
    fn add_and_remove_single_elements() {
        let set = WritableSet::new(ThreadRealm::new());
        let log = recorded(&set);

        assert!(set.add(1).unwrap());
        assert!(!set.add(1).unwrap());
        assert!(set.remove(&1).unwrap());
        assert!(!set.remove(&1).unwrap());

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].additions(), &HashSet::from([1]));
        assert_eq!(log[1].removals(), &HashSet::from([1]));
    }

    #[test]
    fn bulk_operations_fire_once() {
        let set = WritableSet::with_elements(ThreadRealm::new(), HashSet::from([1, 2]));
        let log = recorded(&set);

        assert!(set.add_all(vec![2, 3, 4]).unwrap());
        assert!(!set.remove_all(vec![9]).unwrap());
        set.clear().unwrap();

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].additions(), &HashSet::from([3, 4]));
        assert_eq!(log[1].removals(), &HashSet::from([1, 2, 3, 4]));
    }

    #[test]
    fn add_and_remove_is_one_change() {
        let set = WritableSet::with_elements(ThreadRealm::new(), HashSet::from([1, 2]));
        let log = recorded(&set);

        set.add_and_remove(HashSet::from([3]), HashSet::from([1]))
            .unwrap();

        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].additions(), &HashSet::from([3]));
        assert_eq!(log[0].removals(), &HashSet::from([1]));
        assert_eq!(set.elements(), HashSet::from([2, 3]));
    }

    #[test]
    fn add_and_remove_of_same_element_nets_out() {
        let set = WritableSet::with_elements(ThreadRealm::new(), HashSet::from([1]));
        let log = recorded(&set);

        set.add_and_remove(HashSet::from([1]), HashSet::from([1]))
            .unwrap();

        assert!(log.lock().is_empty());
        assert!(set.contains(&1));
    }

    #[test]
    fn removals_report_the_stored_element() {
        let stored = Arc::new(String::from("key"));
        let set = WritableSet::with_elements(ThreadRealm::new(), HashSet::from([stored.clone()]));
        let log: Arc<parking_lot::Mutex<Vec<SetDiff<Arc<String>>>>> = Arc::default();
        let sink = log.clone();
        set.add_set_change_listener(Arc::new(move |d: &SetDiff<Arc<String>>| {
            sink.lock().push(d.clone())
        }));

        let lookalike = Arc::new(String::from("key"));
        assert!(set.remove(&lookalike).unwrap());

        let log = log.lock();
        let removed = log[0].removals().iter().next().cloned().unwrap();
        assert!(Arc::ptr_eq(&removed, &stored));
        assert!(!Arc::ptr_eq(&removed, &lookalike));
    }
}
