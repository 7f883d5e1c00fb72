// ============================================================================
// spark-observables - Realms
// Single-owner execution contexts that observable state is confined to
// ============================================================================
//
// Every observable is created against an explicit realm. Reads and writes
// assert they run inside it; listener registration may happen anywhere and
// uses `exec` to push realm-bound follow-up work (index building, hooking)
// back onto the owner.
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::error::{ObservableError, Result, fail};

/// A unit of work queued onto a realm.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to a realm.
pub type RealmRef = Arc<dyn Realm>;

// =============================================================================
// REALM TRAIT
// =============================================================================

/// An affinity domain: the one logical thread allowed to touch an
/// observable's state.
pub trait Realm: Send + Sync + 'static {
    /// True if the caller is running inside this realm.
    fn is_current(&self) -> bool;

    /// Run `task` inside this realm at some later point.
    fn async_exec(&self, task: Task);

    /// Run `task` now if inside the realm, otherwise queue it.
    fn exec(&self, task: Task) {
        if self.is_current() {
            task();
        } else {
            self.async_exec(task);
        }
    }

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        "realm"
    }
}

/// Fails with [`ObservableError::WrongRealm`] unless called inside `realm`.
#[track_caller]
pub fn check_realm(realm: &dyn Realm) {
    if let Err(err) = try_check_realm(realm) {
        fail(err);
    }
}

/// Non-panicking form of [`check_realm`].
pub fn try_check_realm(realm: &dyn Realm) -> Result<()> {
    if realm.is_current() {
        Ok(())
    } else {
        Err(ObservableError::WrongRealm {
            realm: realm.name().to_string(),
        })
    }
}

/// True if both handles point at the same realm instance.
pub fn same_realm(a: &RealmRef, b: &RealmRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// =============================================================================
// THREAD REALM
// =============================================================================

/// A realm owned by the thread that created it.
///
/// Work queued from other threads waits until the owner calls
/// [`ThreadRealm::run_pending`].
///
/// # Example
///
/// ```
/// use spark_observables::{Realm, ThreadRealm};
///
/// let realm = ThreadRealm::new();
/// assert!(realm.is_current());
///
/// let remote = realm.clone();
/// std::thread::spawn(move || assert!(!remote.is_current()))
///     .join()
///     .unwrap();
/// ```
pub struct ThreadRealm {
    name: String,
    owner: ThreadId,
    queue: Mutex<VecDeque<Task>>,
}

impl ThreadRealm {
    /// Create a realm owned by the current thread.
    pub fn new() -> Arc<Self> {
        let name = thread::current()
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", thread::current().id()));
        Self::named(name)
    }

    /// Create a named realm owned by the current thread.
    pub fn named(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            owner: thread::current().id(),
            queue: Mutex::new(VecDeque::new()),
        })
    }

    /// The owning thread
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Number of queued tasks
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run queued tasks in FIFO order until the queue is empty.
    ///
    /// Tasks queued while draining run in the same call. Returns how many
    /// tasks ran. Must be called from the owning thread.
    #[track_caller]
    pub fn run_pending(&self) -> usize {
        check_realm(self);
        let mut ran = 0;
        loop {
            // Pop under the lock, run outside it: tasks may queue more work
            let next = self.queue.lock().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }
}

impl Realm for ThreadRealm {
    fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn async_exec(&self, task: Task) {
        tracing::debug!(realm = %self.name, "queued task for realm");
        self.queue.lock().push_back(task);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ThreadRealm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadRealm")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("pending", &self.pending())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
