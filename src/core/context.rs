// ============================================================================
// spark-observables - Tracking Context
// Thread-local state recording which observables are read
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::sync::Arc;

use super::types::{Observable, ObservableId};

// =============================================================================
// READ FRAME
// =============================================================================

/// Reads collected by one `observe_reads` call.
#[derive(Default)]
pub struct ReadFrame {
    seen: HashSet<ObservableId>,
    reads: Vec<Arc<dyn Observable>>,
}

impl ReadFrame {
    /// Record a read, ignoring repeats of the same observable.
    pub fn record(&mut self, source: Arc<dyn Observable>) {
        if self.seen.insert(source.id()) {
            self.reads.push(source);
        }
    }

    /// Observables read, in first-read order
    pub fn into_reads(self) -> Vec<Arc<dyn Observable>> {
        self.reads
    }
}

// =============================================================================
// TRACKING CONTEXT
// =============================================================================

/// Thread-local context for dependency tracking.
///
/// Each `observe_reads` call pushes a frame; every getter reports into the
/// innermost frame while tracking is on.
pub struct TrackingContext {
    /// Open frames, innermost last
    pub frames: RefCell<Vec<ReadFrame>>,

    /// Whether reads are currently ignored
    pub untracking: Cell<bool>,
}

impl TrackingContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self {
            frames: RefCell::new(Vec::new()),
            untracking: Cell::new(false),
        }
    }

    /// Open a new frame
    pub fn push_frame(&self) {
        self.frames.borrow_mut().push(ReadFrame::default());
    }

    /// Close the innermost frame, returning what it collected
    pub fn pop_frame(&self) -> Option<ReadFrame> {
        self.frames.borrow_mut().pop()
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Set untracking mode, returning previous value
    pub fn set_untracking(&self, value: bool) -> bool {
        self.untracking.replace(value)
    }

    /// Check if currently untracking
    pub fn is_untracking(&self) -> bool {
        self.untracking.get()
    }

    /// True if a frame is open and reads are not suppressed
    pub fn is_tracking(&self) -> bool {
        !self.untracking.get() && !self.frames.borrow().is_empty()
    }

    /// Record a read into the innermost frame
    pub fn record(&self, source: Arc<dyn Observable>) {
        if let Some(frame) = self.frames.borrow_mut().last_mut() {
            frame.record(source);
        }
    }
}

impl Default for TrackingContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    /// The thread-local tracking context
    static CONTEXT: TrackingContext = TrackingContext::new();
}

/// Access the thread-local tracking context.
pub fn with_context<R>(f: impl FnOnce(&TrackingContext) -> R) -> R {
    CONTEXT.with(f)
}

/// Check if reads are currently being recorded on this thread
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.is_tracking())
}

/// Check if currently untracking
pub fn is_untracking() -> bool {
    with_context(|ctx| ctx.is_untracking())
}

// =============================================================================
// TESTS
// =============================================================================
