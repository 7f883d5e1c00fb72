// ============================================================================
// spark-observables - Errors
// Contract violations and unsupported operations
// ============================================================================

use super::types::ObservableId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, ObservableError>;

/// Everything that can go wrong when using an observable.
///
/// Only [`ObservableError::Unsupported`] is ever returned as a value. The
/// other variants describe caller bugs or internal defects and are raised
/// as panics (see [`fail`]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObservableError {
    /// State was read or written from outside the owning realm
    #[error("observable accessed outside of its realm `{realm}`")]
    WrongRealm { realm: String },

    /// State was read or written after dispose
    #[error("observable {0} has been disposed")]
    Disposed(ObservableId),

    /// Mutation on an observable that does not support it
    #[error("`{0}` is not supported by this observable")]
    Unsupported(&'static str),

    /// Two observables that must share a realm do not
    #[error("{context}: observables belong to different realms")]
    RealmMismatch { context: &'static str },

    /// The second map of a composite added or removed a key nobody asked for
    #[error("second map reported an unexpected {kind} of intermediate value {value}")]
    UnexpectedRangeChange { kind: &'static str, value: String },

    /// An intermediate value was scheduled to enter and leave the range in the same update
    #[error("conflicting range transitions for intermediate value {value}")]
    ConflictingTransition { value: String },

    /// A range transition was never confirmed by the second map
    #[error("range transition for intermediate value {value} was never resolved")]
    UnresolvedTransition { value: String },
}

/// Report a fatal contract violation.
///
/// Logs the error and panics. Nothing in this crate recovers from these.
#[track_caller]
pub(crate) fn fail(err: ObservableError) -> ! {
    tracing::error!(error = %err, "observable contract violated");
    panic!("{err}")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = ObservableError::WrongRealm {
            realm: "ui".to_string(),
        };
        assert_eq!(err.to_string(), "observable accessed outside of its realm `ui`");

        let err = ObservableError::Unsupported("put");
        assert_eq!(err.to_string(), "`put` is not supported by this observable");
    }

    #[test]
    #[should_panic(expected = "never resolved")]
    fn fail_panics_with_message() {
        fail(ObservableError::UnresolvedTransition {
            value: "3".to_string(),
        });
    }
}
