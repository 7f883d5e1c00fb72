// ============================================================================
// spark-observables - Equality Functions
// Decide whether a write actually changed a stored value
// ============================================================================

/// Equality function type for comparing stored values
pub type EqualsFn<T> = fn(&T, &T) -> bool;

// =============================================================================
// STRICT EQUALITY (Default)
// =============================================================================

/// Default equality using PartialEq.
///
/// A `put` of a value equal to the stored one fires no diff.
///
/// # Example
/// ```
/// use spark_observables::reactivity::equality::equals;
///
/// assert!(equals(&42, &42));
/// assert!(!equals(&42, &43));
/// ```
pub fn equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// Never equal: every `put` on an existing key reports a change.
///
/// Useful for values whose interior changes are not visible to `PartialEq`.
///
/// # Example
/// ```
/// use spark_observables::reactivity::equality::never_equals;
///
/// assert!(!never_equals(&42, &42));
/// ```
pub fn never_equals<T>(_a: &T, _b: &T) -> bool {
    false
}

// =============================================================================
// TESTS
// =============================================================================
