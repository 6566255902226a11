//! Debug assertion macros for sequencing invariants.
//!
//! Only active in debug builds (`debug_assert!`), so release builds pay
//! nothing. Used by both sequencers, the claim guard and the processors.

// =============================================================================
// Claim size: 1 <= n <= buffer_size
// =============================================================================

/// Assert that a claim size is within `[1, buffer_size]`.
///
/// Public entry points validate this and return an error; the assertion
/// guards the internal paths that skip validation.
macro_rules! debug_assert_claim_size {
    ($n:expr, $buffer_size:expr) => {
        debug_assert!(
            $n >= 1 && $n <= $buffer_size as i64,
            "claim size {} outside [1, {}]",
            $n,
            $buffer_size
        )
    };
}

// =============================================================================
// No overwrite: a claim never laps the slowest gating sequence
// =============================================================================

/// Assert that a claimed sequence does not overwrite an unconsumed slot.
///
/// **Invariant**: `claimed - min_gating <= buffer_size`
macro_rules! debug_assert_no_overwrite {
    ($claimed:expr, $min_gating:expr, $buffer_size:expr) => {
        debug_assert!(
            $claimed - $min_gating <= $buffer_size as i64,
            "claim {} would overwrite slot still held by gating sequence {} (buffer {})",
            $claimed,
            $min_gating,
            $buffer_size
        )
    };
}

// =============================================================================
// Monotonic progress
// =============================================================================

/// Assert that a sequence only moves forward.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} moved backwards from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// Claim window: slot access stays inside the guard's range
// =============================================================================

/// Assert that a sequence lies inside `[lo, hi]`.
macro_rules! debug_assert_in_window {
    ($sequence:expr, $lo:expr, $hi:expr) => {
        debug_assert!(
            $sequence >= $lo && $sequence <= $hi,
            "sequence {} outside claimed window [{}, {}]",
            $sequence,
            $lo,
            $hi
        )
    };
}

pub(crate) use debug_assert_claim_size;
pub(crate) use debug_assert_in_window;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_no_overwrite;
