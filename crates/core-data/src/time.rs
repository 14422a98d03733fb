//! Timestamp conventions.
//!
//! Pipeline timestamps are signed nanoseconds. A dedicated sentinel marks
//! "no time" so that stale probes and never-produced values are
//! distinguishable from a legitimate `t == 0` sample.

/// Sentinel for "no timestamp". Any comparison or arithmetic on a value
/// carrying this time is meaningless; callers must check first.
pub const INVALID_TIME: i64 = i64::MIN;

/// True when `t` is a real timestamp (not the sentinel).
#[inline]
pub fn is_valid_time(t: i64) -> bool {
    t != INVALID_TIME
}
