//! Compile-time tunables.
//!
//! These mirror the `#define`s at the top of the original
//! `klippy/chelper/stepcompress.c`. They are not runtime-configurable:
//! changing any of them changes the wire-compatible behavior of the
//! compressor, so they stay as `const`s rather than fields on a config
//! struct.

/// Initial allocation size (in steps) for a stepper's pending-step ring.
pub const QUEUE_START_SIZE: usize = 1024;

/// Maximum clock delta between the last emitted step and a newly queued
/// one before the gap must be flushed as a far-future singleton move.
pub const CLOCK_DIFF_MAX: u64 = 3 << 28;

/// Approximation of `6 + 4*sqrt(2)` used to bound how far two valid
/// quadratic sequences of equal length can diverge in `add`.
pub const QUADRATIC_DEV: i64 = 11;

/// History retention window, in seconds of MCU time.
pub const HISTORY_EXPIRE_SECONDS: f64 = 30.0;

/// Step+dir+step debounce window, in seconds.
pub const SDS_FILTER_TIME: f64 = 0.000750;
