//! Redundant re-simulation of an emitted move against its step windows.
//!
//! This is a deliberate belt-and-suspenders check against compressor
//! bugs (spec.md §4.3): it walks the same arithmetic progression the MCU
//! will walk and asserts every cumulative offset lands inside its
//! window. It can be compiled out via the `check-lines` Cargo feature,
//! mirroring the original's `#if CHECK_LINES` build-time toggle.

use crate::error::StepCompressError;
use crate::message::StepMove;
use crate::window::window;

/// Re-simulates `mv` against the pending queue's windows and returns the
/// first violation found, if any.
#[cfg(feature = "check-lines")]
pub fn check_line(
    oid: u32,
    pending: &[u64],
    last_step_clock: u64,
    max_error: u32,
    mv: StepMove,
) -> Result<(), StepCompressError> {
    if mv.count == 0 || (mv.interval == 0 && mv.add == 0 && mv.count > 1) || mv.interval >= 0x8000_0000
    {
        return Err(StepCompressError::InvalidSequence {
            oid,
            interval: mv.interval,
            count: mv.count,
            add: mv.add,
        });
    }

    let mut interval: i64 = mv.interval as i64;
    let mut p: i64 = 0;
    for i in 0..mv.count {
        let point = window(pending, i as usize, last_step_clock, max_error);
        p += interval;
        if p < point.minp || p > point.maxp {
            tracing::error!(
                oid,
                interval = mv.interval,
                count = mv.count,
                add = mv.add,
                step_index = i + 1,
                observed = p,
                window_min = point.minp,
                window_max = point.maxp,
                "stepcompress: emitted point outside tolerance window"
            );
            return Err(StepCompressError::InvalidMove {
                oid,
                interval: mv.interval,
                count: mv.count,
                add: mv.add,
                step_index: i + 1,
                observed: p,
                window_min: point.minp,
                window_max: point.maxp,
            });
        }
        if interval >= 0x8000_0000 {
            tracing::error!(
                oid,
                interval = mv.interval,
                count = mv.count,
                add = mv.add,
                step_index = i + 1,
                observed_interval = interval,
                "stepcompress: interval overflow while validating emitted move"
            );
            return Err(StepCompressError::IntervalOverflow {
                oid,
                interval: mv.interval,
                count: mv.count,
                add: mv.add,
                step_index: i + 1,
                observed_interval: interval,
            });
        }
        interval += mv.add as i64;
    }
    Ok(())
}

#[cfg(not(feature = "check-lines"))]
pub fn check_line(
    _oid: u32,
    _pending: &[u64],
    _last_step_clock: u64,
    _max_error: u32,
    _mv: StepMove,
) -> Result<(), StepCompressError> {
    Ok(())
}
