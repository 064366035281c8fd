//! Per-step tolerance windows.
//!
//! Every pending step has an acceptance window `[minp, maxp]`: the
//! compressor may approximate the step's true offset with any value in
//! that range without exceeding `max_error`, and the window is sized so
//! that it never overlaps a neighboring step's window by more than half
//! their gap (spec.md §4.1, §8 invariant 4).

/// A step's acceptable offset range, measured in MCU clock ticks from
/// `last_step_clock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub minp: i64,
    pub maxp: i64,
}

/// Computes the `i`-th pending step's window.
///
/// `pending` holds absolute step clocks for every step still queued;
/// `i` indexes into it. `last_step_clock` is the clock of the last step
/// already committed to an emitted move.
pub fn window(pending: &[u64], i: usize, last_step_clock: u64, max_error: u32) -> Window {
    let maxp = pending[i] as i64 - last_step_clock as i64;
    let prev = if i > 0 {
        pending[i - 1] as i64 - last_step_clock as i64
    } else {
        0
    };
    let mut err = (maxp - prev) / 2;
    if err > max_error as i64 {
        err = max_error as i64;
    }
    Window {
        minp: maxp - err,
        maxp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_window_is_capped_only_by_max_error() {
        let pending = [2000u64];
        let w = window(&pending, 0, 0, 500);
        assert_eq!(w.maxp, 2000);
        assert_eq!(w.minp, 1500);
    }

    #[test]
    fn window_never_overlaps_predecessors_max() {
        let pending = [1000u64, 1100u64];
        let w0 = window(&pending, 0, 0, 500);
        let w1 = window(&pending, 1, 0, 500);
        // Gap is 100, so err is capped at 50 regardless of max_error.
        assert_eq!(w1.minp, 1050);
        assert!(w1.minp > w0.maxp);
    }

    #[test]
    fn max_error_caps_window_on_wide_gaps() {
        let pending = [10_000u64];
        let w = window(&pending, 0, 0, 25_600);
        assert_eq!(w.minp, 10_000 - 5_000);
    }
}
