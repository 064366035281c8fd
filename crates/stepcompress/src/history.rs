//! Per-stepper history of executed moves.
//!
//! Newest-first, as in the original's `list_add_head`-ordered
//! `history_list`. Supports two queries: "what position was the stepper
//! at some past clock" and "give me the raw move records overlapping a
//! clock range" (used by endstop/homing queries upstream).

use std::collections::VecDeque;

use crate::consts::HISTORY_EXPIRE_SECONDS;

/// One executed move, retained for replay queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub first_clock: u64,
    pub last_clock: u64,
    pub start_position: i64,
    /// Signed: negative for moves taken in the reverse direction.
    pub step_count: i32,
    pub interval: u32,
    pub add: i16,
}

/// Newest-first history of executed moves for one stepper.
#[derive(Debug, Default)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Records a freshly emitted move. Must be called in clock order;
    /// entries are pushed to the front to keep the list newest-first.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
    }

    /// Pushes a zero-length marker, used by `set_last_position` to
    /// anchor `find_past_position` queries before any move exists.
    pub fn push_marker(&mut self, clock: u64, position: i64) {
        self.push(HistoryEntry {
            first_clock: clock,
            last_clock: clock,
            start_position: position,
            step_count: 0,
            interval: 0,
            add: 0,
        });
    }

    /// Drops every entry whose `last_clock` has aged out of the
    /// `HISTORY_EXPIRE` window, i.e. everything at or before
    /// `last_step_clock - HISTORY_EXPIRE * mcu_freq`.
    pub fn expire(&mut self, last_step_clock: u64, mcu_freq: f64) {
        if (last_step_clock as f64) <= mcu_freq * HISTORY_EXPIRE_SECONDS {
            return;
        }
        let cutoff = last_step_clock - (mcu_freq * HISTORY_EXPIRE_SECONDS) as u64;
        while let Some(back) = self.entries.back() {
            if back.last_clock > cutoff {
                break;
            }
            self.entries.pop_back();
        }
    }

    /// Inverts the recorded quadratic progression to recover the
    /// stepper's position at an arbitrary past `clock`.
    pub fn find_past_position(&self, fallback_last_position: i64, clock: u64) -> i64 {
        let mut last_position = fallback_last_position;
        for hs in &self.entries {
            if clock < hs.first_clock {
                last_position = hs.start_position;
                continue;
            }
            if clock >= hs.last_clock {
                return hs.start_position + hs.step_count as i64;
            }
            let interval = hs.interval as f64;
            let add = hs.add as f64;
            let ticks = (clock as i64 - hs.first_clock as i64) as f64 + interval;
            let offset = if hs.add == 0 {
                ticks / interval
            } else {
                let a = 0.5 * add;
                let b = interval - 0.5 * add;
                let c = -ticks;
                (f64::sqrt(b * b - 4.0 * a * c) - b) / (2.0 * a)
            };
            let offset = offset as i64;
            return if hs.step_count < 0 {
                hs.start_position - offset
            } else {
                hs.start_position + offset
            };
        }
        last_position
    }

    /// Returns up to `max` history entries overlapping
    /// `[start_clock, end_clock)`, newest-first.
    pub fn extract_old(&self, start_clock: u64, end_clock: u64, max: usize) -> Vec<HistoryEntry> {
        let mut out = Vec::new();
        for hs in &self.entries {
            if start_clock >= hs.last_clock || out.len() >= max {
                break;
            }
            if end_clock <= hs.first_clock {
                continue;
            }
            out.push(*hs);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(first: u64, last: u64, start_pos: i64, count: i32, interval: u32, add: i16) -> HistoryEntry {
        HistoryEntry {
            first_clock: first,
            last_clock: last,
            start_position: start_pos,
            step_count: count,
            interval,
            add,
        }
    }

    #[test]
    fn find_past_position_inside_a_constant_interval_move() {
        let mut h = History::new();
        // 10 steps of interval 100, first pulse at clock 1000, position 0.
        h.push(entry(1000, 1000 + 900, 0, 10, 100, 0));
        // Clock of the 4th pulse (1000 + 3*100) should read back as step 4.
        let pos = h.find_past_position(0, 1000 + 300);
        assert_eq!(pos, 4);
    }

    #[test]
    fn find_past_position_after_move_returns_running_total() {
        let mut h = History::new();
        h.push(entry(1000, 1900, 0, 10, 100, 0));
        assert_eq!(h.find_past_position(0, 5000), 10);
    }

    #[test]
    fn find_past_position_before_any_recorded_move_falls_back() {
        let mut h = History::new();
        h.push(entry(1000, 1900, 5, 10, 100, 0));
        assert_eq!(h.find_past_position(99, 500), 5);
    }

    #[test]
    fn expire_drops_entries_older_than_the_window() {
        let mut h = History::new();
        h.push(entry(0, 100, 0, 10, 10, 0));
        h.push(entry(10_000_000_200, 10_000_000_300, 10, 1, 100, 0));
        // mcu_freq=20e6, HISTORY_EXPIRE=30s => 6e8 ticks. last_step_clock far
        // beyond both entries' last_clock + window.
        h.expire(10_000_000_300 + 600_000_000 + 1, 20_000_000.0);
        assert!(h.extract_old(0, u64::MAX, 10).is_empty());
    }

    #[test]
    fn extract_old_returns_overlapping_entries_newest_first() {
        let mut h = History::new();
        h.push(entry(0, 100, 0, 1, 100, 0));
        h.push(entry(100, 200, 1, 1, 100, 0));
        let out = h.extract_old(50, 150, 10);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].first_clock, 100);
        assert_eq!(out[1].first_clock, 0);
    }
}
