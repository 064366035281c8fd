//! Per-stepper state machine: accumulates raw step clocks, debounces
//! direction glitches, and turns pending steps into compressed
//! `queue_step`/`set_next_step_dir` messages on demand.
//!
//! This ties together [`crate::queue`], [`crate::history`],
//! [`crate::compress`] and [`crate::validate`] the way the original's
//! `struct stepcompress` ties together its ring buffer, history list and
//! bisection search. `append` converts each `(print_time, step_time)`
//! pair to an absolute MCU clock itself; producing those times in the
//! first place is the motion planner's job, an external collaborator.

use std::collections::VecDeque;

use crate::compress::compress_bisect_add;
use crate::consts::{CLOCK_DIFF_MAX, SDS_FILTER_TIME};
use crate::error::StepCompressError;
use crate::history::{History, HistoryEntry};
use crate::message::{encode_queue_step, encode_set_next_step_dir, QueueMessage, StepMove};
use crate::queue::StepQueue;
use crate::validate::check_line;

/// Per-stepper compression state.
pub struct StepCompress {
    oid: u32,
    queue: StepQueue,
    history: History,
    pending_msgs: VecDeque<QueueMessage>,

    max_error: u32,
    queue_step_msgtag: i32,
    set_next_step_dir_msgtag: i32,

    time_offset: f64,
    mcu_freq: f64,

    last_step_clock: u64,
    last_step_print_time: f64,
    last_position: i64,

    invert_sdir: bool,
    /// The MCU-visible direction last announced via `set_next_step_dir`.
    /// `None` until the first step is actually committed into the queue
    /// (mirrors the original's `sc->sdir == -1`, i.e. "unknown").
    sdir: Option<bool>,
    /// Direction of the most recently appended step, committed or not.
    /// Mirrors `stepcompress_get_step_dir`, which reports the original's
    /// `next_step_dir` rather than the committed `sdir`.
    next_step_dir: bool,
    /// The single step held back pending confirmation that a direction
    /// reversal is real rather than step+dir+step chatter (the original's
    /// `next_step_clock`, using `None` in place of the C source's `0`
    /// sentinel).
    next_step_clock: Option<u64>,
}

impl StepCompress {
    pub fn new(oid: u32) -> Self {
        Self {
            oid,
            queue: StepQueue::new(),
            history: History::new(),
            pending_msgs: VecDeque::new(),
            max_error: 0,
            queue_step_msgtag: 0,
            set_next_step_dir_msgtag: 0,
            time_offset: 0.0,
            mcu_freq: 1.0,
            last_step_clock: 0,
            last_step_print_time: 0.0,
            last_position: 0,
            invert_sdir: false,
            sdir: None,
            next_step_dir: false,
            next_step_clock: None,
        }
    }

    /// Assigns the per-stepper tolerance and the message tags the host's
    /// protocol identity map assigned to this MCU's `queue_step` and
    /// `set_next_step_dir` commands.
    pub fn fill(&mut self, max_error: u32, queue_step_msgtag: i32, set_next_step_dir_msgtag: i32) {
        self.max_error = max_error;
        self.queue_step_msgtag = queue_step_msgtag;
        self.set_next_step_dir_msgtag = set_next_step_dir_msgtag;
    }

    /// Records the MCU clock/time-base this stepper's print times are
    /// expressed against, and recomputes `last_step_print_time` (and
    /// expires aged-out history) under the new rate.
    pub fn set_time(&mut self, time_offset: f64, mcu_freq: f64) {
        self.time_offset = time_offset;
        self.mcu_freq = mcu_freq;
        self.recalc_last_step_print_time();
    }

    /// Toggles the MCU-visible direction bit. If a direction is already
    /// known, flips it immediately so the next committed step re-announces
    /// the (now inverted) bit.
    pub fn set_invert_sdir(&mut self, invert: bool) {
        if invert != self.invert_sdir {
            self.invert_sdir = invert;
            if let Some(dir) = self.sdir {
                self.sdir = Some(!dir);
            }
        }
    }

    pub fn get_oid(&self) -> u32 {
        self.oid
    }

    /// The direction of the most recently appended step. Matches the
    /// original's `stepcompress_get_step_dir`, which reports
    /// `next_step_dir` — the latest sample — not the committed `sdir`.
    pub fn get_step_dir(&self) -> bool {
        self.next_step_dir
    }

    pub fn last_step_clock(&self) -> u64 {
        self.last_step_clock
    }

    /// Appends one step in direction `sdir`, scheduled at `step_time`
    /// seconds into the move that started at `print_time`.
    ///
    /// Converts to an absolute MCU clock via `last_step_clock +
    /// (step_time + print_time - last_step_print_time) * mcu_freq`
    /// (spec.md §4.4): feeding `print_time - last_step_print_time` back
    /// through `last_step_clock` on every call is what keeps repeated
    /// appends from accumulating floating-point rounding error across a
    /// long print.
    ///
    /// At most one step is ever held back uncommitted: a direction
    /// reversal that arrives within `SDS_FILTER_TIME` of it is treated as
    /// step+dir+step chatter and rolls it back instead of committing it.
    pub fn append(&mut self, sdir: bool, print_time: f64, step_time: f64) -> Result<(), StepCompressError> {
        let offset = print_time - self.last_step_print_time;
        let rel_sc = (step_time + offset) * self.mcu_freq;
        let step_clock = self.last_step_clock + rel_sc as u64;

        if let Some(pend_clock) = self.next_step_clock {
            if sdir != self.next_step_dir {
                let diff = step_clock as i64 - pend_clock as i64;
                if (diff as f64) < SDS_FILTER_TIME * self.mcu_freq {
                    // Rollback: the pending step never happened.
                    self.next_step_clock = None;
                    self.next_step_dir = sdir;
                    return Ok(());
                }
            }
            self.queue_append()?;
        }
        self.next_step_clock = Some(step_clock);
        self.next_step_dir = sdir;
        Ok(())
    }

    /// Commits the pending step (if any) without buffering a new one,
    /// closing off the possibility of a future rollback.
    pub fn commit(&mut self) -> Result<(), StepCompressError> {
        if self.next_step_clock.is_some() {
            self.queue_append()?;
        }
        Ok(())
    }

    /// Commits the single held-back step into the ring, flushing the
    /// queue and announcing a direction change first if needed.
    fn queue_append(&mut self) -> Result<(), StepCompressError> {
        let step_clock = self
            .next_step_clock
            .take()
            .expect("queue_append called with no pending step");

        if self.sdir != Some(self.next_step_dir) {
            self.emit_dir_change(self.next_step_dir)?;
        }
        if step_clock >= self.last_step_clock + CLOCK_DIFF_MAX {
            return self.queue_append_far(step_clock);
        }
        let in_use = self.queue.in_use();
        if in_use > 65_535 + 2000 {
            // No point keeping more than 64K steps in memory: flush until
            // at most 65535 remain pending.
            let flush_to = self.queue.pending()[in_use - 65_535];
            self.drain_queue_until(flush_to)?;
        }
        self.queue.append(step_clock);
        Ok(())
    }

    fn emit_dir_change(&mut self, new_dir: bool) -> Result<(), StepCompressError> {
        self.drain_queue_until(u64::MAX)?;
        self.sdir = Some(new_dir);
        let dir_bit = if new_dir ^ self.invert_sdir { 1 } else { 0 };
        let data = encode_set_next_step_dir(self.set_next_step_dir_msgtag, self.oid, dir_bit);
        self.pending_msgs.push_back(QueueMessage {
            data,
            req_clock: self.last_step_clock,
            min_clock: 0,
            consumes_slot: false,
        });
        Ok(())
    }

    /// Slow path: the pending step is scheduled too far in the future to
    /// share a ring with whatever is already queued. Drains the ring up
    /// to just below the point where `step_clock` would stop being "far
    /// future", then either folds it in normally or emits it as an
    /// isolated singleton move.
    fn queue_append_far(&mut self, step_clock: u64) -> Result<(), StepCompressError> {
        let drain_to = step_clock.saturating_sub(CLOCK_DIFF_MAX) + 1;
        self.drain_queue_until(drain_to)?;
        if step_clock >= self.last_step_clock + CLOCK_DIFF_MAX {
            self.emit_far_singleton(step_clock)
        } else {
            self.queue.append(step_clock);
            Ok(())
        }
    }

    /// Emits an isolated step scheduled too far in the future to share a
    /// quadratic progression with anything already pending. `interval`
    /// must fit in `u32`; gaps wider than that are chunked into several
    /// singleton moves.
    fn emit_far_singleton(&mut self, step_clock: u64) -> Result<(), StepCompressError> {
        while step_clock - self.last_step_clock > u32::MAX as u64 {
            self.emit_move(StepMove::new(u32::MAX, 1, 0))?;
        }
        let interval = (step_clock - self.last_step_clock) as u32;
        self.emit_move(StepMove::new(interval, 1, 0))?;
        self.recalc_last_step_print_time();
        Ok(())
    }

    /// Commits any step the MCU is guaranteed to already need by
    /// `move_clock`, i.e. the pending step (if due) plus every already
    /// queued step scheduled before it.
    pub fn flush(&mut self, move_clock: u64) -> Result<(), StepCompressError> {
        if let Some(pend_clock) = self.next_step_clock {
            if move_clock >= pend_clock {
                self.queue_append()?;
            }
        }
        self.drain_queue_until(move_clock)?;
        self.recalc_last_step_print_time();
        Ok(())
    }

    fn drain_queue_until(&mut self, move_clock: u64) -> Result<(), StepCompressError> {
        if self.queue.is_empty() {
            return Ok(());
        }
        while !self.queue.is_empty() && self.last_step_clock < move_clock {
            self.emit_next_move()?;
        }
        self.recalc_last_step_print_time();
        Ok(())
    }

    fn emit_next_move(&mut self) -> Result<(), StepCompressError> {
        let pending = self.queue.pending();
        let mv = compress_bisect_add(pending, self.last_step_clock, self.max_error);
        check_line(self.oid, pending, self.last_step_clock, self.max_error, mv)?;
        self.emit_move(mv)?;
        self.queue.advance(mv.count as usize);
        Ok(())
    }

    fn emit_move(&mut self, mv: StepMove) -> Result<(), StepCompressError> {
        let prev_step_clock = self.last_step_clock;
        let count = mv.count as i64;
        let addfactor = count * (count - 1) / 2;
        let total_offset = mv.interval as i64 * count + mv.add as i64 * addfactor;
        let first_clock = prev_step_clock as i64 + mv.interval as i64;
        let last_clock = prev_step_clock as i64 + total_offset;
        let signed_count = if self.sdir.unwrap_or(true) {
            mv.count as i32
        } else {
            -(mv.count as i32)
        };

        self.history.push(HistoryEntry {
            first_clock: first_clock as u64,
            last_clock: last_clock as u64,
            start_position: self.last_position,
            step_count: signed_count,
            interval: mv.interval,
            add: mv.add,
        });
        self.last_position += signed_count as i64;
        self.last_step_clock = last_clock as u64;

        tracing::trace!(
            oid = self.oid,
            interval = mv.interval,
            count = mv.count,
            add = mv.add,
            "stepcompress: emitting queue_step"
        );
        let data = encode_queue_step(self.queue_step_msgtag, self.oid, mv);
        // `min_clock`/`req_clock` both start at the pre-move
        // `last_step_clock` (spec.md §4.6); a far-future singleton
        // instead requests transmission no earlier than its own first
        // pulse. Only `req_clock` is overridden for that case — `min_clock`
        // keeps the natural pre-move value, since it is what
        // `SteppersSync::flush` feeds into the slot heap (spec.md §4.5
        // stage 2), not the deferred transmit request.
        let mut req_clock = prev_step_clock;
        if mv.count == 1 && first_clock as u64 >= prev_step_clock + CLOCK_DIFF_MAX {
            req_clock = first_clock as u64;
        }
        self.pending_msgs.push_back(QueueMessage {
            data,
            req_clock,
            min_clock: prev_step_clock,
            consumes_slot: true,
        });
        Ok(())
    }

    /// Discards all pending steps and re-anchors the clock used to
    /// derive step windows, used when the MCU's move queue has been
    /// reset out from under this stepper. Flushes everything outstanding
    /// first, matching `stepcompress_reset`.
    pub fn reset(&mut self, last_step_clock: u64) -> Result<(), StepCompressError> {
        self.flush(u64::MAX)?;
        self.last_step_clock = last_step_clock;
        self.sdir = None;
        self.recalc_last_step_print_time();
        Ok(())
    }

    /// Re-anchors the stepper's position without emitting any steps,
    /// e.g. after a homing move sets a known reference. Flushes
    /// everything outstanding first.
    pub fn set_last_position(&mut self, clock: u64, position: i64) -> Result<(), StepCompressError> {
        self.flush(u64::MAX)?;
        self.last_position = position;
        self.history.push_marker(clock, position);
        Ok(())
    }

    pub fn find_past_position(&self, clock: u64) -> i64 {
        self.history.find_past_position(self.last_position, clock)
    }

    pub fn extract_old(&self, start_clock: u64, end_clock: u64, max: usize) -> Vec<HistoryEntry> {
        self.history.extract_old(start_clock, end_clock, max)
    }

    /// Enqueues an arbitrary pre-encoded command that must be
    /// transmitted in step order relative to this stepper's moves
    /// (e.g. an endstop query). Flushes everything outstanding first so
    /// the command's `req_clock` reflects a fully up-to-date
    /// `last_step_clock`, matching `stepcompress_queue_msg`.
    pub fn queue_msg(&mut self, data: Vec<u32>) -> Result<(), StepCompressError> {
        self.flush(u64::MAX)?;
        self.pending_msgs.push_back(QueueMessage {
            data,
            req_clock: self.last_step_clock,
            min_clock: 0,
            consumes_slot: false,
        });
        Ok(())
    }

    fn recalc_last_step_print_time(&mut self) {
        self.last_step_print_time =
            self.time_offset + (self.last_step_clock as f64 - 0.5) / self.mcu_freq;
        self.history.expire(self.last_step_clock, self.mcu_freq);
    }

    /// Drains every message accumulated since the last drain, in
    /// emission order. Exposed for tests and single-stepper callers;
    /// [`crate::sync::SteppersSync`] instead drains incrementally via
    /// [`Self::peek_next_message`]/[`Self::pop_next_message`] so it can
    /// stop merging once a not-yet-due message is reached.
    pub fn take_messages(&mut self) -> Vec<QueueMessage> {
        std::mem::take(&mut self.pending_msgs).into()
    }

    /// The oldest not-yet-drained message, if any. Messages are emitted
    /// in non-decreasing `req_clock` order (spec.md §5), so the front of
    /// this list always holds this stepper's next-due message.
    pub fn peek_next_message(&self) -> Option<&QueueMessage> {
        self.pending_msgs.front()
    }

    /// Removes and returns the oldest not-yet-drained message.
    pub fn pop_next_message(&mut self) -> Option<QueueMessage> {
        self.pending_msgs.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MCU_FREQ: f64 = 20_000_000.0;

    fn stepper() -> StepCompress {
        let mut sc = StepCompress::new(3);
        sc.fill(25_600, 7, 8);
        sc.set_time(0.0, MCU_FREQ);
        sc
    }

    /// Appends a step at absolute clock `clock` by driving `append`
    /// through its `(print_time, step_time)` interface instead of
    /// reaching past it, so tests exercise the same conversion real
    /// callers do.
    fn append_at(sc: &mut StepCompress, dir: bool, clock: u64) -> Result<(), StepCompressError> {
        sc.append(dir, clock as f64 / MCU_FREQ, 0.0)
    }

    #[test]
    fn constant_cadence_flushes_into_a_single_move() {
        let mut sc = stepper();
        for k in 1..=20u64 {
            append_at(&mut sc, true, k * 2000).unwrap();
        }
        // Committing only promotes the last pending step into the ring;
        // actually compressing the ring into wire messages requires a flush.
        sc.flush(u64::MAX).unwrap();
        let msgs = sc.take_messages();
        let step_msg = msgs.iter().find(|m| m.data[0] == 7).expect("queue_step");
        assert_eq!(step_msg.data[1], 3);
        assert_eq!(step_msg.data[3], 20); // count
        assert_eq!(step_msg.data[4], 0); // add
        assert_eq!(msgs.iter().filter(|m| m.data[0] == 8).count(), 1);
    }

    #[test]
    fn brief_direction_reversal_is_filtered_out() {
        let mut sc = stepper();
        append_at(&mut sc, true, 1000).unwrap();
        // Dips to reverse and immediately back, well inside the 750us
        // debounce window at 20MHz (15000 ticks).
        append_at(&mut sc, false, 1100).unwrap();
        append_at(&mut sc, true, 1200).unwrap();
        sc.commit().unwrap();
        let msgs = sc.take_messages();
        let dir_msgs = msgs.iter().filter(|m| m.data[0] == 8).count();
        assert_eq!(
            dir_msgs, 1,
            "only the initial direction announcement should be emitted, chatter filtered"
        );
    }

    #[test]
    fn reversal_within_the_debounce_window_emits_nothing_until_resolved() {
        let mut sc = stepper();
        append_at(&mut sc, true, 0).unwrap();
        append_at(&mut sc, false, 2000).unwrap();
        // Neither step has been committed: the direction is still
        // unresolved, so nothing has been emitted at all yet — not even
        // a `set_next_step_dir` for the first sample.
        let msgs = sc.take_messages();
        assert!(msgs.is_empty());
        assert!(!sc.get_step_dir());
    }

    #[test]
    fn sustained_direction_change_emits_set_next_step_dir() {
        let mut sc = stepper();
        append_at(&mut sc, true, 1000).unwrap();
        append_at(&mut sc, false, 1100).unwrap();
        // Stay reversed past the debounce window (15000 ticks at 20MHz).
        append_at(&mut sc, false, 1100 + 20_000).unwrap();
        sc.commit().unwrap();
        let msgs = sc.take_messages();
        assert!(msgs.iter().any(|m| m.data[0] == 8 && m.data[2] == 0));
    }

    #[test]
    fn far_future_step_emits_an_isolated_singleton_move() {
        let mut sc = stepper();
        append_at(&mut sc, true, CLOCK_DIFF_MAX + 5000).unwrap();
        sc.commit().unwrap();
        let msgs = sc.take_messages();
        let step_msg = msgs.iter().find(|m| m.data[0] == 7).expect("queue_step");
        assert_eq!(step_msg.data[3], 1); // count == 1
        assert_eq!(step_msg.data[2], (CLOCK_DIFF_MAX + 5000) as u32); // interval
    }

    #[test]
    fn find_past_position_reflects_committed_moves() {
        let mut sc = stepper();
        for k in 1..=10u64 {
            append_at(&mut sc, true, k * 1000).unwrap();
        }
        sc.flush(u64::MAX).unwrap();
        assert_eq!(sc.find_past_position(sc.last_step_clock()), 10);
    }

    #[test]
    fn reset_flushes_pending_steps_before_rewinding_the_clock() {
        let mut sc = stepper();
        append_at(&mut sc, true, 1000).unwrap();
        sc.reset(500).unwrap();
        let msgs = sc.take_messages();
        assert!(
            msgs.iter().any(|m| m.data[0] == 7),
            "the pending step must be flushed out, not discarded, before reset"
        );
        assert_eq!(sc.last_step_clock(), 500);
    }

    #[test]
    fn set_last_position_anchors_future_queries_without_emitting_new_steps() {
        let mut sc = stepper();
        sc.set_last_position(100, 42).unwrap();
        assert!(sc.take_messages().is_empty());
        assert_eq!(sc.find_past_position(50), 42);
    }

    #[test]
    fn get_step_dir_reports_the_latest_sample_even_if_not_yet_committed() {
        let mut sc = stepper();
        append_at(&mut sc, true, 0).unwrap();
        assert!(sc.get_step_dir());
        append_at(&mut sc, false, 2000).unwrap();
        assert!(!sc.get_step_dir(), "rolled-back sample still updates next_step_dir");
    }
}
