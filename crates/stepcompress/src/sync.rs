//! Multi-stepper synchronization: drains every stepper's pending
//! messages, assigns each one a transmit slot from a shared pool of MCU
//! move-queue slots, and hands the ordered batch to a [`Transport`].
//!
//! The slot pool is tracked with a binary min-heap over "slot becomes
//! free at clock X" values (`heap_replace`, mirroring the original's
//! `steppersync` move-queue accounting): popping the earliest-free slot
//! and replacing it with the clock the next message will occupy keeps
//! the pool's size fixed at `move_num` regardless of how many steppers
//! are being driven.

use crate::error::StepCompressError;
use crate::message::{QueueMessage, Transport};
use crate::step_compress::StepCompress;

/// Drives a set of [`StepCompress`] instances through a shared
/// move-queue slot pool and transport.
pub struct SteppersSync<T: Transport> {
    transport: T,
    steppers: Vec<StepCompress>,
    /// Binary min-heap: `move_clocks[0]` is always the earliest clock
    /// at which some move-queue slot is free.
    move_clocks: Vec<u64>,
}

impl<T: Transport> SteppersSync<T> {
    /// `move_num` is the number of outstanding move-queue slots the MCU
    /// firmware reserves; it bounds how many messages may be in flight
    /// at once across every stepper sharing this synchronizer.
    pub fn new(transport: T, steppers: Vec<StepCompress>, move_num: usize) -> Self {
        Self {
            transport,
            steppers,
            move_clocks: vec![0; move_num.max(1)],
        }
    }

    pub fn set_time(&mut self, time_offset: f64, mcu_freq: f64) {
        for stepper in &mut self.steppers {
            stepper.set_time(time_offset, mcu_freq);
        }
    }

    pub fn steppers(&self) -> &[StepCompress] {
        &self.steppers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn steppers_mut(&mut self) -> &mut [StepCompress] {
        &mut self.steppers
    }

    /// Replaces the heap's root with `new_value` and restores heap
    /// order by sifting down, returning the value that was replaced.
    fn heap_replace(&mut self, new_value: u64) -> u64 {
        let old = self.move_clocks[0];
        self.move_clocks[0] = new_value;
        let n = self.move_clocks.len();
        let mut pos = 0;
        loop {
            let left = 2 * pos + 1;
            if left >= n {
                break;
            }
            let mut smallest = left;
            let right = left + 1;
            if right < n && self.move_clocks[right] < self.move_clocks[left] {
                smallest = right;
            }
            if self.move_clocks[pos] <= self.move_clocks[smallest] {
                break;
            }
            self.move_clocks.swap(pos, smallest);
            pos = smallest;
        }
        old
    }

    /// Runs one synchronization pass: lets every stepper commit
    /// whatever is due by `move_clock`, then repeatedly pulls the
    /// lowest-`req_clock` message across all steppers (each stepper's
    /// own list is already non-decreasing, so only the fronts ever need
    /// comparing), assigns each one a free move-queue slot, and hands
    /// the merged batch to the transport.
    ///
    /// A step command (one that consumes a move-queue slot) whose
    /// `req_clock` is still ahead of `move_clock` stops the merge
    /// entirely (spec.md §4.5 stage 2): it and everything behind it
    /// remain queued on their steppers for the next call. This matters
    /// for messages a stepper emitted independent of `move_clock` — a
    /// far-future singleton, for instance — which can otherwise sit
    /// well ahead of the clock this flush was asked to cover.
    pub fn flush(&mut self, move_clock: u64) -> Result<(), StepCompressError> {
        for stepper in &mut self.steppers {
            stepper.flush(move_clock)?;
        }

        let mut batch: Vec<QueueMessage> = Vec::new();
        loop {
            let next = self
                .steppers
                .iter()
                .enumerate()
                .filter_map(|(idx, s)| s.peek_next_message().map(|m| (idx, m.req_clock)))
                .min_by_key(|&(idx, req_clock)| (req_clock, idx));
            let Some((idx, req_clock)) = next else {
                break;
            };
            let consumes_slot = self.steppers[idx].peek_next_message().unwrap().consumes_slot;
            if consumes_slot && req_clock > move_clock {
                break;
            }
            let mut msg = self.steppers[idx].pop_next_message().unwrap();
            if msg.consumes_slot {
                // Only step commands occupy a move-queue slot; a
                // direction change or opaque command rides along for
                // free and must not perturb the heap. `min_clock` still
                // holds its pre-flush natural value here (the message's
                // un-deferred request clock) — heap_replace consumes
                // that, not `req_clock`, so a far-future singleton's
                // artificially delayed `req_clock` never skews the slot
                // pool's accounting.
                msg.min_clock = self.heap_replace(msg.min_clock);
            }
            batch.push(msg);
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.transport.send_batch(batch)
    }
}
