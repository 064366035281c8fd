//! Growable ring of pending step clocks for one stepper.
//!
//! The original C source tracks this with four raw pointers
//! (`queue`, `queue_end`, `queue_pos`, `queue_next`) into a `realloc`'d
//! buffer. Here the same shuffle-or-grow policy is expressed as index
//! arithmetic over an owned `Vec`, per spec.md §9's design note.

use crate::consts::QUEUE_START_SIZE;

/// A growable ring of pending absolute step clocks.
#[derive(Debug, Default)]
pub struct StepQueue {
    buf: Vec<u64>,
    /// Index of the oldest not-yet-compressed step (`queue_pos`).
    head: usize,
    /// Index one past the newest queued step (`queue_next`).
    tail: usize,
}

impl StepQueue {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            head: 0,
            tail: 0,
        }
    }

    /// Number of steps still pending compression.
    pub fn len(&self) -> usize {
        self.tail - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// The pending steps, oldest first.
    pub fn pending(&self) -> &[u64] {
        &self.buf[self.head..self.tail]
    }

    /// Drops the oldest `count` pending steps after they have been
    /// folded into an emitted move.
    pub fn advance(&mut self, count: usize) {
        self.head += count;
        if self.head >= self.tail {
            // Ring fully drained; rewind to the start so `append` does
            // not need to grow or shuffle again for a while.
            self.head = 0;
            self.tail = 0;
        }
    }

    /// Appends a new step clock, growing or shuffling the backing
    /// buffer as needed.
    pub fn append(&mut self, step_clock: u64) {
        if self.tail >= self.buf.len() {
            self.make_room();
        }
        self.buf[self.tail] = step_clock;
        self.tail += 1;
    }

    fn make_room(&mut self) {
        let in_use = self.len();
        if self.head > 0 {
            // Shuffle down to reclaim space at the head without
            // reallocating.
            self.buf.copy_within(self.head..self.head + in_use, 0);
            self.head = 0;
            self.tail = in_use;
            return;
        }
        let mut alloc = self.buf.len();
        if alloc == 0 {
            alloc = QUEUE_START_SIZE;
        }
        while in_use >= alloc {
            alloc *= 2;
        }
        self.buf.resize(alloc, 0);
    }

    /// Total entries still resident, used by the proactive-flush policy
    /// that caps in-memory history at roughly 64K steps.
    pub fn in_use(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_advance_roundtrip() {
        let mut q = StepQueue::new();
        for i in 0..10 {
            q.append(1000 + i);
        }
        assert_eq!(q.len(), 10);
        assert_eq!(q.pending()[0], 1000);
        q.advance(4);
        assert_eq!(q.len(), 6);
        assert_eq!(q.pending()[0], 1004);
    }

    #[test]
    fn draining_fully_rewinds_the_ring() {
        let mut q = StepQueue::new();
        q.append(1);
        q.append(2);
        q.advance(2);
        assert!(q.is_empty());
        q.append(3);
        assert_eq!(q.pending(), &[3]);
    }

    #[test]
    fn grows_past_start_size() {
        let mut q = StepQueue::new();
        for i in 0..(QUEUE_START_SIZE * 3) {
            q.append(i as u64);
        }
        assert_eq!(q.len(), QUEUE_START_SIZE * 3);
        assert_eq!(q.pending()[0], 0);
        assert_eq!(q.pending()[QUEUE_START_SIZE * 3 - 1], (QUEUE_START_SIZE * 3 - 1) as u64);
    }

    #[test]
    fn shuffles_down_instead_of_reallocating_when_head_has_slack() {
        let mut q = StepQueue::new();
        for i in 0..QUEUE_START_SIZE {
            q.append(i as u64);
        }
        q.advance(QUEUE_START_SIZE - 2);
        let cap_before = q.buf.len();
        for i in 0..10 {
            q.append(9000 + i as u64);
        }
        assert_eq!(q.buf.len(), cap_before, "should have shuffled, not grown");
        assert_eq!(q.pending()[0], (QUEUE_START_SIZE - 2) as u64);
    }
}
