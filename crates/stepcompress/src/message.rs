//! Outgoing wire messages: `StepMove` triplets, the `queue_step` /
//! `set_next_step_dir` encodings, and the opaque transport seam the core
//! hands batches to.
//!
//! The core never touches bytes directly (spec.md §1 Non-goals): each
//! message carries its payload as the same `u32` words the MCU protocol
//! defines (`klipper_proto::commands::CommandQueueStep` mirrors this
//! shape), and an injected [`Transport`] turns a batch into bytes on the
//! wire.

use crate::error::StepCompressError;

/// An immutable `(interval, count, add)` triplet describing `count`
/// pulses whose inter-pulse interval follows the arithmetic progression
/// `interval, interval+add, interval+2*add, ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepMove {
    pub interval: u32,
    pub count: u16,
    pub add: i16,
}

impl StepMove {
    pub fn new(interval: u32, count: u16, add: i16) -> Self {
        Self {
            interval,
            count,
            add,
        }
    }
}

/// A queued outgoing command, wire-payload already encoded but not yet
/// framed or transmitted.
///
/// `min_clock` is deliberately overloaded per spec.md §3/§9: before a
/// [`crate::sync::SteppersSync`] flush processes this message, it holds
/// the MCU clock at which the move-queue slot previously allocated to
/// this command becomes free (zero for messages that do not consume a
/// slot). After the flush, it holds the minimum clock at which the
/// message may be transmitted. Do not "clean up" this dual meaning —
/// preserving it is a protocol-compatibility requirement, not an
/// oversight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Raw `u32` words of the encoded command, in wire order.
    pub data: Vec<u32>,
    /// Earliest clock at which this message should be sent.
    pub req_clock: u64,
    /// See the field-level overload note above.
    pub min_clock: u64,
    /// Whether this message occupies one of the MCU's finite move-queue
    /// slots. Only `queue_step` messages do; `set_next_step_dir` and
    /// opaque `queue_msg` commands do not and are therefore never fed
    /// through [`crate::sync::SteppersSync`]'s slot heap.
    pub consumes_slot: bool,
}

/// Encodes a `queue_step` command: five `u32`s, `(msgtag, oid, interval,
/// count, add)`, with `add` sign-extended from `i16`.
pub fn encode_queue_step(msgtag: i32, oid: u32, mv: StepMove) -> Vec<u32> {
    vec![
        msgtag as u32,
        oid,
        mv.interval,
        mv.count as u32,
        mv.add as i32 as u32,
    ]
}

/// Encodes a `set_next_step_dir` command: three `u32`s, `(msgtag, oid,
/// dir_bit)`.
pub fn encode_set_next_step_dir(msgtag: i32, oid: u32, dir_bit: u32) -> Vec<u32> {
    vec![msgtag as u32, oid, dir_bit]
}

/// An opaque sink for batches of encoded, ordered [`QueueMessage`]s.
///
/// The serial transport (framing, CRC, dictionary compression, the
/// actual `message_alloc_and_encode`/`serialqueue_send_batch` plumbing)
/// is an external collaborator per spec.md §1; this trait is the only
/// seam the core needs.
pub trait Transport {
    fn send_batch(&mut self, messages: Vec<QueueMessage>) -> Result<(), StepCompressError>;
}

/// A transport that records every batch it receives, for tests.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub batches: Vec<Vec<QueueMessage>>,
}

impl Transport for RecordingTransport {
    fn send_batch(&mut self, messages: Vec<QueueMessage>) -> Result<(), StepCompressError> {
        self.batches.push(messages);
        Ok(())
    }
}
