//! Stepper pulse schedule compression and multi-stepper synchronization
//! for the Klipper host.
//!
//! A motion planner hands this crate a dense stream of individual step
//! events (one per physical pulse the MCU must emit); [`StepCompress`]
//! folds runs of them into `(interval, count, add)` quadratic
//! progressions the MCU firmware can replay with three registers
//! instead of one timer reload per step, and [`SteppersSync`]
//! coordinates several steppers' compressed output against a shared
//! pool of MCU move-queue slots.
//!
//! The crate never touches wire bytes: callers inject a [`Transport`]
//! that turns batches of [`QueueMessage`] into framed, serialized bytes
//! on an actual connection.

pub mod compress;
pub mod consts;
pub mod error;
pub mod history;
pub mod message;
pub mod queue;
pub mod step_compress;
pub mod sync;
pub mod validate;
pub mod window;

pub use error::StepCompressError;
pub use history::{History, HistoryEntry};
pub use message::{QueueMessage, RecordingTransport, StepMove, Transport};
pub use step_compress::StepCompress;
pub use sync::SteppersSync;
