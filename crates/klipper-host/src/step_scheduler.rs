//! Step Scheduler
//!
//! Bridges the kinematics layer's per-move step counts to the wire-ready,
//! compressed pulse trains `stepcompress` produces. Motion planning and
//! serial framing stay out of scope here, the same as they do for
//! `stepcompress` itself: this module only assigns each configured motor an
//! oid, paces its pending steps onto the MCU clock, and logs the resulting
//! batches until a real serial transport is wired in.

use crate::kinematics::Step;
use stepcompress::{QueueMessage, StepCompress, StepCompressError, SteppersSync, Transport};
use tracing::info;

/// Clock ticks per second assumed for the placeholder MCU clock.
const MCU_FREQ: f64 = 20_000_000.0;
/// Step timing tolerance handed to every stepper's compressor.
const MAX_ERROR: u32 = 25_600;
/// Wire command tags, matching the `queue_step` / `set_next_step_dir`
/// identifiers the firmware config step would normally hand back.
const QUEUE_STEP_MSGTAG: i32 = 1;
const SET_NEXT_STEP_DIR_MSGTAG: i32 = 2;
/// Number of MCU move-queue slots reserved per stepper, shared across the
/// configured motors.
const MOVE_QUEUE_SLOTS: usize = 64;
/// Until a real planner supplies per-move velocity, steps within a move are
/// paced at this fixed cadence.
const PLACEHOLDER_STEP_INTERVAL_TICKS: u64 = (MCU_FREQ / 1_000.0) as u64;

/// A transport that logs each outgoing batch, standing in for the real
/// serial link until one is wired up.
#[derive(Default)]
pub struct LoggingTransport;

impl Transport for LoggingTransport {
    fn send_batch(&mut self, messages: Vec<QueueMessage>) -> Result<(), StepCompressError> {
        for msg in &messages {
            info!(
                req_clock = msg.req_clock,
                min_clock = msg.min_clock,
                data = ?msg.data,
                "queued MCU message"
            );
        }
        Ok(())
    }
}

/// Resolves the fixed oid a motor name was assigned when the stepper list
/// was built.
fn oid_for_motor(motor: &str) -> Option<u32> {
    match motor {
        "stepper_x" => Some(0),
        "stepper_y" => Some(1),
        "stepper_z" => Some(2),
        _ => None,
    }
}

/// Owns one `StepCompress` per configured motor behind a shared
/// move-queue slot pool, and translates kinematics output into compressed
/// pulse trains.
pub struct StepScheduler {
    sync: SteppersSync<LoggingTransport>,
    last_clock: u64,
}

impl StepScheduler {
    pub fn new() -> Self {
        let motors = ["stepper_x", "stepper_y", "stepper_z"];
        let steppers = motors
            .iter()
            .map(|motor| {
                let mut sc = StepCompress::new(oid_for_motor(motor).expect("known motor"));
                sc.fill(MAX_ERROR, QUEUE_STEP_MSGTAG, SET_NEXT_STEP_DIR_MSGTAG);
                sc.set_time(0.0, MCU_FREQ);
                sc
            })
            .collect();
        Self {
            sync: SteppersSync::new(LoggingTransport::default(), steppers, MOVE_QUEUE_SLOTS),
            last_clock: 0,
        }
    }

    /// Paces each motor's step count onto the clock at a fixed cadence and
    /// flushes the resulting compressed moves through the shared
    /// synchronizer.
    pub fn schedule_move(&mut self, steps: &[Step]) -> Result<(), StepCompressError> {
        for step in steps {
            let oid = match oid_for_motor(&step.motor) {
                Some(oid) => oid,
                None => continue,
            };
            let stepper = self
                .sync
                .steppers_mut()
                .iter_mut()
                .find(|sc| sc.get_oid() == oid)
                .expect("every motor was given a stepper at construction");

            let dir = step.steps >= 0;
            for k in 1..=step.steps.unsigned_abs() as u64 {
                let clock = self.last_clock + k * PLACEHOLDER_STEP_INTERVAL_TICKS;
                stepper.append(dir, clock as f64 / MCU_FREQ, 0.0)?;
            }
            self.last_clock += step.steps.unsigned_abs() as u64 * PLACEHOLDER_STEP_INTERVAL_TICKS;
        }
        self.sync.flush(self.last_clock)
    }
}

impl Default for StepScheduler {
    fn default() -> Self {
        Self::new()
    }
}
