use thiserror::Error;

/// Errors the stepper compression engine can raise.
///
/// All variants are fatal for the stepper that raised them: per spec.md's
/// error handling design, nothing here is recovered locally. Callers must
/// treat any `Err` as terminal for the owning session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepCompressError {
    /// The compressor produced a move that does not satisfy every covered
    /// step's tolerance window. Indicates a bug in `compress_bisect_add`,
    /// not bad input — a faithful compressor should never trigger this.
    #[error(
        "stepcompress oid={oid} interval={interval} count={count} add={add}: \
         point {step_index}: {observed} not in {window_min}:{window_max}"
    )]
    InvalidMove {
        oid: u32,
        interval: u32,
        count: u16,
        add: i16,
        step_index: u16,
        observed: i64,
        window_min: i64,
        window_max: i64,
    },

    /// A cumulative interval grew to or past 2^31 while validating a move.
    #[error(
        "stepcompress oid={oid} interval={interval} count={count} add={add}: \
         point {step_index}: interval overflow {observed_interval}"
    )]
    IntervalOverflow {
        oid: u32,
        interval: u32,
        count: u16,
        add: i16,
        step_index: u16,
        observed_interval: i64,
    },

    /// The move itself is structurally invalid (zero count, or a
    /// zero-interval/zero-add move with more than one pulse).
    #[error("stepcompress oid={oid} interval={interval} count={count} add={add}: invalid sequence")]
    InvalidSequence {
        oid: u32,
        interval: u32,
        count: u16,
        add: i16,
    },

    /// Growing the pending-step ring failed.
    #[error("stepcompress oid={oid}: allocation failure growing queue to {requested} entries")]
    AllocationFailure { oid: u32, requested: usize },

    /// The injected transport rejected a batch of outgoing messages.
    #[error("stepcompress transport error: {0}")]
    TransportError(String),
}
