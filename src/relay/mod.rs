//! Relay queues between a parent table's topic and a dependent table.
//!
//! - [`handoff`]: strict FIFO, each parent row consumed exactly once (Each)
//! - [`SamplingRing`]: bounded ring sampled non-destructively (Ref)

mod handoff;
mod ring;

pub use handoff::{handoff, HandoffReceiver, HandoffSender, DEFAULT_HANDOFF_CAPACITY};
pub use ring::{SamplingRing, DEFAULT_RING_CAPACITY, DEFAULT_SAMPLE_TIMEOUT};

use crate::cancel::Cancelled;
use std::time::Duration;

/// Errors raised while waiting on a relay queue
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay wait cancelled")]
    Cancelled,

    #[error("parent table '{table}' finished without producing any rows")]
    ParentExhausted { table: String },

    #[error("parent table '{table}' produced no rows within {waited:?}; it may be blocked behind this table")]
    ParentStalled { table: String, waited: Duration },

    #[error("relay from parent table '{table}' disconnected")]
    Disconnected { table: String },
}

impl From<Cancelled> for RelayError {
    fn from(_: Cancelled) -> Self {
        RelayError::Cancelled
    }
}
