//! Row-generation strategies.
//!
//! Each table is driven by exactly one strategy, chosen by [`classify`]:
//! - `independent`: a fixed number of rows, parents only sampled (Ref)
//! - `fan_out`: one row group per parent row of a single Each parent
//! - `cross_product`: one row per combination of several Each parents
//!
//! Column resolution lives in [`RowBuilder`]; publishing, sink hand-off and
//! progress reporting live in [`Emitter`].

mod classify;
mod cross_product;
mod emit;
mod fan_out;
mod independent;
mod row;

pub use classify::{classify, classify_model};
pub use cross_product::{CrossProduct, CROSS_PRODUCT_WARN_THRESHOLD};
pub use emit::Emitter;
pub use fan_out::FanOut;
pub use independent::Independent;
pub use row::{column_seed, RowBuilder};

use crate::broker::{Broker, BrokerError};
use crate::cancel::{CancelToken, Cancelled};
use crate::error::ConfigError;
use crate::model::Table;
use crate::relay::{
    RelayError, DEFAULT_HANDOFF_CAPACITY, DEFAULT_RING_CAPACITY, DEFAULT_SAMPLE_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which algorithm drives a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Independent,
    FanOut,
    CrossProduct,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Independent => "independent",
            StrategyKind::FanOut => "fan_out",
            StrategyKind::CrossProduct => "cross_product",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Errors that end a worker
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Relay(RelayError),

    #[error(transparent)]
    Broker(BrokerError),

    #[error("table '{table}': parent '{parent}' has no value for column '{column}'")]
    MissingValue {
        table: String,
        parent: String,
        column: String,
    },

    #[error("table '{table}': sink error: {source}")]
    Sink {
        table: String,
        #[source]
        source: std::io::Error,
    },

    #[error("table '{table}': failed to start worker thread: {source}")]
    Spawn {
        table: String,
        #[source]
        source: std::io::Error,
    },

    #[error("table '{table}': worker panicked: {message}")]
    Panicked { table: String, message: String },

    #[error("table '{table}': strategy used before initialize()")]
    NotInitialized { table: String },
}

impl WorkerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }
}

impl From<Cancelled> for WorkerError {
    fn from(_: Cancelled) -> Self {
        WorkerError::Cancelled
    }
}

impl From<RelayError> for WorkerError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Cancelled => WorkerError::Cancelled,
            other => WorkerError::Relay(other),
        }
    }
}

impl From<BrokerError> for WorkerError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Cancelled => WorkerError::Cancelled,
            other => WorkerError::Broker(other),
        }
    }
}

/// Per-run knobs a strategy needs when it is built
#[derive(Debug, Clone)]
pub struct StrategySettings {
    /// Run seed; generators derive their own seed from it
    pub seed: u64,
    pub handoff_capacity: usize,
    pub ring_capacity: usize,
    /// Longest wait for a sampled parent's first row
    pub sample_timeout: Option<Duration>,
    pub cancel: CancelToken,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            seed: 0,
            handoff_capacity: DEFAULT_HANDOFF_CAPACITY,
            ring_capacity: DEFAULT_RING_CAPACITY,
            sample_timeout: Some(DEFAULT_SAMPLE_TIMEOUT),
            cancel: CancelToken::new(),
        }
    }
}

/// A table's row producer
pub enum Strategy {
    Independent(Independent),
    FanOut(FanOut),
    CrossProduct(CrossProduct),
}

impl Strategy {
    /// Build the strategy `kind` for `table`. The table must already be
    /// classified as `kind`.
    pub fn build(
        kind: StrategyKind,
        table: &Table,
        settings: &StrategySettings,
    ) -> Result<Self, ConfigError> {
        let builder = RowBuilder::new(table, settings)?;
        Ok(match kind {
            StrategyKind::Independent => Strategy::Independent(Independent::new(builder, table.count)),
            StrategyKind::FanOut => Strategy::FanOut(FanOut::new(builder, table, settings)?),
            StrategyKind::CrossProduct => {
                Strategy::CrossProduct(CrossProduct::new(builder, table, settings))
            }
        })
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Independent(_) => StrategyKind::Independent,
            Strategy::FanOut(_) => StrategyKind::FanOut,
            Strategy::CrossProduct(_) => StrategyKind::CrossProduct,
        }
    }

    /// Row count known before generation starts
    pub fn bounded(&self) -> Option<u64> {
        match self {
            Strategy::Independent(s) => Some(s.count()),
            Strategy::FanOut(_) | Strategy::CrossProduct(_) => None,
        }
    }

    /// Subscribe to every parent topic this table reads from.
    ///
    /// Must complete before any worker passes the start barrier.
    pub fn initialize(&mut self, broker: &Broker) -> Result<(), WorkerError> {
        match self {
            Strategy::Independent(s) => s.initialize(broker),
            Strategy::FanOut(s) => s.initialize(broker),
            Strategy::CrossProduct(s) => s.initialize(broker),
        }
    }

    /// Stream rows into `emitter` until exhausted, refused, or cancelled
    pub fn generate(&mut self, emitter: &mut Emitter<'_>) -> Result<(), WorkerError> {
        match self {
            Strategy::Independent(s) => s.generate(emitter),
            Strategy::FanOut(s) => s.generate(emitter),
            Strategy::CrossProduct(s) => s.generate(emitter),
        }
    }
}
