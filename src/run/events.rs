//! Lifecycle events and the observers that receive them.

use super::TableOutput;
use crate::strategy::StrategyKind;
use std::time::Duration;

/// Something that happened during a run
#[derive(Debug, Clone)]
pub enum RunEvent {
    WorkerStarted {
        table: String,
        strategy: StrategyKind,
        /// Row count known up front
        bounded: bool,
        /// Depth in the dependency graph
        level: usize,
    },
    WorkerProgress {
        table: String,
        position: u64,
        total: Option<u64>,
        elapsed: Duration,
    },
    WorkerCompleted {
        table: String,
        rows: u64,
        duration: Duration,
    },
    WorkerCancelled {
        table: String,
        rows: u64,
    },
    WorkerFailed {
        table: String,
        cause: String,
    },
    RunCompleted {
        outputs: Vec<TableOutput>,
    },
    RunFailed {
        cause: String,
    },
}

/// Passive receiver of run events. Called from worker threads.
pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &RunEvent);
}

/// Forwards events to several observers in registration order
#[derive(Default)]
pub struct Observers {
    observers: Vec<Box<dyn EventObserver>>,
}

impl Observers {
    pub fn push(&mut self, observer: Box<dyn EventObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl EventObserver for Observers {
    fn on_event(&self, event: &RunEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// Logs lifecycle events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn on_event(&self, event: &RunEvent) {
        match event {
            RunEvent::WorkerStarted {
                table,
                strategy,
                bounded,
                level,
            } => {
                tracing::info!(%table, %strategy, bounded, level, "worker started");
            }
            RunEvent::WorkerProgress {
                table,
                position,
                total,
                elapsed,
            } => {
                tracing::debug!(%table, position, ?total, elapsed_ms = elapsed.as_millis() as u64, "progress");
            }
            RunEvent::WorkerCompleted {
                table,
                rows,
                duration,
            } => {
                tracing::info!(%table, rows, elapsed_ms = duration.as_millis() as u64, "worker completed");
            }
            RunEvent::WorkerCancelled { table, rows } => {
                tracing::warn!(%table, rows, "worker cancelled");
            }
            RunEvent::WorkerFailed { table, cause } => {
                tracing::error!(%table, %cause, "worker failed");
            }
            RunEvent::RunCompleted { outputs } => {
                let rows: u64 = outputs.iter().map(|o| o.rows).sum();
                tracing::info!(tables = outputs.len(), rows, "run completed");
            }
            RunEvent::RunFailed { cause } => {
                tracing::error!(%cause, "run failed");
            }
        }
    }
}
