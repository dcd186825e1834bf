use super::WorkerError;
use crate::broker::Publisher;
use crate::cancel::CancelToken;
use crate::model::Table;
use crate::row::Row;
use crate::run::events::{EventObserver, RunEvent};
use crate::sink::Sink;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Hands finished rows to the table's topic and sink.
///
/// Publishing comes first so dependents see every row the sink sees.
pub struct Emitter<'a> {
    table: String,
    publisher: Publisher,
    sink: &'a mut dyn Sink,
    visible: Vec<usize>,
    observer: &'a dyn EventObserver,
    cancel: CancelToken,
    estimate: i64,
    rows: u64,
    progress_every: u64,
    started: Instant,
}

impl<'a> Emitter<'a> {
    pub fn new(
        table: &Table,
        publisher: Publisher,
        sink: &'a mut dyn Sink,
        observer: &'a dyn EventObserver,
        cancel: CancelToken,
        progress_every: u64,
    ) -> Self {
        Self {
            table: table.name.clone(),
            publisher,
            sink,
            visible: table.visible_indices(),
            observer,
            cancel,
            estimate: -1,
            rows: 0,
            progress_every: progress_every.max(1),
            started: Instant::now(),
        }
    }

    /// Row-count estimate passed to the sink; `<= 0` means unknown
    pub fn set_estimate(&mut self, estimate: i64) {
        self.estimate = estimate;
    }

    pub fn estimate(&self) -> i64 {
        self.estimate
    }

    /// Rows emitted so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn check_cancel(&self) -> Result<(), WorkerError> {
        Ok(self.cancel.check()?)
    }

    /// Publish `row` and pass its visible columns to the sink.
    ///
    /// Returns `false` once the sink refuses further rows.
    pub fn emit(&mut self, row: Row) -> Result<bool, WorkerError> {
        self.check_cancel()?;

        let row = Arc::new(row);
        self.publisher.publish(&row)?;

        let more = self
            .sink
            .consume(row.view(&self.visible), self.estimate)
            .map_err(|source| WorkerError::Sink {
                table: self.table.clone(),
                source,
            })?;
        self.rows += 1;

        if self.rows % self.progress_every == 0 {
            self.report_progress();
        }
        Ok(more)
    }

    pub fn report_progress(&self) {
        self.observer.on_event(&RunEvent::WorkerProgress {
            table: self.table.clone(),
            position: self.rows,
            total: u64::try_from(self.estimate).ok().filter(|&n| n > 0),
            elapsed: self.elapsed(),
        });
    }
}
