//! One row per combination of several Each parents.
//!
//! Every dimension is drained into memory before emission starts, so the
//! parents' own row counts bound the work. Draining multiplexes all
//! dimensions through one `Select`; a parent blocked behind one dimension's
//! full queue never starves another.

use super::{Emitter, RowBuilder, StrategySettings, WorkerError};
use crate::broker::{Broker, Message};
use crate::cancel::{CancelToken, WAIT_SLICE};
use crate::model::Table;
use crate::relay::{handoff, HandoffReceiver, RelayError};
use crate::row::Row;
use crossbeam_channel::Select;
use std::sync::Arc;

/// Combination counts above this are logged as a warning
pub const CROSS_PRODUCT_WARN_THRESHOLD: u64 = 10_000_000;

pub struct CrossProduct {
    builder: RowBuilder,
    /// Distinct Each parents in column order
    dimensions: Vec<String>,
    handoff_capacity: usize,
    receivers: Vec<HandoffReceiver>,
}

impl CrossProduct {
    pub fn new(builder: RowBuilder, table: &Table, settings: &StrategySettings) -> Self {
        let mut dimensions: Vec<String> = Vec::new();
        for (_, each) in table.each_columns() {
            if !dimensions.contains(&each.table) {
                dimensions.push(each.table.clone());
            }
        }
        Self {
            builder,
            dimensions,
            handoff_capacity: settings.handoff_capacity,
            receivers: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn initialize(&mut self, broker: &Broker) -> Result<(), WorkerError> {
        self.builder.initialize(broker)?;

        for dimension in &self.dimensions {
            let (sender, receiver) = handoff(dimension, self.handoff_capacity);
            broker.topic(dimension)?.subscribe(Arc::new(sender))?;
            self.receivers.push(receiver);
        }
        Ok(())
    }

    pub fn generate(&mut self, emitter: &mut Emitter<'_>) -> Result<(), WorkerError> {
        if self.receivers.len() != self.dimensions.len() {
            return Err(WorkerError::NotInitialized {
                table: self.builder.table().to_string(),
            });
        }

        let receivers = std::mem::take(&mut self.receivers);
        let lists = drain(&receivers, emitter.cancel())?;
        drop(receivers);

        let total = lists
            .iter()
            .fold(1u64, |acc, list| acc.saturating_mul(list.len() as u64));
        if total > CROSS_PRODUCT_WARN_THRESHOLD {
            tracing::warn!(
                table = %self.builder.table(),
                combinations = total,
                "cross product is very large"
            );
        }
        tracing::debug!(
            table = %self.builder.table(),
            sizes = ?lists.iter().map(Vec::len).collect::<Vec<_>>(),
            "dimensions drained"
        );
        emitter.set_estimate(i64::try_from(total).unwrap_or(i64::MAX));
        if total == 0 {
            return Ok(());
        }

        // Odometer over the dimensions, last one varying fastest
        let mut position = vec![0usize; lists.len()];
        loop {
            for (d, list) in lists.iter().enumerate() {
                self.builder
                    .bind(&self.dimensions[d], Arc::clone(&list[position[d]]));
            }
            let row = self.builder.build(emitter.rows())?;
            if !emitter.emit(row)? {
                return Ok(());
            }

            let mut d = lists.len();
            loop {
                if d == 0 {
                    return Ok(());
                }
                d -= 1;
                position[d] += 1;
                if position[d] < lists[d].len() {
                    break;
                }
                position[d] = 0;
            }
        }
    }
}

/// Read every dimension until its poison marker
fn drain(
    receivers: &[HandoffReceiver],
    cancel: &CancelToken,
) -> Result<Vec<Vec<Arc<Row>>>, WorkerError> {
    let mut lists: Vec<Vec<Arc<Row>>> = vec![Vec::new(); receivers.len()];
    let mut select = Select::new();
    for receiver in receivers {
        select.recv(receiver.channel());
    }

    let mut open = receivers.len();
    while open > 0 {
        cancel.check()?;
        let operation = match select.select_timeout(WAIT_SLICE) {
            Ok(operation) => operation,
            Err(_) => continue,
        };
        let i = operation.index();
        match operation.recv(receivers[i].channel()) {
            Ok(Message::Row(row)) => lists[i].push(row),
            Ok(Message::Poison) => {
                select.remove(i);
                open -= 1;
            }
            Err(_) => {
                return Err(RelayError::Disconnected {
                    table: receivers[i].table().to_string(),
                }
                .into())
            }
        }
    }

    Ok(lists)
}
