use super::{Emitter, RowBuilder, StrategySettings, WorkerError};
use crate::broker::{Broker, Message};
use crate::error::ConfigError;
use crate::model::Table;
use crate::relay::{handoff, HandoffReceiver};
use std::sync::Arc;

/// One group of `multiplier` rows per row of a single Each parent
pub struct FanOut {
    builder: RowBuilder,
    parent: String,
    multiplier: u32,
    handoff_capacity: usize,
    receiver: Option<HandoffReceiver>,
}

impl FanOut {
    pub fn new(
        builder: RowBuilder,
        table: &Table,
        settings: &StrategySettings,
    ) -> Result<Self, ConfigError> {
        let (_, each) = table
            .each_columns()
            .next()
            .ok_or_else(|| ConfigError::InvalidShape {
                table: table.name.clone(),
                reason: "fan-out requires an each relationship".to_string(),
            })?;

        Ok(Self {
            builder,
            parent: each.table.clone(),
            multiplier: each.multiplier,
            handoff_capacity: settings.handoff_capacity,
            receiver: None,
        })
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn initialize(&mut self, broker: &Broker) -> Result<(), WorkerError> {
        self.builder.initialize(broker)?;

        let (sender, receiver) = handoff(&self.parent, self.handoff_capacity);
        broker.topic(&self.parent)?.subscribe(Arc::new(sender))?;
        self.receiver = Some(receiver);
        Ok(())
    }

    pub fn generate(&mut self, emitter: &mut Emitter<'_>) -> Result<(), WorkerError> {
        // Dropped on return, which detaches us from the parent's topic
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| WorkerError::NotInitialized {
                table: self.builder.table().to_string(),
            })?;
        emitter.set_estimate(-1);

        loop {
            let parent_row = match receiver.take(emitter.cancel())? {
                Message::Row(row) => row,
                Message::Poison => return Ok(()),
            };
            self.builder.bind(&self.parent, parent_row);

            for _ in 0..self.multiplier {
                let row = self.builder.build(emitter.rows())?;
                if !emitter.emit(row)? {
                    return Ok(());
                }
            }
        }
    }
}
