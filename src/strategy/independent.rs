use super::{Emitter, RowBuilder, WorkerError};
use crate::broker::Broker;

/// Fixed row count; parents are only sampled
pub struct Independent {
    builder: RowBuilder,
    count: u64,
}

impl Independent {
    pub fn new(builder: RowBuilder, count: u64) -> Self {
        Self { builder, count }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn initialize(&mut self, broker: &Broker) -> Result<(), WorkerError> {
        Ok(self.builder.initialize(broker)?)
    }

    pub fn generate(&mut self, emitter: &mut Emitter<'_>) -> Result<(), WorkerError> {
        emitter.set_estimate(i64::try_from(self.count).unwrap_or(i64::MAX));

        for index in 0..self.count {
            emitter.check_cancel()?;
            let row = self.builder.build(index)?;
            if !emitter.emit(row)? {
                break;
            }
        }
        Ok(())
    }
}
