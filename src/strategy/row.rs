//! Column resolution for one table.

use super::{StrategySettings, WorkerError};
use crate::broker::{Broker, BrokerError};
use crate::cancel::CancelToken;
use crate::error::ConfigError;
use crate::model::{ColumnSource, Table, Template};
use crate::relay::SamplingRing;
use crate::row::Row;
use ahash::RandomState;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use value_gen::{Value, ValueGenerator};

const SEED_K1: u64 = 0x243f_6a88_85a3_08d3;
const SEED_K2: u64 = 0x1319_8a2e_0370_7344;
const SEED_K3: u64 = 0xa409_3822_299f_31d0;

/// Key used for a table's Ref sampling stream
const SAMPLER_KEY: &str = "\0sampler";

/// Seed for one column's generator, derived from the run seed and the
/// `(table, column)` pair
pub fn column_seed(run_seed: u64, table: &str, column: &str) -> u64 {
    RandomState::with_seeds(run_seed, SEED_K1, SEED_K2, SEED_K3).hash_one((table, column))
}

enum Resolver {
    Generator(Box<dyn ValueGenerator>),
    Constant(Value),
    Expression(Template),
    /// Ref or Each: read `column` from the row held in parent slot `slot`
    Parent { slot: usize, column: String },
}

struct ParentSlot {
    table: String,
    /// Row supplied by the strategy (Each parents and Refs into them)
    bound: bool,
    /// Sampler for unbound parents, set by `initialize`
    ring: Option<Arc<SamplingRing>>,
    /// Parent row used by the row being built
    current: Option<Arc<Row>>,
}

/// Builds rows for a table, one column at a time in column order.
///
/// Every Ref column targeting the same parent within one row resolves
/// against the same sampled parent row.
pub struct RowBuilder {
    table: String,
    columns: Arc<[String]>,
    resolvers: Vec<Resolver>,
    parents: Vec<ParentSlot>,
    rng: ChaCha8Rng,
    ring_capacity: usize,
    sample_timeout: Option<Duration>,
    cancel: CancelToken,
}

impl RowBuilder {
    pub fn new(table: &Table, settings: &StrategySettings) -> Result<Self, ConfigError> {
        let bound: Vec<&str> = table.each_columns().map(|(_, e)| e.table.as_str()).collect();
        let mut parents: Vec<ParentSlot> = Vec::new();
        let mut resolvers = Vec::with_capacity(table.columns.len());

        for column in &table.columns {
            let resolver = match &column.source {
                ColumnSource::Generator(spec) => {
                    let seed = column_seed(settings.seed, &table.name, &column.name);
                    let gen = spec.build(seed).map_err(|source| ConfigError::Generator {
                        table: table.name.clone(),
                        column: column.name.clone(),
                        source,
                    })?;
                    Resolver::Generator(gen)
                }
                ColumnSource::Constant(value) => Resolver::Constant(value.clone()),
                ColumnSource::Expression(template) => Resolver::Expression(template.clone()),
                ColumnSource::Ref(target) => Resolver::Parent {
                    slot: slot_for(&mut parents, &target.table, &bound),
                    column: target.column.clone(),
                },
                ColumnSource::Each(target) => Resolver::Parent {
                    slot: slot_for(&mut parents, &target.table, &bound),
                    column: target.column.clone(),
                },
            };
            resolvers.push(resolver);
        }

        Ok(Self {
            table: table.name.clone(),
            columns: table.column_names(),
            resolvers,
            parents,
            rng: ChaCha8Rng::seed_from_u64(column_seed(settings.seed, &table.name, SAMPLER_KEY)),
            ring_capacity: settings.ring_capacity,
            sample_timeout: settings.sample_timeout,
            cancel: settings.cancel.clone(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &Arc<[String]> {
        &self.columns
    }

    /// Parent tables resolved by sampling rather than by the strategy
    pub fn sampled_parents(&self) -> impl Iterator<Item = &str> {
        self.parents
            .iter()
            .filter(|s| !s.bound)
            .map(|s| s.table.as_str())
    }

    /// Subscribe a sampling ring to every sampled parent
    pub fn initialize(&mut self, broker: &Broker) -> Result<(), BrokerError> {
        for slot in self.parents.iter_mut().filter(|s| !s.bound) {
            let ring = Arc::new(
                SamplingRing::new(&slot.table, self.ring_capacity)
                    .with_wait_limit(self.sample_timeout),
            );
            broker.topic(&slot.table)?.subscribe(ring.clone())?;
            slot.ring = Some(ring);
        }
        Ok(())
    }

    /// Supply the parent row used for `table` until the next bind
    pub fn bind(&mut self, table: &str, row: Arc<Row>) {
        if let Some(slot) = self.parents.iter_mut().find(|s| s.table == table) {
            slot.current = Some(row);
        }
    }

    /// Build the row at position `index`
    pub fn build(&mut self, index: u64) -> Result<Row, WorkerError> {
        let Self {
            table,
            columns,
            resolvers,
            parents,
            rng,
            cancel,
            ..
        } = self;

        for slot in parents.iter_mut().filter(|s| !s.bound) {
            slot.current = None;
        }

        let mut values: Vec<Value> = Vec::with_capacity(resolvers.len());
        for (i, resolver) in resolvers.iter_mut().enumerate() {
            let value = match resolver {
                Resolver::Generator(gen) => gen.next_value(),
                Resolver::Constant(value) => value.clone(),
                Resolver::Expression(template) => {
                    let earlier = &columns[..i];
                    let rendered = template.render(index, |name| {
                        earlier.iter().position(|c| c == name).map(|p| &values[p])
                    });
                    match rendered {
                        Ok(text) => Value::Text(text),
                        Err(column) => {
                            return Err(WorkerError::MissingValue {
                                table: table.clone(),
                                parent: table.clone(),
                                column,
                            })
                        }
                    }
                }
                Resolver::Parent { slot, column } => {
                    let slot = &mut parents[*slot];
                    let parent = if let Some(row) = &slot.current {
                        Arc::clone(row)
                    } else if let Some(ring) = slot.ring.clone() {
                        let row = ring.sample(&mut *rng, cancel)?;
                        slot.current = Some(Arc::clone(&row));
                        row
                    } else if slot.bound {
                        return Err(WorkerError::MissingValue {
                            table: table.clone(),
                            parent: slot.table.clone(),
                            column: column.clone(),
                        });
                    } else {
                        return Err(WorkerError::NotInitialized {
                            table: table.clone(),
                        });
                    };
                    parent
                        .get(column)
                        .cloned()
                        .ok_or_else(|| WorkerError::MissingValue {
                            table: table.clone(),
                            parent: slot.table.clone(),
                            column: column.clone(),
                        })?
                }
            };
            values.push(value);
        }

        Ok(Row::new(Arc::clone(columns), values))
    }
}

fn slot_for(parents: &mut Vec<ParentSlot>, table: &str, bound: &[&str]) -> usize {
    if let Some(i) = parents.iter().position(|s| s.table == table) {
        return i;
    }
    parents.push(ParentSlot {
        table: table.to_string(),
        bound: bound.contains(&table),
        ring: None,
        current: None,
    });
    parents.len() - 1
}
