//! Run orchestration: one worker thread per table.
//!
//! A run moves through `Idle -> Starting -> Running` and ends in one of
//! `Completed`, `Cancelled` or `Failed`. During `Starting` the model is
//! validated, every table is classified and its strategy built, so
//! configuration errors never reach a worker. All workers then subscribe to
//! their parents, meet at the start barrier, and stream concurrently.

pub mod barrier;
pub mod events;

pub use barrier::StartBarrier;
pub use events::{EventObserver, Observers, RunEvent, TracingObserver};

use crate::broker::{Broker, BrokerError, Listener, PoisonGuard, DEFAULT_TOPIC_CAPACITY};
use crate::cancel::CancelToken;
use crate::error::ConfigError;
use crate::graph::DependencyGraph;
use crate::model::{Model, Table};
use crate::relay::{DEFAULT_HANDOFF_CAPACITY, DEFAULT_RING_CAPACITY, DEFAULT_SAMPLE_TIMEOUT};
use crate::sink::SinkFactory;
use crate::strategy::{
    classify_model, Emitter, Strategy, StrategyKind, StrategySettings, WorkerError,
};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_PROGRESS_EVERY: u64 = 10_000;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Tunables for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Overrides the model's seed. A random seed is drawn when neither is set.
    pub seed: Option<u64>,
    pub topic_capacity: usize,
    pub handoff_capacity: usize,
    pub ring_capacity: usize,
    /// Fail a Ref column whose parent has produced no row after this long.
    /// `None` waits indefinitely.
    pub sample_timeout: Option<Duration>,
    /// Emit a progress event every this many rows per table
    pub progress_every: u64,
    /// How long to wait for dispatcher threads at teardown
    pub shutdown_grace: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: None,
            topic_capacity: DEFAULT_TOPIC_CAPACITY,
            handoff_capacity: DEFAULT_HANDOFF_CAPACITY,
            ring_capacity: DEFAULT_RING_CAPACITY,
            sample_timeout: Some(DEFAULT_SAMPLE_TIMEOUT),
            progress_every: DEFAULT_PROGRESS_EVERY,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Starting,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// What one table produced
#[derive(Debug, Clone, Serialize)]
pub struct TableOutput {
    pub table: String,
    pub strategy: StrategyKind,
    pub rows: u64,
    #[serde(rename = "seconds", serialize_with = "as_secs")]
    pub duration: Duration,
    pub locations: Vec<String>,
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    /// Per-table results in model order
    pub tables: Vec<TableOutput>,
    /// Parent-first order for importing the output
    pub import_order: Vec<String>,
    #[serde(rename = "seconds", serialize_with = "as_secs")]
    pub duration: Duration,
}

impl RunSummary {
    pub fn output(&self, table: &str) -> Option<&TableOutput> {
        self.tables.iter().find(|t| t.table == table)
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    /// Outputs in import order
    pub fn ordered_outputs(&self) -> Vec<&TableOutput> {
        self.import_order
            .iter()
            .filter_map(|name| self.output(name))
            .collect()
    }
}

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("table '{table}' failed: {source}")]
    WorkerFailed {
        table: String,
        #[source]
        source: WorkerError,
    },

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("run cancelled")]
    Cancelled,

    #[error("orchestrator has already been run")]
    AlreadyStarted,
}

/// A table ready to be handed to its worker
struct Prepared<'m> {
    table: &'m Table,
    strategy: Strategy,
    level: usize,
}

/// Drives one run of a model
pub struct Orchestrator {
    model: Arc<Model>,
    config: RunConfig,
    observers: Observers,
    /// Extra subscribers attached to table topics
    listeners: Vec<(String, Arc<dyn Listener>)>,
    cancel: CancelToken,
    state: Mutex<RunState>,
}

impl Orchestrator {
    pub fn new(model: impl Into<Arc<Model>>, config: RunConfig) -> Self {
        Self {
            model: model.into(),
            config,
            observers: Observers::default(),
            listeners: Vec::new(),
            cancel: CancelToken::new(),
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn EventObserver>) {
        self.observers.push(observer);
    }

    /// Subscribe `listener` to every row `table` publishes, plus its poison
    /// marker. The listener is attached before any worker starts.
    pub fn add_listener(
        &mut self,
        table: &str,
        listener: Arc<dyn Listener>,
    ) -> Result<(), ConfigError> {
        if self.model.table(table).is_none() {
            return Err(ConfigError::NoSuchTable(table.to_string()));
        }
        self.listeners.push((table.to_string(), listener));
        Ok(())
    }

    /// Token that cancels this run when triggered from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock() = state;
    }

    /// Seed the run will use
    pub fn resolve_seed(&self) -> u64 {
        self.config
            .seed
            .or(self.model.seed())
            .unwrap_or_else(rand::random)
    }

    /// Generate every table into sinks opened from `sinks`
    pub fn run(&self, sinks: &dyn SinkFactory) -> Result<RunSummary, RunError> {
        {
            let mut state = self.state.lock();
            if *state != RunState::Idle {
                return Err(RunError::AlreadyStarted);
            }
            *state = RunState::Starting;
        }
        let started = Instant::now();
        let seed = self.resolve_seed();

        let prepared = match self.prepare(seed) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.set_state(RunState::Failed);
                self.observers.on_event(&RunEvent::RunFailed {
                    cause: err.to_string(),
                });
                return Err(err.into());
            }
        };
        tracing::debug!(tables = prepared.len(), seed, "starting workers");

        let barrier = StartBarrier::new(prepared.len());
        let broker = Broker::new(self.config.topic_capacity, self.cancel.clone());
        if let Err(err) = self.attach_listeners(&broker) {
            self.cancel.cancel();
            broker.shutdown(self.config.shutdown_grace);
            self.set_state(RunState::Failed);
            self.observers.on_event(&RunEvent::RunFailed {
                cause: err.to_string(),
            });
            return Err(err.into());
        }
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();

        self.set_state(RunState::Running);

        let (outputs, failure) = std::thread::scope(|scope| {
            let mut failure: Option<(String, WorkerError)> = None;

            for (i, item) in prepared.into_iter().enumerate() {
                let name = item.table.name.clone();
                let worker = Worker {
                    table: item.table,
                    level: item.level,
                    broker: &broker,
                    barrier: &barrier,
                    sinks,
                    observer: &self.observers,
                    cancel: self.cancel.clone(),
                    progress_every: self.config.progress_every,
                };
                let tx = outcome_tx.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("table-{}", name))
                    .spawn_scoped(scope, move || {
                        let result = worker.run(item.strategy);
                        let _ = tx.send((i, result));
                    });

                if let Err(source) = spawned {
                    // The barrier can no longer fill up
                    self.cancel.cancel();
                    failure.get_or_insert((name.clone(), WorkerError::Spawn { table: name, source }));
                    break;
                }
            }
            drop(outcome_tx);

            let mut outputs: Vec<Option<TableOutput>> = vec![None; self.model.len()];
            for (i, result) in outcome_rx.iter() {
                match result {
                    Ok(output) => outputs[i] = Some(output),
                    Err(err) if err.is_cancelled() => {}
                    Err(err) => {
                        if failure.is_none() {
                            self.cancel.cancel();
                            failure = Some((self.model.tables()[i].name.clone(), err));
                        }
                    }
                }
            }
            (outputs, failure)
        });

        broker.shutdown(self.config.shutdown_grace);

        if let Some((table, source)) = failure {
            self.set_state(RunState::Failed);
            let err = RunError::WorkerFailed { table, source };
            self.observers.on_event(&RunEvent::RunFailed {
                cause: err.to_string(),
            });
            return Err(err);
        }

        let outputs: Option<Vec<TableOutput>> = outputs.into_iter().collect();
        let outputs = match outputs {
            Some(outputs) if !self.cancel.is_cancelled() => outputs,
            _ => {
                self.set_state(RunState::Cancelled);
                self.observers.on_event(&RunEvent::RunFailed {
                    cause: RunError::Cancelled.to_string(),
                });
                return Err(RunError::Cancelled);
            }
        };

        let import_order = self.import_order(&outputs)?;
        let summary = RunSummary {
            seed,
            tables: outputs,
            import_order,
            duration: started.elapsed(),
        };

        self.set_state(RunState::Completed);
        self.observers.on_event(&RunEvent::RunCompleted {
            outputs: summary.tables.clone(),
        });
        Ok(summary)
    }

    /// Validate, classify and build a strategy for every table
    fn prepare(&self, seed: u64) -> Result<Vec<Prepared<'_>>, ConfigError> {
        let kinds = classify_model(&self.model)?;
        let graph = self.model.dependency_graph()?;
        let levels = graph.levels();

        let settings = StrategySettings {
            seed,
            handoff_capacity: self.config.handoff_capacity,
            ring_capacity: self.config.ring_capacity,
            sample_timeout: self.config.sample_timeout,
            cancel: self.cancel.clone(),
        };

        self.model
            .tables()
            .iter()
            .zip(kinds)
            .map(|(table, kind)| {
                Ok(Prepared {
                    table,
                    strategy: Strategy::build(kind, table, &settings)?,
                    level: levels.get(table.name.as_str()).copied().unwrap_or(0),
                })
            })
            .collect()
    }

    fn attach_listeners(&self, broker: &Broker) -> Result<(), BrokerError> {
        for (table, listener) in &self.listeners {
            broker.topic(table)?.subscribe(Arc::clone(listener))?;
        }
        Ok(())
    }

    /// Parent-first order over the completed tables
    fn import_order(&self, outputs: &[TableOutput]) -> Result<Vec<String>, ConfigError> {
        let mut graph = DependencyGraph::new();
        for output in outputs {
            graph.add_table(&output.table);
        }
        for output in outputs {
            if let Some(table) = self.model.table(&output.table) {
                for parent in table.parents() {
                    if graph.contains(parent) {
                        graph.add_edge(&table.name, parent)?;
                    }
                }
            }
        }
        Ok(graph
            .topological_sort(false)
            .into_iter()
            .map(String::from)
            .collect())
    }
}

/// Everything one worker thread needs
struct Worker<'a> {
    table: &'a Table,
    level: usize,
    broker: &'a Broker,
    barrier: &'a StartBarrier,
    sinks: &'a dyn SinkFactory,
    observer: &'a dyn EventObserver,
    cancel: CancelToken,
    progress_every: u64,
}

impl Worker<'_> {
    fn run(self, strategy: Strategy) -> Result<TableOutput, WorkerError> {
        // Created first so the topic is poisoned on every exit path
        let _poison = PoisonGuard::new(self.broker, self.table.name.clone());
        let mut rows = 0;

        let executed =
            panic::catch_unwind(AssertUnwindSafe(|| self.execute(strategy, &mut rows)));
        let result = executed.unwrap_or_else(|payload| {
            Err(WorkerError::Panicked {
                table: self.table.name.clone(),
                message: panic_message(payload.as_ref()),
            })
        });
        let table = self.table.name.clone();
        match &result {
            Ok(output) => self.observer.on_event(&RunEvent::WorkerCompleted {
                table,
                rows: output.rows,
                duration: output.duration,
            }),
            Err(err) if err.is_cancelled() => {
                self.observer
                    .on_event(&RunEvent::WorkerCancelled { table, rows })
            }
            Err(err) => {
                // Siblings must see the cancel before they see our poison
                self.cancel.cancel();
                self.observer.on_event(&RunEvent::WorkerFailed {
                    table,
                    cause: err.to_string(),
                });
            }
        }
        result
    }

    fn execute(&self, mut strategy: Strategy, rows: &mut u64) -> Result<TableOutput, WorkerError> {
        let table = self.table;
        let sink_error = |source| WorkerError::Sink {
            table: table.name.clone(),
            source,
        };

        strategy.initialize(self.broker)?;
        let mut sink = self.sinks.open(table).map_err(sink_error)?;

        self.barrier.arrive_and_wait(&self.cancel)?;
        let started = Instant::now();
        let publisher = self.broker.publisher(&table.name);

        self.observer.on_event(&RunEvent::WorkerStarted {
            table: table.name.clone(),
            strategy: strategy.kind(),
            bounded: strategy.bounded().is_some(),
            level: self.level,
        });
        tracing::trace!(table = %table.name, publishing = !publisher.is_null(), "barrier released");

        let mut emitter = Emitter::new(
            table,
            publisher,
            sink.as_mut(),
            self.observer,
            self.cancel.clone(),
            self.progress_every,
        );
        let generated = strategy.generate(&mut emitter);
        *rows = emitter.rows();
        generated?;
        emitter.report_progress();
        drop(emitter);

        sink.finish().map_err(sink_error)?;

        Ok(TableOutput {
            table: table.name.clone(),
            strategy: strategy.kind(),
            rows: *rows,
            duration: started.elapsed(),
            locations: sink.locations(),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
