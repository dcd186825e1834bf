//! Relationally-consistent synthetic test data.
//!
//! A [`Model`] describes tables, their columns and how columns relate to
//! other tables. An [`Orchestrator`] runs one worker per table; workers
//! exchange rows through an in-process [`broker`] so that every reference a
//! child row makes points at a row its parent actually produced.
//!
//! ```no_run
//! use relsynth::{MemorySinkFactory, Model, Orchestrator, RunConfig};
//!
//! let model = Model::from_yaml(r#"
//! tables:
//!   - name: users
//!     count: 3
//!     columns:
//!       - name: id
//!         generator: { type: sequence }
//!   - name: orders
//!     columns:
//!       - name: user_id
//!         each: { table: users, column: id, multiplier: 2 }
//! "#)?;
//!
//! let sinks = MemorySinkFactory::new();
//! let summary = Orchestrator::new(model, RunConfig::default()).run(&sinks)?;
//! assert_eq!(summary.output("orders").map(|o| o.rows), Some(6));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod broker;
pub mod cancel;
pub mod error;
pub mod graph;
pub mod model;
pub mod progress;
pub mod relay;
pub mod row;
pub mod run;
pub mod script;
pub mod sink;
pub mod strategy;

pub use cancel::CancelToken;
pub use error::ConfigError;
pub use model::Model;
pub use row::{Row, RowView};
pub use run::{Orchestrator, RunConfig, RunError, RunState, RunSummary, TableOutput};
pub use sink::{DelimitedSinkFactory, MemorySinkFactory, Sink, SinkFactory};
pub use strategy::StrategyKind;
pub use value_gen::Value;
