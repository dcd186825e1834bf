//! Model configuration errors.
//!
//! All of these are detected before any worker starts and abort the run.

use crate::graph::GraphError;
use value_gen::GeneratorError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("model defines no tables")]
    EmptyModel,

    #[error("table '{0}' is defined more than once")]
    DuplicateTable(String),

    #[error("table '{table}' defines column '{column}' more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("column '{table}.{column}' must have exactly one value source, found {found}")]
    ValueSource {
        table: String,
        column: String,
        found: usize,
    },

    #[error("column '{table}.{column}' references unknown table '{target}'")]
    UnknownTable {
        table: String,
        column: String,
        target: String,
    },

    #[error("column '{table}.{column}' references unknown column '{target}'")]
    UnknownColumn {
        table: String,
        column: String,
        target: String,
    },

    #[error("column '{table}.{column}' references its own table")]
    SelfReference { table: String, column: String },

    #[error("column '{table}.{column}' has a multiplier of zero")]
    ZeroMultiplier { table: String, column: String },

    #[error("table '{table}' has an unsupported shape: {reason}")]
    InvalidShape { table: String, reason: String },

    #[error(transparent)]
    Cycle(#[from] GraphError),

    #[error("invalid expression for column '{table}.{column}': {reason}")]
    Template {
        table: String,
        column: String,
        reason: String,
    },

    #[error("invalid generator for column '{table}.{column}': {source}")]
    Generator {
        table: String,
        column: String,
        #[source]
        source: GeneratorError,
    },

    #[error("no table named '{0}' in the model")]
    NoSuchTable(String),

    #[error("{0}")]
    Unsupported(String),
}
