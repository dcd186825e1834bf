//! Output sinks: where generated rows end up.

mod delimited;
mod memory;

pub use delimited::{DelimitedFormat, DelimitedOptions, DelimitedSink, DelimitedSinkFactory};
pub use memory::{MemorySink, MemorySinkFactory, MemoryTable};

use crate::model::Table;
use crate::row::RowView;
use std::io;

/// Receives the visible columns of every row a table produces
pub trait Sink: Send {
    /// Accept one row. `estimate` is the expected total row count, or `<= 0`
    /// when unknown. Returning `false` asks the producer to stop.
    fn consume(&mut self, row: RowView<'_>, estimate: i64) -> io::Result<bool>;

    /// Flush and close. Called once after the last row.
    fn finish(&mut self) -> io::Result<()>;

    /// Where the output went (file paths, or a label for in-memory sinks)
    fn locations(&self) -> Vec<String>;
}

/// Opens one sink per table
pub trait SinkFactory: Sync {
    fn open(&self, table: &Table) -> io::Result<Box<dyn Sink>>;
}
