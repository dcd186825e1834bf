//! In-memory sink for tests and library callers.

use super::{Sink, SinkFactory};
use crate::model::Table;
use crate::row::RowView;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use value_gen::Value;

/// Everything one table produced
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Row-count estimate passed with each row
    pub estimates: Vec<i64>,
    pub finished: bool,
}

impl MemoryTable {
    /// Values of one column across all rows
    pub fn column(&self, name: &str) -> Vec<Value> {
        match self.columns.iter().position(|c| c == name) {
            Some(i) => self.rows.iter().map(|r| r[i].clone()).collect(),
            None => Vec::new(),
        }
    }
}

type Shared = Arc<Mutex<AHashMap<String, MemoryTable>>>;

/// Collects rows per table. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySinkFactory {
    tables: Shared,
    limits: AHashMap<String, u64>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse rows for `table` once `rows` have been accepted
    pub fn with_limit(mut self, table: &str, rows: u64) -> Self {
        self.limits.insert(table.to_string(), rows);
        self
    }

    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.tables.lock().get(name).cloned()
    }

    pub fn row_count(&self, name: &str) -> usize {
        self.tables.lock().get(name).map_or(0, |t| t.rows.len())
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open(&self, table: &Table) -> io::Result<Box<dyn Sink>> {
        self.tables.lock().insert(
            table.name.clone(),
            MemoryTable {
                columns: table.visible_columns().iter().map(|c| c.to_string()).collect(),
                ..MemoryTable::default()
            },
        );
        Ok(Box::new(MemorySink {
            table: table.name.clone(),
            tables: Arc::clone(&self.tables),
            limit: self.limits.get(&table.name).copied(),
            accepted: 0,
        }))
    }
}

pub struct MemorySink {
    table: String,
    tables: Shared,
    limit: Option<u64>,
    accepted: u64,
}

impl Sink for MemorySink {
    fn consume(&mut self, row: RowView<'_>, estimate: i64) -> io::Result<bool> {
        if self.limit.is_some_and(|limit| self.accepted >= limit) {
            return Ok(false);
        }
        let mut tables = self.tables.lock();
        let entry = tables.entry(self.table.clone()).or_default();
        entry.rows.push(row.values().cloned().collect());
        entry.estimates.push(estimate);
        self.accepted += 1;
        Ok(self.limit.is_none_or(|limit| self.accepted < limit))
    }

    fn finish(&mut self) -> io::Result<()> {
        if let Some(entry) = self.tables.lock().get_mut(&self.table) {
            entry.finished = true;
        }
        Ok(())
    }

    fn locations(&self) -> Vec<String> {
        vec![format!("memory:{}", self.table)]
    }
}
