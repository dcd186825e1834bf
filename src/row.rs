//! Generated rows and their visible projection.

use std::sync::Arc;
use value_gen::Value;

/// One generated row: insertion-ordered column names and values.
///
/// Column names are shared by every row of a table. Rows are immutable once
/// published and are passed around as `Arc<Row>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Project onto the given column positions
    pub fn view<'a>(&'a self, indices: &'a [usize]) -> RowView<'a> {
        RowView { row: self, indices }
    }
}

/// Borrowed projection of a row, used to hand only visible columns to sinks
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    row: &'a Row,
    indices: &'a [usize],
}

impl<'a> RowView<'a> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'a str> + 'a {
        let (row, indices) = (self.row, self.indices);
        indices.iter().map(move |&i| row.columns[i].as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &'a Value> + 'a {
        let (row, indices) = (self.row, self.indices);
        indices.iter().map(move |&i| &row.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.names().zip(self.values())
    }

    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.iter().find(|(name, _)| *name == column).map(|(_, v)| v)
    }

    /// Owned copy of the projected columns
    pub fn to_pairs(&self) -> Vec<(String, Value)> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }
}
