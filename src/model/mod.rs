//! Declarative table model: tables, columns and their value sources.
//!
//! A model is loaded once, validated, and then shared read-only by every
//! worker of a run.

mod config;
mod template;

pub use config::{ColumnDef, EachDef, ModelFile, RefDef, TableDef};
pub use template::Template;

use crate::error::ConfigError;
use crate::graph::DependencyGraph;
use ahash::{AHashMap, AHashSet};
use anyhow::Context;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use value_gen::{GeneratorSpec, Value};

/// Target of a Ref relationship: sample a produced parent row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefTarget {
    pub table: String,
    pub column: String,
}

/// Target of an Each relationship: consume every parent row once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EachTarget {
    pub table: String,
    pub column: String,
    pub multiplier: u32,
}

/// Where a column's value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSource {
    Generator(GeneratorSpec),
    Constant(Value),
    Expression(Template),
    Ref(RefTarget),
    Each(EachTarget),
}

impl ColumnSource {
    /// Parent table for relationship sources
    pub fn parent(&self) -> Option<&str> {
        match self {
            ColumnSource::Ref(r) => Some(&r.table),
            ColumnSource::Each(e) => Some(&e.table),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// Computed and published, but not written to sinks
    pub hidden: bool,
    pub source: ColumnSource,
}

impl Column {
    pub fn new(name: impl Into<String>, source: ColumnSource) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            source,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    /// Target row count; 0 when derived from an Each parent
    pub count: u64,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, count: u64, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            count,
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn each_columns(&self) -> impl Iterator<Item = (usize, &EachTarget)> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match &c.source {
                ColumnSource::Each(e) => Some((i, e)),
                _ => None,
            })
    }

    pub fn ref_columns(&self) -> impl Iterator<Item = (usize, &RefTarget)> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match &c.source {
                ColumnSource::Ref(r) => Some((i, r)),
                _ => None,
            })
    }

    /// Positions of columns written to sinks
    pub fn visible_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.hidden)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn visible_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| !c.hidden)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// All column names, shared by every row of the table
    pub fn column_names(&self) -> Arc<[String]> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Distinct parent tables in column order
    pub fn parents(&self) -> Vec<&str> {
        let mut parents: Vec<&str> = Vec::new();
        for parent in self.columns.iter().filter_map(|c| c.source.parent()) {
            if !parents.contains(&parent) {
                parents.push(parent);
            }
        }
        parents
    }
}

/// A complete table model
#[derive(Debug, Clone, Default)]
pub struct Model {
    seed: Option<u64>,
    tables: Vec<Table>,
    index: AHashMap<String, usize>,
}

impl Model {
    pub fn new(seed: Option<u64>, tables: Vec<Table>) -> Self {
        let mut index = AHashMap::with_capacity(tables.len());
        for (i, table) in tables.iter().enumerate() {
            index.entry(table.name.clone()).or_insert(i);
        }
        Self {
            seed,
            tables,
            index,
        }
    }

    /// Load and validate a model file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid model file: {}", path.display()))
    }

    /// Parse and validate model YAML
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let file: ModelFile = serde_yaml_ng::from_str(text).context("Failed to parse model YAML")?;
        let model = file.into_model()?;
        model.validate()?;
        Ok(model)
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = Some(seed);
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.index.get(name).map(|&i| &self.tables[i])
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Structural checks across the whole model
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tables.is_empty() {
            return Err(ConfigError::EmptyModel);
        }

        let mut seen = AHashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(ConfigError::DuplicateTable(table.name.clone()));
            }
        }

        for table in &self.tables {
            self.validate_table(table)?;
        }

        self.dependency_graph().map(|_| ())
    }

    fn validate_table(&self, table: &Table) -> Result<(), ConfigError> {
        let mut names = AHashSet::new();
        for column in &table.columns {
            if !names.insert(column.name.as_str()) {
                return Err(ConfigError::DuplicateColumn {
                    table: table.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        for (i, column) in table.columns.iter().enumerate() {
            match &column.source {
                ColumnSource::Generator(spec) => {
                    spec.validate().map_err(|source| ConfigError::Generator {
                        table: table.name.clone(),
                        column: column.name.clone(),
                        source,
                    })?;
                }
                ColumnSource::Constant(_) => {}
                ColumnSource::Expression(template) => {
                    let earlier = &table.columns[..i];
                    for name in template.columns() {
                        if !earlier.iter().any(|c| c.name == name) {
                            let reason = if table.column(name).is_some() {
                                format!("'{}' is defined after this column", name)
                            } else {
                                format!("unknown column '{}'", name)
                            };
                            return Err(ConfigError::Template {
                                table: table.name.clone(),
                                column: column.name.clone(),
                                reason,
                            });
                        }
                    }
                }
                ColumnSource::Ref(target) => {
                    self.check_target(table, column, &target.table, &target.column)?;
                }
                ColumnSource::Each(target) => {
                    self.check_target(table, column, &target.table, &target.column)?;
                    if target.multiplier == 0 {
                        return Err(ConfigError::ZeroMultiplier {
                            table: table.name.clone(),
                            column: column.name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn check_target(
        &self,
        table: &Table,
        column: &Column,
        target_table: &str,
        target_column: &str,
    ) -> Result<(), ConfigError> {
        if target_table == table.name {
            return Err(ConfigError::SelfReference {
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }
        let parent = self
            .table(target_table)
            .ok_or_else(|| ConfigError::UnknownTable {
                table: table.name.clone(),
                column: column.name.clone(),
                target: target_table.to_string(),
            })?;
        if parent.column(target_column).is_none() {
            return Err(ConfigError::UnknownColumn {
                table: table.name.clone(),
                column: column.name.clone(),
                target: format!("{}.{}", target_table, target_column),
            });
        }
        Ok(())
    }

    /// Dependency graph over every table in the model
    pub fn dependency_graph(&self) -> Result<DependencyGraph, ConfigError> {
        let mut graph = DependencyGraph::new();
        for table in &self.tables {
            graph.add_table(&table.name);
        }
        for table in &self.tables {
            for parent in table.parents() {
                graph.add_edge(&table.name, parent)?;
            }
        }
        Ok(graph)
    }
}
