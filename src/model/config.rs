//! YAML representation of a model file.

use super::{Column, ColumnSource, EachTarget, Model, RefTarget, Table};
use crate::error::ConfigError;
use crate::model::Template;
use serde::{Deserialize, Serialize};
use value_gen::{GeneratorSpec, Literal};

fn default_multiplier() -> u32 {
    1
}

/// Complete model file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelFile {
    /// Run seed, overridden by `--seed`
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub tables: Vec<TableDef>,
}

/// One table as written in the model file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDef {
    pub name: String,
    /// Rows to generate; 0 means derived from an `each` parent
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

/// One column as written in the model file. Exactly one source must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDef {
    pub name: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<Literal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<RefDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub each: Option<EachDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefDef {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EachDef {
    pub table: String,
    pub column: String,
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

impl ModelFile {
    /// Convert into a [`Model`], checking that each column has one source.
    ///
    /// Cross-table checks are left to [`Model::validate`].
    pub fn into_model(self) -> Result<Model, ConfigError> {
        let tables = self
            .tables
            .into_iter()
            .map(TableDef::into_table)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Model::new(self.seed, tables))
    }
}

impl TableDef {
    fn into_table(self) -> Result<Table, ConfigError> {
        let table = self.name;
        let columns = self
            .columns
            .into_iter()
            .map(|c| c.into_column(&table))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Table::new(table, self.count, columns))
    }
}

impl ColumnDef {
    fn into_column(self, table: &str) -> Result<Column, ConfigError> {
        let found = [
            self.generator.is_some(),
            self.constant.is_some(),
            self.expression.is_some(),
            self.reference.is_some(),
            self.each.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if found != 1 {
            return Err(ConfigError::ValueSource {
                table: table.to_string(),
                column: self.name,
                found,
            });
        }

        let source = if let Some(spec) = self.generator {
            ColumnSource::Generator(spec)
        } else if let Some(literal) = self.constant {
            ColumnSource::Constant(literal.to_value())
        } else if let Some(expr) = self.expression {
            let template = Template::parse(&expr).map_err(|reason| ConfigError::Template {
                table: table.to_string(),
                column: self.name.clone(),
                reason,
            })?;
            ColumnSource::Expression(template)
        } else if let Some(r) = self.reference {
            ColumnSource::Ref(RefTarget {
                table: r.table,
                column: r.column,
            })
        } else if let Some(e) = self.each {
            ColumnSource::Each(EachTarget {
                table: e.table,
                column: e.column,
                multiplier: e.multiplier,
            })
        } else {
            unreachable!("source count checked above")
        };

        Ok(Column {
            name: self.name,
            hidden: self.hidden,
            source,
        })
    }
}
