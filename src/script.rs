//! Import script generation.
//!
//! Emits one load statement per completed table, parents first, so foreign
//! keys resolve while importing.

use crate::error::ConfigError;
use crate::model::Model;
use crate::run::RunSummary;
use crate::sink::DelimitedFormat;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Target database for the import script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportDialect {
    #[default]
    Postgres,
    MySql,
}

impl std::str::FromStr for ImportDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(ImportDialect::Postgres),
            "mysql" | "mariadb" => Ok(ImportDialect::MySql),
            _ => Err(format!(
                "Unknown dialect: {}. Valid options: postgres, mysql",
                s
            )),
        }
    }
}

impl std::fmt::Display for ImportDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportDialect::Postgres => write!(f, "postgres"),
            ImportDialect::MySql => write!(f, "mysql"),
        }
    }
}

/// Renders load statements for files written by the delimited sink
#[derive(Debug, Clone)]
pub struct ImportScript {
    dialect: ImportDialect,
    format: DelimitedFormat,
    header: bool,
    gzip: bool,
}

impl ImportScript {
    /// Settings must match the ones the output files were written with.
    ///
    /// MySQL cannot load compressed files, so gzip output is rejected.
    pub fn new(
        dialect: ImportDialect,
        format: DelimitedFormat,
        header: bool,
        gzip: bool,
    ) -> Result<Self, ConfigError> {
        if gzip && dialect == ImportDialect::MySql {
            return Err(ConfigError::Unsupported(
                "gzip output cannot be imported with the mysql dialect".to_string(),
            ));
        }
        Ok(Self {
            dialect,
            format,
            header,
            gzip,
        })
    }

    pub fn dialect(&self) -> ImportDialect {
        self.dialect
    }

    /// Statements for every table in `summary`, in import order
    pub fn render(&self, summary: &RunSummary, model: &Model) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "-- Generated by relsynth (seed {})", summary.seed);
        let _ = writeln!(out, "-- Dialect: {}", self.dialect);

        for output in summary.ordered_outputs() {
            let Some(table) = model.table(&output.table) else {
                continue;
            };
            let columns = table.visible_columns();

            let _ = writeln!(out);
            let _ = writeln!(out, "-- {}: {} rows", output.table, output.rows);
            for location in &output.locations {
                let statement = match self.dialect {
                    ImportDialect::Postgres => self.postgres(&output.table, &columns, location),
                    ImportDialect::MySql => self.mysql(&output.table, &columns, location),
                };
                let _ = writeln!(out, "{}", statement);
            }
        }
        out
    }

    /// Render and write to `path`
    pub fn write(&self, path: &Path, summary: &RunSummary, model: &Model) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render(summary, model))
    }

    fn postgres(&self, table: &str, columns: &[&str], location: &str) -> String {
        let columns = columns
            .iter()
            .map(|c| quote_ident(c, '"'))
            .collect::<Vec<_>>()
            .join(", ");
        let source = if self.gzip {
            format!("PROGRAM {}", quote_literal(&format!("gzip -dc {}", location)))
        } else {
            quote_literal(location)
        };
        let delimiter = match self.format {
            DelimitedFormat::Csv => "','",
            DelimitedFormat::Tsv => "E'\\t'",
        };
        format!(
            "\\copy {} ({}) FROM {} WITH (FORMAT csv, HEADER {}, DELIMITER {})",
            quote_ident(table, '"'),
            columns,
            source,
            self.header,
            delimiter
        )
    }

    fn mysql(&self, table: &str, columns: &[&str], location: &str) -> String {
        let columns = columns
            .iter()
            .map(|c| quote_ident(c, '`'))
            .collect::<Vec<_>>()
            .join(", ");
        let delimiter = match self.format {
            DelimitedFormat::Csv => "','",
            DelimitedFormat::Tsv => "'\\t'",
        };
        let ignore = if self.header { " IGNORE 1 LINES" } else { "" };
        format!(
            "LOAD DATA LOCAL INFILE {} INTO TABLE {} FIELDS TERMINATED BY {} OPTIONALLY ENCLOSED BY '\"' LINES TERMINATED BY '\\n'{} ({});",
            quote_literal(location),
            quote_ident(table, '`'),
            delimiter,
            ignore,
            columns
        )
    }
}

fn quote_ident(name: &str, quote: char) -> String {
    let escaped = name.replace(quote, &format!("{0}{0}", quote));
    format!("{0}{1}{0}", quote, escaped)
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote_ident("we\"ird", '"'), "\"we\"\"ird\"");
        assert_eq!(quote_ident("t", '`'), "`t`");
        assert_eq!(quote_literal("it's.csv"), "'it''s.csv'");
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("PostgreSQL".parse::<ImportDialect>(), Ok(ImportDialect::Postgres));
        assert_eq!("mysql".parse::<ImportDialect>(), Ok(ImportDialect::MySql));
        assert!("oracle".parse::<ImportDialect>().is_err());
    }
}
