use super::StrategyKind;
use crate::error::ConfigError;
use crate::model::{Model, Table};

/// Pick the strategy for `table` from its relationship shape
pub fn classify(table: &Table) -> Result<StrategyKind, ConfigError> {
    for column in &table.columns {
        if column.source.parent() == Some(table.name.as_str()) {
            return Err(ConfigError::SelfReference {
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }
    }

    let shape = |reason: &str| ConfigError::InvalidShape {
        table: table.name.clone(),
        reason: reason.to_string(),
    };

    let each: Vec<_> = table.each_columns().map(|(_, e)| e).collect();
    if each.iter().any(|e| e.multiplier == 0) {
        return Err(shape("each multiplier must be greater than zero"));
    }

    match each.len() {
        0 if table.count > 0 => Ok(StrategyKind::Independent),
        0 => Err(shape(
            "count must be greater than zero for a table without an each relationship",
        )),
        _ if table.count != 0 => Err(shape(
            "count must be zero when rows are derived from an each relationship",
        )),
        1 => Ok(StrategyKind::FanOut),
        n => {
            let mut parents: Vec<&str> = each.iter().map(|e| e.table.as_str()).collect();
            parents.sort_unstable();
            parents.dedup();
            if parents.len() != n {
                return Err(shape("each relationships must target distinct tables"));
            }
            Ok(StrategyKind::CrossProduct)
        }
    }
}

/// Validate `model` and classify every table, in model order
pub fn classify_model(model: &Model) -> Result<Vec<StrategyKind>, ConfigError> {
    model.validate()?;
    model.tables().iter().map(classify).collect()
}
