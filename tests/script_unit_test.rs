//! Unit tests for import script rendering

use relsynth::script::{ImportDialect, ImportScript};
use relsynth::sink::DelimitedFormat;
use relsynth::{ConfigError, Model, RunSummary, StrategyKind, TableOutput};
use std::time::Duration;
use tempfile::TempDir;

const MODEL: &str = r#"
tables:
  - name: orders
    columns:
      - name: user_id
        each: { table: users, column: id }
      - name: note
        hidden: true
        constant: x
  - name: users
    count: 2
    columns:
      - name: id
        generator: { type: sequence }
      - name: email
        generator: { type: fake, kind: email }
"#;

fn output(table: &str, strategy: StrategyKind, rows: u64, location: &str) -> TableOutput {
    TableOutput {
        table: table.to_string(),
        strategy,
        rows,
        duration: Duration::from_millis(5),
        locations: vec![location.to_string()],
    }
}

fn summary() -> RunSummary {
    RunSummary {
        seed: 42,
        tables: vec![
            output("orders", StrategyKind::FanOut, 2, "out/orders.csv"),
            output("users", StrategyKind::Independent, 2, "out/users.csv"),
        ],
        import_order: vec!["users".to_string(), "orders".to_string()],
        duration: Duration::from_millis(10),
    }
}

#[test]
fn test_postgres_script() {
    let model = Model::from_yaml(MODEL).unwrap();
    let script = ImportScript::new(ImportDialect::Postgres, DelimitedFormat::Csv, true, false)
        .unwrap();

    let text = script.render(&summary(), &model);

    assert!(text.starts_with("-- Generated by relsynth (seed 42)\n-- Dialect: postgres\n"));
    assert!(text.contains(
        "\\copy \"users\" (\"id\", \"email\") FROM 'out/users.csv' WITH (FORMAT csv, HEADER true, DELIMITER ',')"
    ));
    assert!(text.contains(
        "\\copy \"orders\" (\"user_id\") FROM 'out/orders.csv' WITH (FORMAT csv, HEADER true, DELIMITER ',')"
    ));
    let users = text.find("\"users\"").unwrap();
    let orders = text.find("\"orders\"").unwrap();
    assert!(users < orders, "parents must load first:\n{}", text);
}

#[test]
fn test_postgres_gzip_tsv() {
    let model = Model::from_yaml(MODEL).unwrap();
    let script =
        ImportScript::new(ImportDialect::Postgres, DelimitedFormat::Tsv, false, true).unwrap();

    let mut summary = summary();
    summary.tables[1].locations = vec!["out/users.tsv.gz".to_string()];
    let text = script.render(&summary, &model);

    assert!(text.contains(
        "FROM PROGRAM 'gzip -dc out/users.tsv.gz' WITH (FORMAT csv, HEADER false, DELIMITER E'\\t')"
    ));
}

#[test]
fn test_mysql_script() {
    let model = Model::from_yaml(MODEL).unwrap();
    let script =
        ImportScript::new(ImportDialect::MySql, DelimitedFormat::Csv, true, false).unwrap();

    let text = script.render(&summary(), &model);

    assert!(text.contains(
        "LOAD DATA LOCAL INFILE 'out/users.csv' INTO TABLE `users` FIELDS TERMINATED BY ',' OPTIONALLY ENCLOSED BY '\"' LINES TERMINATED BY '\\n' IGNORE 1 LINES (`id`, `email`);"
    ));
    assert!(text.contains("INTO TABLE `orders`"));
    assert!(!text.contains("`note`"));
}

#[test]
fn test_mysql_rejects_gzip() {
    let err = ImportScript::new(ImportDialect::MySql, DelimitedFormat::Csv, true, true)
        .unwrap_err();
    assert!(matches!(err, ConfigError::Unsupported(_)));
}

#[test]
fn test_write_creates_parent_dir() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scripts").join("import.sql");
    let model = Model::from_yaml(MODEL).unwrap();
    let script = ImportScript::new(ImportDialect::Postgres, DelimitedFormat::Csv, true, false)
        .unwrap();

    script.write(&path, &summary(), &model).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, script.render(&summary(), &model));
}
