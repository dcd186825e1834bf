//! Unit tests for model loading and validation

use relsynth::model::{ColumnSource, Model};
use relsynth::ConfigError;
use tempfile::TempDir;
use value_gen::{GeneratorSpec, Value};

const SHOP: &str = r#"
seed: 42
tables:
  - name: users
    count: 100
    columns:
      - name: id
        generator: { type: sequence, start: 1 }
      - name: email
        generator: { type: fake, kind: email }
      - name: salt
        hidden: true
        constant: "s3"
      - name: handle
        expression: "{email}-{index}"
  - name: products
    count: 10
    columns:
      - name: id
        generator: { type: sequence }
  - name: orders
    columns:
      - name: user_id
        each: { table: users, column: id, multiplier: 3 }
      - name: product_id
        ref: { table: products, column: id }
"#;

fn config_error(yaml: &str) -> ConfigError {
    let err = Model::from_yaml(yaml).expect_err("model should be rejected");
    match err.downcast::<ConfigError>() {
        Ok(config) => config,
        Err(other) => panic!("expected a ConfigError, got: {:#}", other),
    }
}

#[test]
fn test_parse_shop_model() {
    let model = Model::from_yaml(SHOP).unwrap();

    assert_eq!(model.seed(), Some(42));
    assert_eq!(model.len(), 3);

    let users = model.table("users").unwrap();
    assert_eq!(users.count, 100);
    assert_eq!(users.visible_columns(), vec!["id", "email", "handle"]);
    assert!(users.column("salt").unwrap().hidden);
    assert_eq!(
        users.column("salt").unwrap().source,
        ColumnSource::Constant(Value::from("s3"))
    );
    assert_eq!(
        users.column("id").unwrap().source,
        ColumnSource::Generator(GeneratorSpec::Sequence { start: 1, step: 1 })
    );

    let orders = model.table("orders").unwrap();
    assert_eq!(orders.count, 0);
    assert_eq!(orders.parents(), vec!["users", "products"]);
    let (_, each) = orders.each_columns().next().unwrap();
    assert_eq!(each.multiplier, 3);
}

#[test]
fn test_multiplier_defaults_to_one() {
    let model = Model::from_yaml(
        r#"
tables:
  - name: a
    count: 1
    columns:
      - name: id
        generator: { type: uuid }
  - name: b
    columns:
      - name: a_id
        each: { table: a, column: id }
"#,
    )
    .unwrap();
    let (_, each) = model.table("b").unwrap().each_columns().next().unwrap();
    assert_eq!(each.multiplier, 1);
}

#[test]
fn test_rejects_several_sources() {
    let err = config_error(
        r#"
tables:
  - name: t
    count: 1
    columns:
      - name: id
        generator: { type: sequence }
        constant: 5
"#,
    );
    assert!(matches!(err, ConfigError::ValueSource { found: 2, .. }), "{}", err);
}

#[test]
fn test_rejects_missing_source() {
    let err = config_error(
        r#"
tables:
  - name: t
    count: 1
    columns:
      - name: id
"#,
    );
    assert!(matches!(err, ConfigError::ValueSource { found: 0, .. }), "{}", err);
}

#[test]
fn test_rejects_unknown_table() {
    let err = config_error(
        r#"
tables:
  - name: t
    count: 1
    columns:
      - name: other_id
        ref: { table: missing, column: id }
"#,
    );
    assert!(
        matches!(err, ConfigError::UnknownTable { ref target, .. } if target == "missing"),
        "{}",
        err
    );
}

#[test]
fn test_rejects_unknown_column() {
    let err = config_error(
        r#"
tables:
  - name: a
    count: 1
    columns:
      - name: id
        generator: { type: sequence }
  - name: b
    count: 1
    columns:
      - name: a_code
        ref: { table: a, column: code }
"#,
    );
    assert!(matches!(err, ConfigError::UnknownColumn { .. }), "{}", err);
}

#[test]
fn test_rejects_self_reference() {
    let err = config_error(
        r#"
tables:
  - name: nodes
    count: 3
    columns:
      - name: id
        generator: { type: sequence }
      - name: parent_id
        ref: { table: nodes, column: id }
"#,
    );
    assert!(matches!(err, ConfigError::SelfReference { .. }), "{}", err);
}

#[test]
fn test_rejects_zero_multiplier() {
    let err = config_error(
        r#"
tables:
  - name: a
    count: 1
    columns:
      - name: id
        generator: { type: sequence }
  - name: b
    columns:
      - name: a_id
        each: { table: a, column: id, multiplier: 0 }
"#,
    );
    assert!(matches!(err, ConfigError::ZeroMultiplier { .. }), "{}", err);
}

#[test]
fn test_rejects_template_with_later_column() {
    let err = config_error(
        r#"
tables:
  - name: t
    count: 1
    columns:
      - name: label
        expression: "{name}!"
      - name: name
        constant: x
"#,
    );
    match err {
        ConfigError::Template { reason, .. } => assert!(reason.contains("after"), "{}", reason),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_rejects_duplicate_names() {
    let err = config_error(
        r#"
tables:
  - name: t
    count: 1
    columns:
      - name: id
        constant: 1
  - name: t
    count: 1
    columns:
      - name: id
        constant: 1
"#,
    );
    assert!(matches!(err, ConfigError::DuplicateTable(ref t) if t == "t"));

    let err = config_error(
        r#"
tables:
  - name: t
    count: 1
    columns:
      - name: id
        constant: 1
      - name: id
        constant: 2
"#,
    );
    assert!(matches!(err, ConfigError::DuplicateColumn { .. }));
}

#[test]
fn test_rejects_cycle() {
    let err = config_error(
        r#"
tables:
  - name: a
    count: 1
    columns:
      - name: id
        constant: 1
      - name: b_id
        ref: { table: b, column: id }
  - name: b
    count: 1
    columns:
      - name: id
        constant: 1
      - name: a_id
        ref: { table: a, column: id }
"#,
    );
    assert!(matches!(err, ConfigError::Cycle(_)), "{}", err);
}

#[test]
fn test_rejects_invalid_generator() {
    let err = config_error(
        r#"
tables:
  - name: t
    count: 1
    columns:
      - name: n
        generator: { type: int_range, min: 10, max: 1 }
"#,
    );
    assert!(matches!(err, ConfigError::Generator { .. }), "{}", err);
}

#[test]
fn test_rejects_float_range_without_finite_span() {
    let err = config_error(
        r#"
tables:
  - name: t
    count: 1
    columns:
      - name: x
        generator: { type: float_range, min: -1.0e308, max: 1.0e308 }
"#,
    );
    assert!(
        matches!(
            err,
            ConfigError::Generator {
                source: value_gen::GeneratorError::NonFiniteRange { .. },
                ..
            }
        ),
        "{}",
        err
    );
}

#[test]
fn test_rejects_empty_model() {
    assert!(matches!(config_error("tables: []"), ConfigError::EmptyModel));
}

#[test]
fn test_rejects_unknown_fields() {
    let err = Model::from_yaml(
        r#"
tables:
  - name: t
    rows: 5
"#,
    )
    .unwrap_err();
    assert!(format!("{:#}", err).contains("rows"), "{:#}", err);
}

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shop.yaml");
    std::fs::write(&path, SHOP).unwrap();

    let model = Model::load(&path).unwrap();
    assert_eq!(model.len(), 3);

    let missing = Model::load(&dir.path().join("nope.yaml")).unwrap_err();
    assert!(format!("{:#}", missing).contains("nope.yaml"));
}

#[test]
fn test_dependency_graph_from_model() {
    let model = Model::from_yaml(SHOP).unwrap();
    let graph = model.dependency_graph().unwrap();
    let order = graph.topological_sort(false);

    let pos = |name: &str| order.iter().position(|t| *t == name).unwrap();
    assert!(pos("users") < pos("orders"));
    assert!(pos("products") < pos("orders"));
}
