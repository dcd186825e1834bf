//! Integration tests for complete runs through the orchestrator

use parking_lot::Mutex;
use relsynth::broker::{Broker, Delivery, Listener, Message, PoisonGuard};
use relsynth::cancel::Cancelled;
use relsynth::model::Table;
use relsynth::row::RowView;
use relsynth::run::{EventObserver, RunEvent, TracingObserver};
use relsynth::relay::RelayError;
use relsynth::strategy::{Emitter, Strategy, StrategySettings, WorkerError};
use relsynth::{
    CancelToken, ConfigError, MemorySinkFactory, Model, Orchestrator, RunConfig, RunError,
    RunState, Sink, SinkFactory, StrategyKind,
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use value_gen::Value;

fn model(yaml: &str) -> Model {
    Model::from_yaml(yaml).unwrap()
}

fn seeded() -> RunConfig {
    RunConfig {
        seed: Some(7),
        ..RunConfig::default()
    }
}

fn ints(values: &[Value]) -> Vec<i64> {
    values
        .iter()
        .map(|v| match v {
            Value::Int(n) => *n,
            other => panic!("expected an integer, got {:?}", other),
        })
        .collect()
}

#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<RunEvent>>>);

impl EventLog {
    fn events(&self) -> Vec<RunEvent> {
        self.0.lock().clone()
    }
}

impl EventObserver for EventLog {
    fn on_event(&self, event: &RunEvent) {
        self.0.lock().push(event.clone());
    }
}

#[derive(Default)]
struct Recorder {
    rows: Mutex<u64>,
    poisons: Mutex<u64>,
}

impl Listener for Recorder {
    fn try_deliver(&self, message: &Message) -> Delivery {
        if message.is_poison() {
            *self.poisons.lock() += 1;
        } else {
            *self.rows.lock() += 1;
        }
        Delivery::Delivered
    }

    fn deliver(&self, message: &Message, _cancel: &CancelToken) -> Result<Delivery, Cancelled> {
        Ok(self.try_deliver(message))
    }
}

/// Memory sinks, except `failing` errors once it has taken `after` rows
struct FailingSinks {
    inner: MemorySinkFactory,
    failing: &'static str,
    after: u64,
}

struct FailingSink {
    taken: u64,
    after: u64,
}

impl Sink for FailingSink {
    fn consume(&mut self, _row: RowView<'_>, _estimate: i64) -> io::Result<bool> {
        if self.taken >= self.after {
            return Err(io::Error::other("disk full"));
        }
        self.taken += 1;
        Ok(true)
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn locations(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Memory sinks, except `table` panics on its first row
struct PanickingSinks {
    inner: MemorySinkFactory,
    table: &'static str,
}

struct PanickingSink;

impl Sink for PanickingSink {
    fn consume(&mut self, _row: RowView<'_>, _estimate: i64) -> io::Result<bool> {
        panic!("sink exploded");
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn locations(&self) -> Vec<String> {
        Vec::new()
    }
}

impl SinkFactory for PanickingSinks {
    fn open(&self, table: &Table) -> io::Result<Box<dyn Sink>> {
        if table.name == self.table {
            Ok(Box::new(PanickingSink))
        } else {
            self.inner.open(table)
        }
    }
}

impl SinkFactory for FailingSinks {
    fn open(&self, table: &Table) -> io::Result<Box<dyn Sink>> {
        if table.name == self.failing {
            Ok(Box::new(FailingSink {
                taken: 0,
                after: self.after,
            }))
        } else {
            self.inner.open(table)
        }
    }
}

#[test]
fn test_independent_table_emits_count_rows_with_estimate() {
    let model = model(
        r#"
tables:
  - name: users
    count: 5
    columns:
      - name: id
        generator: { type: sequence, start: 1 }
"#,
    );
    let sinks = MemorySinkFactory::new();
    let orchestrator = Orchestrator::new(model, seeded());

    let summary = orchestrator.run(&sinks).unwrap();

    let users = sinks.table("users").unwrap();
    assert_eq!(ints(&users.column("id")), vec![1, 2, 3, 4, 5]);
    assert_eq!(users.estimates, vec![5; 5]);
    assert!(users.finished);
    assert_eq!(summary.output("users").unwrap().rows, 5);
    assert_eq!(summary.output("users").unwrap().locations, vec!["memory:users"]);
    assert_eq!(orchestrator.state(), RunState::Completed);
}

#[test]
fn test_topic_receives_rows_then_one_poison() {
    let model = model(
        r#"
tables:
  - name: users
    count: 5
    columns:
      - name: id
        generator: { type: sequence }
"#,
    );
    let table = model.table("users").unwrap();
    let settings = StrategySettings {
        seed: 1,
        ..StrategySettings::default()
    };
    let mut strategy = Strategy::build(StrategyKind::Independent, table, &settings).unwrap();

    let broker = Broker::new(64, settings.cancel.clone());
    let recorder = Arc::new(Recorder::default());
    broker
        .topic("users")
        .unwrap()
        .subscribe(recorder.clone())
        .unwrap();
    strategy.initialize(&broker).unwrap();

    let sinks = MemorySinkFactory::new();
    let mut sink = sinks.open(table).unwrap();
    {
        let _poison = PoisonGuard::new(&broker, "users");
        let observer = TracingObserver;
        let mut emitter = Emitter::new(
            table,
            broker.publisher("users"),
            sink.as_mut(),
            &observer,
            settings.cancel.clone(),
            1_000,
        );
        strategy.generate(&mut emitter).unwrap();
        assert_eq!(emitter.rows(), 5);
    }
    broker.shutdown(Duration::from_secs(5));

    assert_eq!(*recorder.rows.lock(), 5);
    assert_eq!(*recorder.poisons.lock(), 1);
}

#[test]
fn test_fan_out_emits_multiplier_rows_per_parent() {
    let model = model(
        r#"
tables:
  - name: users
    count: 5
    columns:
      - name: id
        generator: { type: sequence, start: 1 }
  - name: orders
    columns:
      - name: id
        generator: { type: sequence, start: 100 }
      - name: user_id
        each: { table: users, column: id, multiplier: 3 }
"#,
    );
    let sinks = MemorySinkFactory::new();
    let summary = Orchestrator::new(model, seeded()).run(&sinks).unwrap();

    let orders = sinks.table("orders").unwrap();
    assert_eq!(orders.rows.len(), 15);
    assert_eq!(
        ints(&orders.column("user_id")),
        vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 5]
    );
    assert_eq!(ints(&orders.column("id")), (100..115).collect::<Vec<_>>());
    assert!(orders.estimates.iter().all(|&e| e <= 0));
    assert_eq!(summary.output("orders").unwrap().strategy, StrategyKind::FanOut);
}

#[test]
fn test_cross_product_covers_every_pair_once() {
    let model = model(
        r#"
tables:
  - name: a
    count: 3
    columns:
      - name: id
        generator: { type: sequence, start: 1 }
  - name: b
    count: 4
    columns:
      - name: id
        generator: { type: sequence, start: 1 }
  - name: ab
    columns:
      - name: a_id
        each: { table: a, column: id }
      - name: b_id
        each: { table: b, column: id }
"#,
    );
    let sinks = MemorySinkFactory::new();
    let summary = Orchestrator::new(model, seeded()).run(&sinks).unwrap();

    let ab = sinks.table("ab").unwrap();
    let pairs: Vec<(i64, i64)> = ints(&ab.column("a_id"))
        .into_iter()
        .zip(ints(&ab.column("b_id")))
        .collect();

    let mut expected = Vec::new();
    for a in 1..=3 {
        for b in 1..=4 {
            expected.push((a, b));
        }
    }
    assert_eq!(pairs, expected);
    assert_eq!(ab.estimates, vec![12; 12]);
    assert_eq!(
        summary.output("ab").unwrap().strategy,
        StrategyKind::CrossProduct
    );
}

#[test]
fn test_refs_to_one_parent_share_a_row() {
    let model = model(
        r#"
tables:
  - name: users
    count: 20
    columns:
      - name: id
        generator: { type: sequence, start: 1 }
      - name: name
        expression: "user-{id}"
  - name: orders
    count: 200
    columns:
      - name: user_id
        ref: { table: users, column: id }
      - name: user_name
        ref: { table: users, column: name }
"#,
    );
    let sinks = MemorySinkFactory::new();
    Orchestrator::new(model, seeded()).run(&sinks).unwrap();

    let orders = sinks.table("orders").unwrap();
    assert_eq!(orders.rows.len(), 200);
    for row in &orders.rows {
        let Value::Int(id) = row[0] else {
            panic!("unexpected id {:?}", row[0]);
        };
        assert!((1..=20).contains(&id));
        assert_eq!(row[1], Value::Text(format!("user-{}", id)));
    }
}

#[test]
fn test_ref_into_each_parent_uses_consumed_row() {
    let model = model(
        r#"
tables:
  - name: users
    count: 10
    columns:
      - name: id
        generator: { type: sequence, start: 1 }
      - name: name
        expression: "user-{id}"
  - name: orders
    columns:
      - name: user_id
        each: { table: users, column: id, multiplier: 2 }
      - name: user_name
        ref: { table: users, column: name }
"#,
    );
    let sinks = MemorySinkFactory::new();
    Orchestrator::new(model, seeded()).run(&sinks).unwrap();

    let orders = sinks.table("orders").unwrap();
    assert_eq!(orders.rows.len(), 20);
    for row in &orders.rows {
        let Value::Int(id) = row[0] else {
            panic!("unexpected id {:?}", row[0]);
        };
        assert_eq!(row[1], Value::Text(format!("user-{}", id)));
    }
}

#[test]
fn test_hidden_columns_are_published_but_not_written() {
    let model = model(
        r#"
tables:
  - name: users
    count: 3
    columns:
      - name: id
        generator: { type: sequence, start: 1 }
      - name: secret
        hidden: true
        constant: "s3"
  - name: logins
    columns:
      - name: user_id
        each: { table: users, column: id }
      - name: token
        ref: { table: users, column: secret }
"#,
    );
    let sinks = MemorySinkFactory::new();
    Orchestrator::new(model, seeded()).run(&sinks).unwrap();

    let users = sinks.table("users").unwrap();
    assert_eq!(users.columns, vec!["id"]);
    assert!(users.rows.iter().all(|r| r.len() == 1));

    let logins = sinks.table("logins").unwrap();
    assert_eq!(logins.column("token"), vec![Value::from("s3"); 3]);
}

#[test]
fn test_refused_child_does_not_block_parent() {
    let model = model(
        r#"
tables:
  - name: users
    count: 5000
    columns:
      - name: id
        generator: { type: sequence, start: 1 }
  - name: orders
    columns:
      - name: user_id
        each: { table: users, column: id }
"#,
    );
    let sinks = MemorySinkFactory::new().with_limit("orders", 10);
    let config = RunConfig {
        seed: Some(1),
        topic_capacity: 4,
        handoff_capacity: 2,
        ..RunConfig::default()
    };

    let summary = Orchestrator::new(model, config).run(&sinks).unwrap();

    assert_eq!(sinks.row_count("users"), 5000);
    assert_eq!(sinks.row_count("orders"), 10);
    assert_eq!(summary.output("orders").unwrap().rows, 10);
}

#[test]
fn test_import_order_is_parent_first() {
    let model = model(
        r#"
tables:
  - name: order_items
    columns:
      - name: order_id
        each: { table: orders, column: id }
  - name: orders
    columns:
      - name: id
        generator: { type: sequence }
      - name: user_id
        each: { table: users, column: id }
  - name: users
    count: 2
    columns:
      - name: id
        generator: { type: sequence }
"#,
    );
    let sinks = MemorySinkFactory::new();
    let summary = Orchestrator::new(model, seeded()).run(&sinks).unwrap();

    assert_eq!(summary.import_order, vec!["users", "orders", "order_items"]);
    let ordered: Vec<&str> = summary
        .ordered_outputs()
        .iter()
        .map(|o| o.table.as_str())
        .collect();
    assert_eq!(ordered, vec!["users", "orders", "order_items"]);
    assert_eq!(summary.total_rows(), 6);
}

#[test]
fn test_same_seed_same_rows() {
    let yaml = r#"
tables:
  - name: people
    count: 50
    columns:
      - name: age
        generator: { type: int_range, min: 18, max: 90 }
      - name: email
        generator: { type: fake, kind: email }
      - name: uid
        generator: { type: uuid }
"#;
    let first = MemorySinkFactory::new();
    let second = MemorySinkFactory::new();
    Orchestrator::new(model(yaml), seeded()).run(&first).unwrap();
    Orchestrator::new(model(yaml), seeded()).run(&second).unwrap();

    assert_eq!(
        first.table("people").unwrap().rows,
        second.table("people").unwrap().rows
    );

    let third = MemorySinkFactory::new();
    let other = RunConfig {
        seed: Some(8),
        ..RunConfig::default()
    };
    Orchestrator::new(model(yaml), other).run(&third).unwrap();
    assert_ne!(
        first.table("people").unwrap().rows,
        third.table("people").unwrap().rows
    );
}

#[test]
fn test_model_seed_used_when_config_has_none() {
    let model = model(
        r#"
seed: 99
tables:
  - name: t
    count: 1
    columns:
      - name: id
        generator: { type: sequence }
"#,
    );
    let summary = Orchestrator::new(model, RunConfig::default())
        .run(&MemorySinkFactory::new())
        .unwrap();
    assert_eq!(summary.seed, 99);
}

#[test]
fn test_sink_failure_names_table_and_stops_run() {
    let model = model(
        r#"
tables:
  - name: users
    count: 1000000
    columns:
      - name: id
        generator: { type: sequence }
  - name: orders
    columns:
      - name: user_id
        each: { table: users, column: id }
"#,
    );
    let sinks = FailingSinks {
        inner: MemorySinkFactory::new(),
        failing: "users",
        after: 10,
    };
    let log = EventLog::default();
    let mut orchestrator = Orchestrator::new(model, seeded());
    orchestrator.add_observer(Box::new(log.clone()));

    let err = orchestrator.run(&sinks).unwrap_err();

    match err {
        RunError::WorkerFailed { table, source } => {
            assert_eq!(table, "users");
            assert!(matches!(source, WorkerError::Sink { .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(orchestrator.state(), RunState::Failed);

    let failed: Vec<String> = log
        .events()
        .iter()
        .filter_map(|e| match e {
            RunEvent::WorkerFailed { table, .. } => Some(table.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec!["users"]);
    assert!(log
        .events()
        .iter()
        .any(|e| matches!(e, RunEvent::RunFailed { .. })));
}

#[test]
fn test_cancel_stops_blocked_workers() {
    let model = model(
        r#"
tables:
  - name: users
    count: 50000000
    columns:
      - name: id
        generator: { type: sequence }
  - name: colors
    count: 3
    columns:
      - name: name
        generator: { type: one_of, values: [red, green, blue] }
  - name: orders
    columns:
      - name: user_id
        each: { table: users, column: id }
  - name: palettes
    columns:
      - name: user_id
        each: { table: users, column: id }
      - name: color
        each: { table: colors, column: name }
"#,
    );
    let config = RunConfig {
        seed: Some(3),
        topic_capacity: 8,
        handoff_capacity: 4,
        ..RunConfig::default()
    };
    let log = EventLog::default();
    let mut orchestrator = Orchestrator::new(model, config);
    orchestrator.add_observer(Box::new(log.clone()));
    let tables = ["users", "colors", "orders", "palettes"];
    let recorders: Vec<Arc<Recorder>> = tables
        .iter()
        .map(|table| {
            let recorder = Arc::new(Recorder::default());
            orchestrator.add_listener(table, recorder.clone()).unwrap();
            recorder
        })
        .collect();
    let token = orchestrator.cancel_token();

    let started = Instant::now();
    let handle = std::thread::spawn(move || {
        let result = orchestrator.run(&MemorySinkFactory::new());
        (result, orchestrator.state())
    });

    std::thread::sleep(Duration::from_millis(300));
    token.cancel();
    let (result, state) = handle.join().unwrap();

    assert!(matches!(result, Err(RunError::Cancelled)), "{:?}", result.err());
    assert_eq!(state, RunState::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(!log
        .events()
        .iter()
        .any(|e| matches!(e, RunEvent::WorkerFailed { .. })));
    for (table, recorder) in tables.iter().zip(&recorders) {
        assert_eq!(*recorder.poisons.lock(), 1, "poison markers seen on '{}'", table);
    }
}

#[test]
fn test_ref_to_parent_stalled_behind_child_times_out() {
    // b needs every row of a before it emits anything, while d holds a's
    // dispatcher waiting for a row of b
    let model = model(
        r#"
tables:
  - name: a
    count: 200
    columns:
      - name: id
        generator: { type: sequence, start: 1 }
  - name: x
    count: 2
    columns:
      - name: id
        generator: { type: sequence, start: 1 }
  - name: b
    columns:
      - name: a_id
        each: { table: a, column: id }
      - name: x_id
        each: { table: x, column: id }
      - name: id
        expression: "{a_id}-{x_id}"
  - name: d
    columns:
      - name: a_id
        each: { table: a, column: id }
      - name: b_id
        ref: { table: b, column: id }
"#,
    );
    let config = RunConfig {
        seed: Some(5),
        topic_capacity: 4,
        handoff_capacity: 4,
        sample_timeout: Some(Duration::from_millis(500)),
        ..RunConfig::default()
    };
    let orchestrator = Orchestrator::new(model, config);

    let started = Instant::now();
    let handle = std::thread::spawn(move || {
        let result = orchestrator.run(&MemorySinkFactory::new());
        (result, orchestrator.state())
    });
    let (result, state) = handle.join().unwrap();

    match result {
        Err(RunError::WorkerFailed { table, source }) => {
            assert_eq!(table, "d");
            assert!(
                matches!(
                    source,
                    WorkerError::Relay(RelayError::ParentStalled { ref table, .. }) if table == "b"
                ),
                "{}",
                source
            );
        }
        other => panic!("unexpected result: {:?}", other.map(|s| s.total_rows())),
    }
    assert_eq!(state, RunState::Failed);
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn test_worker_panic_fails_run() {
    let model = model(
        r#"
tables:
  - name: users
    count: 100000
    columns:
      - name: id
        generator: { type: sequence }
  - name: orders
    columns:
      - name: user_id
        each: { table: users, column: id }
"#,
    );
    let sinks = PanickingSinks {
        inner: MemorySinkFactory::new(),
        table: "orders",
    };
    let recorder = Arc::new(Recorder::default());
    let mut orchestrator = Orchestrator::new(model, seeded());
    orchestrator.add_listener("orders", recorder.clone()).unwrap();

    let err = orchestrator.run(&sinks).unwrap_err();

    match err {
        RunError::WorkerFailed { table, source } => {
            assert_eq!(table, "orders");
            match source {
                WorkerError::Panicked { message, .. } => assert_eq!(message, "sink exploded"),
                other => panic!("unexpected worker error: {}", other),
            }
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert_eq!(*recorder.poisons.lock(), 1);
}

#[test]
fn test_listener_needs_known_table() {
    let model = model(
        r#"
tables:
  - name: t
    count: 1
    columns:
      - name: id
        generator: { type: sequence }
"#,
    );
    let mut orchestrator = Orchestrator::new(model, seeded());
    let err = orchestrator
        .add_listener("missing", Arc::new(Recorder::default()))
        .unwrap_err();
    assert!(matches!(err, ConfigError::NoSuchTable(ref t) if t == "missing"));

    let recorder = Arc::new(Recorder::default());
    orchestrator.add_listener("t", recorder.clone()).unwrap();
    orchestrator.run(&MemorySinkFactory::new()).unwrap();
    assert_eq!(*recorder.rows.lock(), 1);
    assert_eq!(*recorder.poisons.lock(), 1);
}

#[test]
fn test_config_error_fails_before_workers_start() {
    let mut bad = model(
        r#"
tables:
  - name: a
    count: 1
    columns:
      - name: id
        generator: { type: sequence }
"#,
    )
    .tables()
    .to_vec();
    // Count and an Each parent on one table cannot be classified
    bad.push(Table::new(
        "b",
        5,
        vec![relsynth::model::Column::new(
            "a_id",
            relsynth::model::ColumnSource::Each(relsynth::model::EachTarget {
                table: "a".into(),
                column: "id".into(),
                multiplier: 1,
            }),
        )],
    ));

    let log = EventLog::default();
    let mut orchestrator = Orchestrator::new(Model::new(Some(1), bad), RunConfig::default());
    orchestrator.add_observer(Box::new(log.clone()));
    let sinks = MemorySinkFactory::new();

    let err = orchestrator.run(&sinks).unwrap_err();
    assert!(matches!(err, RunError::Config(_)));
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert!(sinks.table("a").is_none());
    assert!(!log
        .events()
        .iter()
        .any(|e| matches!(e, RunEvent::WorkerStarted { .. })));
}

#[test]
fn test_orchestrator_runs_once() {
    let model = model(
        r#"
tables:
  - name: t
    count: 1
    columns:
      - name: id
        generator: { type: sequence }
"#,
    );
    let orchestrator = Orchestrator::new(model, seeded());
    let sinks = MemorySinkFactory::new();
    orchestrator.run(&sinks).unwrap();
    assert!(matches!(
        orchestrator.run(&sinks),
        Err(RunError::AlreadyStarted)
    ));
}

#[test]
fn test_events_cover_worker_lifecycle() {
    let model = model(
        r#"
tables:
  - name: users
    count: 25
    columns:
      - name: id
        generator: { type: sequence }
  - name: orders
    columns:
      - name: user_id
        each: { table: users, column: id }
"#,
    );
    let log = EventLog::default();
    let config = RunConfig {
        seed: Some(1),
        progress_every: 10,
        ..RunConfig::default()
    };
    let mut orchestrator = Orchestrator::new(model, config);
    orchestrator.add_observer(Box::new(log.clone()));
    orchestrator.run(&MemorySinkFactory::new()).unwrap();

    let events = log.events();
    let started: Vec<(String, bool, usize)> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::WorkerStarted {
                table,
                bounded,
                level,
                ..
            } => Some((table.clone(), *bounded, *level)),
            _ => None,
        })
        .collect();
    assert_eq!(started.len(), 2);
    assert!(started.contains(&("users".to_string(), true, 0)));
    assert!(started.contains(&("orders".to_string(), false, 1)));

    let users_progress: Vec<(u64, Option<u64>)> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::WorkerProgress {
                table,
                position,
                total,
                ..
            } if table == "users" => Some((*position, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(
        users_progress,
        vec![(10, Some(25)), (20, Some(25)), (25, Some(25))]
    );

    let completed = events
        .iter()
        .filter(|e| matches!(e, RunEvent::WorkerCompleted { .. }))
        .count();
    assert_eq!(completed, 2);
    assert!(matches!(events.last(), Some(RunEvent::RunCompleted { .. })));
}
