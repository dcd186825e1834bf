//! Plan command - show how a model will be generated.

use anyhow::Result;
use relsynth::strategy::classify_model;
use relsynth::{Model, StrategyKind};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct TablePlan<'a> {
    table: &'a str,
    strategy: StrategyKind,
    level: usize,
    count: Option<u64>,
    parents: Vec<&'a str>,
}

#[derive(Serialize)]
struct Plan<'a> {
    tables: Vec<TablePlan<'a>>,
    order: Vec<&'a str>,
}

pub fn run(path: PathBuf, reverse: bool, json: bool) -> Result<()> {
    let model = Model::load(&path)?;
    let kinds = classify_model(&model)?;
    let graph = model.dependency_graph()?;
    let levels = graph.levels();

    let plan = Plan {
        tables: model
            .tables()
            .iter()
            .zip(kinds)
            .map(|(table, strategy)| TablePlan {
                table: &table.name,
                strategy,
                level: levels.get(table.name.as_str()).copied().unwrap_or(0),
                count: (strategy == StrategyKind::Independent).then_some(table.count),
                parents: table.parents(),
            })
            .collect(),
        order: graph.topological_sort(reverse),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Tables ({}):", plan.tables.len());
    for t in &plan.tables {
        let count = t
            .count
            .map(|n| format!("{} rows", n))
            .unwrap_or_else(|| "derived".to_string());
        print!("  [{}] {:<24} {:<14} {}", t.level, t.table, t.strategy, count);
        if !t.parents.is_empty() {
            print!("  <- {}", t.parents.join(", "));
        }
        println!();
    }

    println!();
    println!(
        "Import order{}:",
        if reverse { " (children first)" } else { "" }
    );
    for (i, name) in plan.order.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, name);
    }
    Ok(())
}
