//! Generate command - run a model and write data files plus an import script.

use anyhow::{Context, Result};
use relsynth::progress::ProgressObserver;
use relsynth::run::TracingObserver;
use relsynth::script::{ImportDialect, ImportScript};
use relsynth::sink::{DelimitedFormat, DelimitedOptions};
use relsynth::strategy::classify_model;
use relsynth::{DelimitedSinkFactory, Model, Orchestrator, RunConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Generate command options
pub struct GenerateOptions {
    pub model: PathBuf,
    pub output: PathBuf,
    pub seed: Option<u64>,
    pub format: String,
    pub gzip: bool,
    pub header: bool,
    pub max_rows: Option<u64>,
    pub dialect: String,
    pub script: Option<PathBuf>,
    pub topic_capacity: Option<usize>,
    pub handoff_capacity: Option<usize>,
    pub ring_capacity: Option<usize>,
    pub sample_timeout: Option<u64>,
    pub progress: bool,
    pub json: bool,
    pub dry_run: bool,
}

pub fn run(options: GenerateOptions) -> Result<()> {
    let format: DelimitedFormat = options.format.parse().map_err(anyhow::Error::msg)?;
    let dialect: ImportDialect = options.dialect.parse().map_err(anyhow::Error::msg)?;
    let script = ImportScript::new(dialect, format, options.header, options.gzip)?;

    let model = Model::load(&options.model)?;
    let kinds = classify_model(&model)?;

    if options.dry_run {
        eprintln!("Model is valid: {} tables", model.len());
        for (table, kind) in model.tables().iter().zip(&kinds) {
            eprintln!("  {:<24} {}", table.name, kind);
        }
        return Ok(());
    }

    let defaults = RunConfig::default();
    let config = RunConfig {
        seed: options.seed,
        topic_capacity: options.topic_capacity.unwrap_or(defaults.topic_capacity),
        handoff_capacity: options.handoff_capacity.unwrap_or(defaults.handoff_capacity),
        ring_capacity: options.ring_capacity.unwrap_or(defaults.ring_capacity),
        sample_timeout: match options.sample_timeout {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.sample_timeout,
        },
        ..defaults
    };

    let sinks = DelimitedSinkFactory::new(DelimitedOptions {
        dir: options.output.clone(),
        format,
        header: options.header,
        gzip: options.gzip,
        max_rows: options.max_rows,
    });
    sinks.ensure_output_dir().with_context(|| {
        format!("Failed to create output directory: {}", options.output.display())
    })?;

    let mut orchestrator = Orchestrator::new(model, config);
    orchestrator.add_observer(Box::new(TracingObserver));
    if options.progress && !options.json {
        let progress = ProgressObserver::new(orchestrator.model());
        orchestrator.add_observer(Box::new(progress));
    }

    let summary = orchestrator.run(&sinks)?;

    let script_path = options
        .script
        .unwrap_or_else(|| options.output.join("import.sql"));
    script
        .write(&script_path, &summary, orchestrator.model())
        .with_context(|| format!("Failed to write import script: {}", script_path.display()))?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    eprintln!(
        "Generated {} rows across {} tables in {:.2}s (seed {})",
        summary.total_rows(),
        summary.tables.len(),
        summary.duration.as_secs_f64(),
        summary.seed
    );
    for output in summary.ordered_outputs() {
        eprintln!(
            "  {:<24} {:<14} {:>10} rows  {}",
            output.table,
            output.strategy,
            output.rows,
            output.locations.join(", ")
        );
    }
    eprintln!("Import script: {}", script_path.display());
    Ok(())
}
