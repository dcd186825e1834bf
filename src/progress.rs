//! Terminal progress display for a run.
//!
//! One bar per table whose row count is known up front, one spinner per
//! table whose count is derived from its parents.

use crate::model::Model;
use crate::run::{EventObserver, RunEvent};
use ahash::AHashMap;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] {prefix:<16} [{bar:40.cyan/blue}] {pos}/{len} rows ({percent}%) {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {prefix:<16} {pos} rows {msg}";

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  ")
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}

/// Renders worker events as `indicatif` progress bars
pub struct ProgressObserver {
    multi: MultiProgress,
    /// Known row counts of bounded tables
    counts: AHashMap<String, u64>,
    bars: Mutex<AHashMap<String, ProgressBar>>,
}

impl ProgressObserver {
    pub fn new(model: &Model) -> Self {
        let counts = model
            .tables()
            .iter()
            .filter(|t| t.each_columns().next().is_none())
            .map(|t| (t.name.clone(), t.count))
            .collect();
        Self {
            multi: MultiProgress::new(),
            counts,
            bars: Mutex::new(AHashMap::new()),
        }
    }

    fn start(&self, table: &str, bounded: bool) {
        let bar = match self.counts.get(table) {
            Some(&count) if bounded => {
                let bar = ProgressBar::new(count);
                bar.set_style(bar_style());
                bar
            }
            _ => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(spinner_style());
                bar
            }
        };
        let bar = self.multi.add(bar);
        bar.set_prefix(table.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bars.lock().insert(table.to_string(), bar);
    }

    fn with_bar(&self, table: &str, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.bars.lock().get(table) {
            f(bar);
        }
    }
}

impl EventObserver for ProgressObserver {
    fn on_event(&self, event: &RunEvent) {
        match event {
            RunEvent::WorkerStarted { table, bounded, .. } => self.start(table, *bounded),
            RunEvent::WorkerProgress {
                table,
                position,
                total,
                ..
            } => self.with_bar(table, |bar| {
                if let (Some(total), None) = (total, bar.length()) {
                    bar.set_length(*total);
                    bar.set_style(bar_style());
                }
                bar.set_position(*position);
            }),
            RunEvent::WorkerCompleted { table, rows, .. } => self.with_bar(table, |bar| {
                bar.set_position(*rows);
                bar.finish_with_message("done");
            }),
            RunEvent::WorkerCancelled { table, .. } => {
                self.with_bar(table, |bar| bar.abandon_with_message("cancelled"))
            }
            RunEvent::WorkerFailed { table, .. } => {
                self.with_bar(table, |bar| bar.abandon_with_message("failed"))
            }
            RunEvent::RunCompleted { .. } | RunEvent::RunFailed { .. } => {}
        }
    }
}
