mod generate;
mod plan;

use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relsynth")]
#[command(version)]
#[command(about = "Generate relationally-consistent test data from a table model", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate data files and an import script from a model file
    Generate {
        /// Model file (YAML)
        model: PathBuf,

        /// Output directory for data files
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Seed for all generators (overrides the model's seed)
        #[arg(long)]
        seed: Option<u64>,

        /// Output format: csv or tsv
        #[arg(long, default_value = "csv")]
        format: String,

        /// Compress data files with gzip
        #[arg(long)]
        gzip: bool,

        /// Omit the header row
        #[arg(long)]
        no_header: bool,

        /// Stop each table after this many rows
        #[arg(long)]
        max_rows: Option<u64>,

        /// Import script dialect: postgres or mysql
        #[arg(short, long, default_value = "postgres")]
        dialect: String,

        /// Import script path (default: <output>/import.sql)
        #[arg(long)]
        script: Option<PathBuf>,

        /// Queue size of each table's topic
        #[arg(long)]
        topic_capacity: Option<usize>,

        /// Queue size between an each parent and its child
        #[arg(long)]
        handoff_capacity: Option<usize>,

        /// Parent rows kept for ref sampling
        #[arg(long)]
        ring_capacity: Option<usize>,

        /// Seconds a ref column waits for its parent's first row (0 waits forever)
        #[arg(long)]
        sample_timeout: Option<u64>,

        /// Show progress bars
        #[arg(short, long)]
        progress: bool,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,

        /// Validate and classify the model without generating anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show each table's strategy, level and the import order
    Plan {
        /// Model file (YAML)
        model: PathBuf,

        /// Children before parents
        #[arg(long)]
        reverse: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate {
            model,
            output,
            seed,
            format,
            gzip,
            no_header,
            max_rows,
            dialect,
            script,
            topic_capacity,
            handoff_capacity,
            ring_capacity,
            sample_timeout,
            progress,
            json,
            dry_run,
        } => generate::run(generate::GenerateOptions {
            model,
            output,
            seed,
            format,
            gzip,
            header: !no_header,
            max_rows,
            dialect,
            script,
            topic_capacity,
            handoff_capacity,
            ring_capacity,
            sample_timeout,
            progress,
            json,
            dry_run,
        }),
        Commands::Plan {
            model,
            reverse,
            json,
        } => plan::run(model, reverse, json),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "relsynth", &mut io::stdout());
            Ok(())
        }
    }
}
