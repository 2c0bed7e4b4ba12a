//! Command-line driver for explicit state space exploration.

mod models;
mod output;

use clap::{Args, Parser, Subcommand};
use lts_explore::{
    ExploreConfig, ExploreError, Explorer, Label, MemoryLts, NextStateGenerator, OrdComparator,
    Strategy, Summary,
};
use miette::Diagnostic;
use models::{Chain, Lottery, ModelKind, Philosophers, Ring};
use output::{render_summary, TextTraceWriter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("failed to prepare output directory {path}: {message}")]
    #[diagnostic(code(ltsgen::io_error))]
    IoError { path: String, message: String },

    #[error("invalid argument: {message}")]
    #[diagnostic(code(ltsgen::invalid_argument))]
    InvalidArgument { message: String },

    #[error("exploration failed: {message}")]
    #[diagnostic(code(ltsgen::explore_error))]
    ExploreError {
        message: String,
        #[help]
        help: Option<String>,
    },
}

impl From<ExploreError> for CliError {
    fn from(e: ExploreError) -> Self {
        let help = match &e {
            ExploreError::Generator {
                error_trace: Some(file),
                ..
            } => Some(format!("a trace to the failing state was saved to {file}")),
            ExploreError::InvalidConfig { .. } => {
                Some("check the combination of strategy, bithashing and trace flags".to_string())
            }
            _ => None,
        };
        CliError::ExploreError {
            message: e.to_string(),
            help,
        }
    }
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "ltsgen", version)]
#[command(about = "Generate the state space of a demo model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore the state space of a built-in model
    Explore(ExploreArgs),

    /// List the built-in models
    Models,
}

#[derive(Args)]
struct ExploreArgs {
    /// Model to explore
    #[arg(value_enum, value_name = "MODEL")]
    model: ModelKind,

    /// Size parameter of the model
    #[arg(short = 'n', long, default_value = "4")]
    size: u32,

    /// Exploration strategy: b(readth), d(epth), r(andom), p(riority) or q (rpriority)
    #[arg(short, long, default_value = "b")]
    strategy: Strategy,

    /// Maximum number of states to explore (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_states: usize,

    /// Maximum number of traces to write (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_traces: usize,

    /// Bound on the exploration frontier (0 = unlimited)
    #[arg(long, default_value = "0")]
    todo_max: usize,

    /// Store states in a bit-hash table (fixed memory, may miss states)
    #[arg(long)]
    bithash: bool,

    /// Size of the bit-hash table in bits
    #[arg(long, default_value_t = lts_explore::bithash::DEFAULT_BITHASH_SIZE)]
    bithash_size: usize,

    /// Initial capacity of the state table
    #[arg(long, default_value_t = lts_explore::store::DEFAULT_INIT_TABLE_SIZE)]
    init_tsize: usize,

    /// Detect deadlocks
    #[arg(short = 'D', long)]
    deadlock: bool,

    /// Detect divergences (cycles of internal actions)
    #[arg(long)]
    divergence: bool,

    /// Detect transitions carrying one of these action names
    #[arg(short, long, value_name = "NAMES", value_delimiter = ',')]
    action: Vec<String>,

    /// Write traces for detected deadlocks, divergences and actions
    #[arg(short, long)]
    trace: bool,

    /// Write a trace to the state where exploration failed
    #[arg(long)]
    error_trace: bool,

    /// Apply confluence reduction with the given internal action
    #[arg(short = 'c', long, value_name = "ACTION", num_args = 0..=1, default_missing_value = "tau")]
    confluence: Option<String>,

    /// Prefix of trace file names
    #[arg(long, default_value = "")]
    prefix: String,

    /// Directory receiving trace files
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Seed for the random strategies
    #[arg(long)]
    seed: Option<u64>,

    /// Chance of dropping a candidate once the priority frontier is full
    #[arg(long, default_value = "0.5")]
    drop_probability: f64,

    /// Maximum memory usage in MB (0 = unlimited)
    #[arg(long, default_value = "0")]
    memory_limit: usize,

    /// Print every generated transition
    #[arg(long)]
    print_lts: bool,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl ExploreArgs {
    fn config(&self) -> CliResult<ExploreConfig> {
        if self.size == 0 {
            return Err(CliError::InvalidArgument {
                message: "model size must be positive".to_string(),
            });
        }
        let unlimited = |n: usize| if n == 0 { usize::MAX } else { n };

        Ok(ExploreConfig {
            strategy: self.strategy,
            max_states: unlimited(self.max_states),
            max_traces: unlimited(self.max_traces),
            bithashing: self.bithash,
            bithash_size: self.bithash_size,
            todo_max: unlimited(self.todo_max),
            initial_table_size: self.init_tsize,
            trace: self.trace,
            save_error_trace: self.error_trace,
            trace_prefix: self.prefix.clone(),
            confluence_action: self.confluence.clone(),
            detect_deadlock: self.deadlock,
            detect_divergence: self.divergence,
            detect_action: !self.action.is_empty(),
            trace_actions: self.action.iter().cloned().collect(),
            priority_drop_probability: self.drop_probability,
            seed: self.seed,
            memory_limit_mb: self.memory_limit,
            progress: None,
        })
    }
}

fn main() {
    // Install miette's fancy error handler
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    let filter = if matches!(&cli.command, Commands::Explore(args) if args.verbose) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Explore(args) => cmd_explore(&args),
        Commands::Models => {
            cmd_models();
            Ok(0)
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            std::process::exit(1);
        }
    }
}

fn cmd_models() {
    for kind in ModelKind::ALL {
        println!("{:<14}{}", kind.name(), kind.describe());
    }
}

/// Returns the process exit code: 0 for a clean run, 1 if something was
/// found, 2 if a budget stopped the run.
fn cmd_explore(args: &ExploreArgs) -> CliResult<i32> {
    let config = args.config()?;
    fs::create_dir_all(&args.out_dir).map_err(|e| CliError::IoError {
        path: args.out_dir.display().to_string(),
        message: e.to_string(),
    })?;

    info!(model = args.model.name(), size = args.size, "exploring");
    let start = Instant::now();
    let size = args.size;
    let summary = match args.model {
        ModelKind::Chain => explore(Chain::new(size), config, &args.out_dir, args.print_lts)?,
        ModelKind::Ring => explore(Ring::new(size), config, &args.out_dir, args.print_lts)?,
        ModelKind::Philosophers => explore(
            Philosophers::new(size as usize),
            config,
            &args.out_dir,
            args.print_lts,
        )?,
        ModelKind::Lottery => explore(Lottery::new(size), config, &args.out_dir, args.print_lts)?,
    };
    let elapsed = start.elapsed();

    println!();
    print!("{}", render_summary(&summary, elapsed.as_secs_f64()));

    if !summary.findings.is_empty() {
        Ok(1)
    } else if !summary.is_complete() {
        Ok(2)
    } else {
        Ok(0)
    }
}

fn explore<G>(model: G, config: ExploreConfig, out_dir: &Path, print_lts: bool) -> CliResult<Summary>
where
    G: NextStateGenerator<Action = Label>,
    G::State: 'static,
{
    let mut explorer = Explorer::initialise(config, model, OrdComparator, MemoryLts::new())?
        .with_trace_writer(TextTraceWriter::new(out_dir));
    let summary = explorer.run()?;

    if print_lts {
        let lts = explorer.sink();
        if let Some(initial) = lts.initial_state {
            println!("initial state: {}", initial);
        }
        for (from, action, to) in &lts.transitions {
            println!("{} -{}-> {}", from, action, to);
        }
    }
    Ok(summary)
}
