//! plisp CLI
//!
//! Runs plisp source files, evaluates one-off expressions, and hosts an
//! interactive REPL. Logs go to stderr so program output on stdout stays
//! clean.

mod repl;

use clap::{ArgAction, CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use plisp_runtime::{LispError, Root, RuntimeConfig, stdout_output};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "plisp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "plisp - a small Lisp evaluated over persistent frames", long_about = None)]
struct Cli {
    /// Runtime configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Arena size in cells (overrides the config file)
    #[arg(long, global = true, value_name = "CELLS")]
    arena_capacity: Option<usize>,

    /// Evaluator step budget per top-level term (overrides the config file)
    #[arg(long, global = true, value_name = "STEPS")]
    max_steps: Option<u64>,

    /// Print the root frame once evaluation finishes
    #[arg(long, global = true)]
    print_frame: bool,

    /// More logging: -v for debug, -vv for trace
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every term in a source file
    Run {
        /// Input source file
        file: PathBuf,
    },

    /// Evaluate terms given on the command line and print the last value
    Eval {
        /// Source text
        text: String,
    },

    /// Start an interactive session
    Repl,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = || match build_config(cli.config.as_deref(), cli.arena_capacity, cli.max_steps) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    match &cli.command {
        Commands::Run { file } => run_file(config(), file, cli.print_frame),
        Commands::Eval { text } => run_eval(config(), text, cli.print_frame),
        Commands::Repl => {
            if let Err(e) = repl::run(config(), cli.print_frame) {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
        Commands::Completions { shell } => run_completions(*shell),
    }
}

fn init_logging(verbose: u8) {
    let directive = match verbose {
        0 => "plisp=info",
        1 => "plisp=debug",
        _ => "plisp=trace",
    };
    let filter = EnvFilter::from_default_env();
    let filter = match directive.parse() {
        Ok(d) => filter.add_directive(d),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Config file first, then command-line overrides
fn build_config(
    path: Option<&Path>,
    arena_capacity: Option<usize>,
    max_steps: Option<u64>,
) -> Result<RuntimeConfig, String> {
    let mut config = match path {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(capacity) = arena_capacity {
        if capacity == 0 {
            return Err("--arena-capacity must be at least 1".to_string());
        }
        config = config.with_arena_capacity(capacity);
    }
    if let Some(steps) = max_steps {
        config = config.with_max_steps(steps);
    }
    Ok(config)
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "plisp", &mut io::stdout());
}

fn new_root(config: RuntimeConfig) -> Root {
    match Root::with_config(config, stdout_output()) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Print `e`, with the Error value behind it at debug level
fn report(root: &Root, e: &LispError) {
    eprintln!("Error: {}", e);
    if let Some(value) = e.error_value() {
        debug!(error = %root.print(value), "error value");
    }
}

fn finish(root: Root, print_frame: bool) {
    if print_frame {
        println!("{}", root.print(root.frame()));
    }
    let stats = root.free();
    debug!(
        live = stats.live,
        high_water = stats.high_water,
        capacity = stats.capacity,
        "arena usage"
    );
}

fn run_file(config: RuntimeConfig, file: &Path, print_frame: bool) {
    let source = match fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", file.display(), e);
            process::exit(1);
        }
    };
    let mut root = new_root(config);
    if let Err(e) = root.run(&source) {
        report(&root, &e);
        process::exit(1);
    }
    finish(root, print_frame);
}

fn run_eval(config: RuntimeConfig, text: &str, print_frame: bool) {
    let mut root = new_root(config);
    match root.run(text) {
        Ok(value) => println!("{}", root.print(value)),
        Err(e) => {
            report(&root, &e);
            process::exit(1);
        }
    }
    finish(root, print_frame);
}
