mod commands;
mod config;

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use fieldprune_core::CleanOptions;
use tracing_subscriber::EnvFilter;

use commands::{cmd_check, cmd_clean};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Dead-field cleanup for scoped model documents.
#[derive(Parser)]
#[command(
    name = "fieldprune",
    version,
    about = "Dead-field cleanup for scoped model documents"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log pass progress to stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cleanup battery and print the cleaned document
    Clean {
        /// Path to the document JSON dump
        file: PathBuf,
        /// TOML config file with a [clean] table
        #[arg(long)]
        config: Option<PathBuf>,
        /// Keep a field alive at root scope (repeatable)
        #[arg(long = "pin", value_name = "NAME")]
        pins: Vec<String>,
        /// Re-check dangling references, dead fields and scopes after cleaning
        #[arg(long)]
        verify: bool,
        /// Print the cleanup report instead of the cleaned document
        #[arg(long)]
        report: bool,
    },

    /// Validate a document and show what a cleanup would change
    Check {
        /// Path to the document JSON dump
        file: PathBuf,
        /// TOML config file with a [clean] table
        #[arg(long)]
        config: Option<PathBuf>,
        /// Keep a field alive at root scope (repeatable)
        #[arg(long = "pin", value_name = "NAME")]
        pins: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Clean {
            file,
            config,
            pins,
            verify,
            report,
        } => {
            let options =
                load_options_or_exit(config.as_deref(), &pins, verify, cli.output, cli.quiet);
            cmd_clean(&file, &options, report, cli.output, cli.quiet);
        }
        Commands::Check { file, config, pins } => {
            let options =
                load_options_or_exit(config.as_deref(), &pins, false, cli.output, cli.quiet);
            cmd_check(&file, &options, cli.output, cli.quiet);
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` wins when
/// no `-v` flag is given.
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_options_or_exit(
    config: Option<&Path>,
    pins: &[String],
    verify: bool,
    output: OutputFormat,
    quiet: bool,
) -> CleanOptions {
    match config::load_options(config, pins, verify) {
        Ok(options) => options,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

/// Report an error in the appropriate format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}
