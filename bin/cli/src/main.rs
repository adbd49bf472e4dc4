//! The `flowstone` command-line interface.
//!
//! Exit codes: 0 success; 1 user error (bad arguments, missing file,
//! validation failure); 2 execution failure.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "flowstone", version, about = "Local-first workflow automation")]
struct Cli {
    /// Path to the configuration file (defaults to the flowstone home).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a workflow document.
    Run {
        /// Path to the workflow JSON file.
        workflow_file: PathBuf,
        /// Execution input as inline JSON.
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,
        /// Execution input read from a JSON file.
        #[arg(long)]
        input_file: Option<PathBuf>,
        /// Write the terminal output to this path instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Stream execution events to stderr while running.
        #[arg(long)]
        verbose: bool,
    },
    /// Generate a workflow document from a natural-language prompt.
    Generate {
        /// What the workflow should do.
        prompt: String,
        /// Provider to generate with (defaults to the configured one).
        #[arg(long)]
        provider: Option<String>,
        /// Write the generated document to this path instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the built-in tools.
    Tools,
    /// Read or modify the configuration document.
    Config {
        /// Set a top-level key: `--set key=value`.
        #[arg(long)]
        set: Option<String>,
        /// Print one top-level key.
        #[arg(long)]
        get: Option<String>,
        /// Set a provider API key: `--api-key provider=key`.
        #[arg(long = "api-key")]
        api_key: Option<String>,
        /// Print the whole document (credentials redacted).
        #[arg(long)]
        show: bool,
    },
    /// Create the flowstone home, a default configuration, and a
    /// starter workflow.
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| commands::home_dir().join("config.json"));

    let result = runtime.block_on(async {
        match cli.command {
            Command::Run {
                workflow_file,
                input,
                input_file,
                output,
                verbose,
            } => {
                commands::run::execute(
                    &config_path,
                    &workflow_file,
                    input.as_deref(),
                    input_file.as_deref(),
                    output.as_deref(),
                    verbose,
                )
                .await
            }
            Command::Generate {
                prompt,
                provider,
                output,
            } => {
                commands::generate::execute(
                    &config_path,
                    &prompt,
                    provider.as_deref(),
                    output.as_deref(),
                )
                .await
            }
            Command::Tools => commands::tools::execute(),
            Command::Config {
                set,
                get,
                api_key,
                show,
            } => {
                commands::config::execute(
                    &config_path,
                    set.as_deref(),
                    get.as_deref(),
                    api_key.as_deref(),
                    show,
                )
                .await
            }
            Command::Init => commands::init::execute(&config_path).await,
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(commands::CliError::User(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(1)
        }
        Err(commands::CliError::Execution(message)) => {
            eprintln!("execution failed: {message}");
            ExitCode::from(2)
        }
    }
}
