//! proctor CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;
mod topics;

#[derive(Parser)]
#[command(name = "proctor", version, about = "Timed test-session engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one timed test session end to end
    Run {
        /// Test kind: group-discussion, group-planning, lecturette
        #[arg(long)]
        kind: String,

        /// Index of the option to pick at selection
        #[arg(long, default_value = "0")]
        choice: usize,

        /// Response text
        #[arg(long)]
        response: Option<String>,

        /// File containing the response text
        #[arg(long)]
        response_file: Option<PathBuf>,

        /// Topic bank TOML overriding the backend's topic source
        #[arg(long)]
        topics: Option<PathBuf>,

        /// Candidate id override
        #[arg(long)]
        user: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Submit without waiting for the evaluation result
        #[arg(long)]
        no_watch: bool,
    },

    /// Observe an evaluation until it reaches a terminal state
    Observe {
        /// Submission id returned by `run`
        #[arg(long)]
        submission_id: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List test kinds with their timing and validation parameters
    ListKinds,

    /// Validate a topic bank TOML file
    Validate {
        /// Path to the topic bank file
        #[arg(long)]
        topics: PathBuf,
    },

    /// Create starter config and example topic bank
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("proctor=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            kind,
            choice,
            response,
            response_file,
            topics,
            user,
            config,
            no_watch,
        } => {
            commands::run::execute(
                kind,
                choice,
                response,
                response_file,
                topics,
                user,
                config,
                no_watch,
            )
            .await
        }
        Commands::Observe {
            submission_id,
            config,
        } => commands::observe::execute(submission_id, config).await,
        Commands::ListKinds => commands::list_kinds::execute(),
        Commands::Validate { topics } => commands::validate::execute(topics),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
