//! docqa - ask questions about a single document.
//!
//! # Usage
//!
//! ```bash
//! # Index a document (replaces the previous index)
//! docqa build syllabus.pdf
//!
//! # Ask a question
//! docqa ask "When is the final exam?"
//!
//! # Inspect what would be sent to the model
//! docqa retrieve "What is the late policy?"
//!
//! # Run the offline evaluation
//! docqa eval tests.json
//!
//! # Save the effective configuration as a starting file
//! docqa config --write docqa.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use docqa_cli::{commands, output, OutputFormat};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "docqa - Retrieval-augmented question answering over one document", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DOCQA_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the persisted index
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a document, replacing the current index
    Build {
        /// PDF, text, or markdown document
        document: PathBuf,
    },

    /// Answer a question from the indexed document
    Ask {
        /// Question to answer
        question: String,
    },

    /// Show the ranked chunks and assembled context for a question
    Retrieve {
        /// Question to search for
        question: String,
    },

    /// Show the current index generation
    Status,

    /// Run question/pattern cases and report the pass rate
    Eval {
        /// JSON file of { "input", "expected_pattern" } cases
        cases: PathBuf,
    },

    /// Print the effective configuration
    Config {
        /// Also write it to this TOML file
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::error(format!("{:#}", e));
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let format = OutputFormat::from_flag(cli.json);
    let config = commands::load_config(cli.config.as_deref(), cli.data_dir).await?;

    match cli.command {
        Commands::Build { document } => commands::build(&config, &document, format).await,
        Commands::Ask { question } => commands::ask(&config, &question, format).await,
        Commands::Retrieve { question } => commands::retrieve(&config, &question, format).await,
        Commands::Status => commands::status(&config, format).await,
        Commands::Eval { cases } => commands::evaluate(&config, &cases, format).await,
        Commands::Config { write } => commands::show_config(&config, write.as_deref()).await,
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("docqa=debug,docqa_rag=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("docqa=info,docqa_rag=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
