use std::path::PathBuf;

use admissions_rag::commands::{ask, chat, ingest_document, search, show_status};
use admissions_rag::config::{Config, load_config, run_interactive_config, show_config};
use admissions_rag::{RagError, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "admissions-rag")]
#[command(about = "Answers questions about university admission programs from ingested guides")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to $ADMISSIONS_RAG_HOME, then the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and models
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Replace the knowledge base with the chunks of a text or PDF document
    Ingest {
        /// Admissions guide to ingest
        file: PathBuf,
        /// Print the chunks without embedding or storing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the retrieved context for a question without generating an answer
    Search {
        question: String,
    },
    /// Answer a single question
    Ask {
        question: String,
    },
    /// Start an interactive question session
    Chat,
    /// Show Ollama, vector store and ingestion status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = cli.config_dir.as_deref();

    match cli.command {
        Commands::Config { show } => {
            let dir = Config::config_dir(config_dir).map_err(|e| RagError::Config(e.to_string()))?;
            if show {
                show_config(&dir)?;
            } else {
                run_interactive_config(&dir)?;
            }
        }
        Commands::Ingest { file, dry_run } => {
            ingest_document(&load_config(config_dir)?, &file, dry_run).await?;
        }
        Commands::Search { question } => {
            search(&load_config(config_dir)?, &question).await?;
        }
        Commands::Ask { question } => {
            ask(&load_config(config_dir)?, &question).await?;
        }
        Commands::Chat => {
            chat(&load_config(config_dir)?).await?;
        }
        Commands::Status => {
            show_status(&load_config(config_dir)?).await?;
        }
    }

    Ok(())
}
