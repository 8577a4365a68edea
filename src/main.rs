use clap::{Parser, Subcommand};
use retail_rag::Result;
use retail_rag::commands::{ask_question, index_dataset, show_status};
use retail_rag::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "retail-rag")]
#[command(about = "A retrieval-augmented question answering system for sales spreadsheets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure backends, dataset path and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build or rebuild the vector index from the sales spreadsheet
    Index {
        /// Path to the spreadsheet (overrides the configured dataset path)
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
    /// Ask a question about the indexed sales data
    Ask {
        /// The question, in natural language
        question: String,
        /// Number of documents to retrieve (overrides the mode default)
        #[arg(long)]
        k: Option<usize>,
    },
    /// Show detailed status of the answering pipeline
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Index { dataset } => {
            index_dataset(dataset).await?;
        }
        Commands::Ask { question, k } => {
            ask_question(question, k).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}
