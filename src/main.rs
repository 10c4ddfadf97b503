mod config;
mod embedding;
mod errors;
mod llm;
mod retriever;
mod server;
mod utils;
mod vector_db;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use embedding::GeminiEmbedder;
use llm::{LLM, TextGenerator};
use retriever::Retriever;
use server::AppState;

#[derive(Parser)]
#[command(
    name = "doc-chat",
    version,
    about = "Gemini chat backend with single-document retrieval"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (the default)
    Serve {
        /// Document searched by `/ask` (overrides DOCUMENT_PATH)
        #[arg(long)]
        document: Option<PathBuf>,
        /// Port to listen on (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Send one prompt to the model and print the reply
    Ask {
        prompt: String,
    },
    /// Print the paragraph of the document closest to a query
    Retrieve {
        query: String,
        /// Document to search (overrides DOCUMENT_PATH)
        #[arg(long)]
        document: Option<PathBuf>,
    },
}

fn build_retriever(config: &Config) -> Result<Retriever> {
    let embedder = GeminiEmbedder::new(&config.gemini)?;
    Ok(Retriever::new(Arc::new(embedder), config.retriever.clone()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    let command = cli.command.unwrap_or(Commands::Serve {
        document: None,
        port: None,
    });

    match command {
        Commands::Serve { document, port } => {
            if let Some(document) = document {
                config.retriever.document_path = document;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let retriever = build_retriever(&config)?;
            let llm = LLM::new(&config.gemini, config.llm)?;
            info!(
                model = llm.model(),
                document = %retriever.config().document_path.display(),
                cache = retriever.config().cache_embeddings,
                "starting server"
            );

            let state = AppState::new(Arc::new(llm), Arc::new(retriever));
            server::run_server(&config.server, state).await?;
        }
        Commands::Ask { prompt } => {
            let llm = LLM::new(&config.gemini, config.llm)?;
            let reply = llm.generate(&[], &prompt).await?;
            println!("{reply}");
        }
        Commands::Retrieve { query, document } => {
            if let Some(document) = document {
                config.retriever.document_path = document;
            }
            let retriever = build_retriever(&config)?;
            let paragraph = retriever.answer_with_context(&query).await?;
            println!("{paragraph}");
        }
    }

    Ok(())
}
