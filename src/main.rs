//! # RAG Chat CLI (`ragchat`)
//!
//! ## Usage
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat serve` | Start the HTTP + WebSocket server |
//! | `ragchat ingest <paths>...` | Ingest documents into the index |
//! | `ragchat ask "<question>"` | Answer a question (add `--stream` for tokens) |
//! | `ragchat count` | Print the number of indexed chunks |
//! | `ragchat clear` | Remove every indexed chunk |
//!
//! Logging is controlled by `RUST_LOG` (default `info`). A `.env` file in
//! the working directory is loaded before anything else, so API keys can
//! live there.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use rag_chat::core::models::StreamEvent;
use rag_chat::{config, server, services};

/// RAG Chat: ask questions about your documents.
#[derive(Parser)]
#[command(
    name = "ragchat",
    about = "RAG Chat: retrieval-augmented question answering over uploaded documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server.
    Serve,

    /// Load, chunk, embed and store documents.
    ///
    /// Supported types: .pdf, .txt, .docx, .doc. Re-ingesting a file
    /// appends its chunks again.
    Ingest {
        /// Files to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Answer a question from the indexed documents.
    Ask {
        question: String,

        /// Print tokens as they are generated.
        #[arg(long)]
        stream: bool,
    },

    /// Print the number of indexed chunks.
    Count,

    /// Remove every indexed chunk.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { paths } => {
            let index = services::open_index(&cfg).await?;
            let ingestor = services::ingestor(&cfg, index);
            let mut failed = 0usize;
            for path in &paths {
                match ingestor.ingest(path).await {
                    Ok(n) => println!("{}: {} chunks", path.display(), n),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {}", path.display(), e);
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} documents failed to ingest", failed, paths.len());
            }
        }
        Commands::Ask { question, stream } => {
            let index = services::open_index(&cfg).await?;
            let engine = services::query_engine(&cfg, index)?;
            if stream {
                let mut events = engine.answer_stream(&question);
                let mut stdout = std::io::stdout();
                while let Some(event) = events.next().await {
                    match event {
                        StreamEvent::Token(t) => {
                            print!("{}", t);
                            stdout.flush()?;
                        }
                        StreamEvent::Sources(sources) => {
                            println!();
                            print_sources(&sources);
                        }
                        StreamEvent::Error(e) => anyhow::bail!(e),
                        _ => {}
                    }
                }
            } else {
                let answer = engine.answer(&question).await?;
                println!("{}", answer.text);
                print_sources(&answer.sources);
            }
        }
        Commands::Count => {
            let index = services::open_index(&cfg).await?;
            println!("{}", index.count().await?);
        }
        Commands::Clear => {
            let index = services::open_index(&cfg).await?;
            index.clear().await?;
            println!("Index cleared.");
        }
    }

    Ok(())
}

fn print_sources(sources: &[String]) {
    if sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for s in sources {
        println!("  - {}", s);
    }
}
