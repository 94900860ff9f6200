//! # Folio CLI
//!
//! The `folio` binary serves retrieval-grounded chat over a personal data
//! corpus and provides helper commands for inspecting the corpus offline.
//!
//! ## Usage
//!
//! ```bash
//! folio --config ./config/folio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio serve` | Start the HTTP chat server |
//! | `folio chunks` | Print the chunks built from the corpus |
//! | `folio ask "<question>"` | Ask one question and stream the answer |

mod chunks;
mod config;
mod corpus;
mod embedding;
mod generation;
mod knowledge;
mod pipeline;
mod rank;
mod server;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;

use crate::generation::Message;
use crate::pipeline::ChatPipeline;

/// Folio — retrieval-grounded chat over a personal data corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/folio.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "folio",
    about = "Retrieval-grounded chat over a personal data corpus",
    version,
    long_about = "Folio flattens a JSON corpus describing a person into typed text chunks, \
    embeds them once per process, and answers chat questions grounded in the best-matching \
    chunks, streaming the generated answer back."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/folio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP chat server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// `POST /chat` and `GET /health`. Requires `OPENAI_API_KEY`.
    Serve,

    /// Print the chunks built from the corpus.
    ///
    /// Runs the chunk builder offline and prints each chunk's type tag and
    /// content. No network calls are made; useful for checking what the
    /// retrieval layer will see.
    Chunks,

    /// Ask one question and stream the answer to stdout.
    ///
    /// Runs the full pipeline for a single-message conversation. Requires
    /// `OPENAI_API_KEY`.
    Ask {
        /// The question to ask.
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Chunks => {
            let corpus = corpus::load_corpus(&cfg.corpus.path)?;
            let built = chunks::build_chunks(&corpus);
            for (i, chunk) in built.iter().enumerate() {
                println!("[{}] {}", i, chunk.metadata.kind);
                println!("{}", chunk.content);
                println!();
            }
            println!("{} chunks", built.len());
        }
        Commands::Ask { question } => {
            let pipeline = ChatPipeline::from_config(&cfg)?;
            let mut stream = pipeline.chat(&[Message::new("user", question)]).await?;

            let mut stdout = std::io::stdout();
            while let Some(delta) = stream.next().await {
                write!(stdout, "{}", delta?)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
    }

    Ok(())
}
