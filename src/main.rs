//! # askpage CLI
//!
//! The `askpage` binary hosts the question-answering service and offers a
//! one-shot terminal mode for quick checks without HTTP.
//!
//! ## Usage
//!
//! ```bash
//! askpage --config ./config/askpage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askpage serve` | Start the HTTP service |
//! | `askpage ask --url <URL> "<question>"` | Answer one question from the terminal |
//!
//! ## Environment
//!
//! `GROQ_API_KEY` enables the chat model (without it, requests get a
//! configuration-error reply). `HF_TOKEN` is optional and only affects
//! the first embedding model download. Both may come from a `.env` file.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use askpage::config::Config;
use askpage::embedding::FastEmbedder;
use askpage::fetch::HttpFetcher;
use askpage::llm::{ChatModel, GroqChat};
use askpage::models::ChatMessage;
use askpage::pipeline::Pipeline;
use askpage::server;

/// askpage: ask questions about any web page, answered from the page
/// itself.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults; see
/// `config/askpage.example.toml` for every setting.
#[derive(Parser)]
#[command(
    name = "askpage",
    about = "Ask questions about any web page, answered from the page itself",
    version,
    long_about = "askpage fetches a page, strips its markup, embeds the text with a local \
    model, and answers questions against the closest chunks via an LLM. Pages are indexed \
    once and cached on disk, so repeat questions skip fetching and embedding."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/askpage.toml`. A missing file is not an
    /// error; built-in defaults apply.
    #[arg(long, global = true, default_value = "./config/askpage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service.
    ///
    /// Binds to `[server].bind` and serves `GET /` (liveness) and
    /// `POST /response` (question answering) until interrupted.
    Serve {
        /// Override the bind address from the config file.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Answer a single question about a URL and print the result.
    ///
    /// Runs the exact same pipeline as the HTTP endpoint, including index
    /// persistence, so a later `serve` reuses the work.
    Ask {
        /// Page to index and question against.
        #[arg(long)]
        url: String,

        /// The question to ask about the page.
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            info!(
                bind = %config.server.bind,
                data_dir = %config.storage.data_dir.display(),
                embedding_model = %config.embedding.model,
                llm_model = %config.llm.model,
                "starting askpage"
            );
            let pipeline = build_pipeline(&config).await?;
            server::run_server(&config, pipeline).await?;
        }
        Commands::Ask { url, question } => {
            let pipeline = build_pipeline(&config).await?;
            let answer = pipeline
                .respond(&[ChatMessage::user(question)], &url)
                .await;
            println!("{}", answer);
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wire up the pipeline collaborators from config and environment.
///
/// Loading the embedding model is the expensive step and is fatal on
/// failure; a missing Groq key is not (the pipeline degrades to a soft
/// error per request).
async fn build_pipeline(config: &Config) -> Result<Arc<Pipeline>> {
    let model = config.embedding.model.clone();
    let batch_size = config.embedding.batch_size;
    let embedder = tokio::task::spawn_blocking(move || FastEmbedder::new(&model, batch_size))
        .await
        .context("embedding model initialization task failed")?
        .context("failed to initialize the embedding model")?;

    let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch.timeout_secs))
        .context("failed to build the HTTP client")?;

    let chat = GroqChat::from_env(
        &config.llm.endpoint,
        &config.llm.model,
        config.llm.temperature,
        Duration::from_secs(config.llm.timeout_secs),
    )
    .context("failed to build the chat client")?
    .map(|chat| Arc::new(chat) as Arc<dyn ChatModel>);

    Ok(Arc::new(Pipeline::new(
        config,
        Arc::new(fetcher),
        Arc::new(embedder),
        chat,
    )))
}
