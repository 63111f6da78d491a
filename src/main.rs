//! # Clinical RAG CLI (`clinrag`)
//!
//! ## Usage
//!
//! ```bash
//! clinrag --config ./config/clinrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `clinrag build --input <dir>` | Embed passages and write domain indexes |
//! | `clinrag serve` | Start the HTTP API |
//! | `clinrag ask "<question>"` | Answer a question from the indexed evidence |
//! | `clinrag retrieve "<query>"` | Show ranked passages without generation |
//! | `clinrag health` | Show which domain indexes are loaded |
//! | `clinrag domains` | List registered domains |
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use clinical_rag::config::{self, Config};
use clinical_rag::service::QueryService;
use clinical_rag::{build_cmd, server};
use clinical_rag_core::Answer;

/// Clinical RAG: grounded answers to clinical questions from per-domain
/// document indexes.
#[derive(Parser)]
#[command(name = "clinrag", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/clinrag.toml`. When the file does not exist,
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/clinrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed pre-extracted passages and write one index per domain.
    ///
    /// Reads `<input>/<domain>/**/*.json`, each a JSON array of passages.
    Build {
        #[arg(long)]
        input: PathBuf,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Answer a question, citing retrieved evidence.
    Ask {
        query: String,
        /// Restrict retrieval to one domain (e.g. `covid`).
        #[arg(long)]
        domain: Option<String>,
    },

    /// Print ranked passages for a query.
    Retrieve {
        query: String,
        #[arg(long)]
        domain: Option<String>,
        /// Number of passages (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Show per-domain index readiness.
    Health,

    /// List registered domains.
    Domains,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::debug!(path = %cli.config.display(), "config file not found; using defaults");
        Config::minimal()
    };

    match cli.command {
        Commands::Build { input } => {
            build_cmd::run_build(&cfg, &input).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask { query, domain } => {
            let service = QueryService::from_config(&cfg)?;
            let outcome = service.ask(&query, domain.as_deref()).await?;
            print_answer(&outcome.answer);
        }
        Commands::Retrieve { query, domain, k } => {
            let service = QueryService::from_config(&cfg)?;
            let passages = service.retrieve(&query, domain.as_deref(), k).await?;
            if passages.is_empty() {
                println!("No passages above the similarity threshold.");
            }
            for (i, p) in passages.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} p.{} ({})",
                    i + 1,
                    p.similarity_score,
                    p.passage.source,
                    p.passage.page,
                    p.passage.domain
                );
                println!("   {}", clinical_rag_core::models::excerpt(&p.passage.text, 200));
            }
        }
        Commands::Health => {
            let service = QueryService::from_config(&cfg)?;
            let health = service.health();
            println!("status: {}", health.status);
            for (id, h) in &health.indexes {
                let state = if h.loaded { "loaded" } else { "missing" };
                println!("{:<16} {:<8} {:>8} vectors", id, state, h.vector_count);
            }
        }
        Commands::Domains => {
            for d in cfg.registry()?.iter() {
                println!("{:<16} {}", d.id, d.name);
            }
        }
    }

    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}\n", answer.response());
    println!("confidence: {}", answer.confidence());
    if let Answer::Failed { error, .. } = answer {
        println!("generation error: {error}");
    }
    for (i, s) in answer.sources().iter().enumerate() {
        println!(
            "[Source {}] {} p.{} (similarity {:.3})",
            i + 1,
            s.source,
            s.page,
            s.similarity
        );
    }
}
