//! # kgraph
//!
//! Command-line front end for the knowledge graph engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              apps/kgraph (THE BINARY)        │
//! │                                              │
//! │   CLI (clap) ──► Engine ──► GraphOpsContext  │
//! │                    │                         │
//! │        ┌───────────┼─────────────┐           │
//! │        ▼           ▼             ▼           │
//! │   Neo4j/memory  embeddings   comparator      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Run a whole turn of tool calls
//! kgraph turn -f calls.json
//!
//! # Single operations, each its own turn
//! kgraph create-node Idea "Singularity" "A hypothetical future point"
//! kgraph create-edge Singularity AI ENABLES --prop confidence=0.7
//! kgraph find-node "runaway growth" Idea --top-k 5
//! kgraph dfs Singularity Idea --depth 2
//!
//! # Create the vector indexes once per database
//! kgraph init-indexes
//! ```

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // KGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("KGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "kgraph=debug,kgraph_core=debug"
    } else {
        "kgraph=info,kgraph_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
