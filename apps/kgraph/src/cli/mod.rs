//! # kgraph CLI Module
//!
//! ## Available Commands
//!
//! - `turn` - Run a JSON file of tool calls as one turn
//! - `create-node` - Create or merge a node
//! - `create-edge` - Create or merge a relationship
//! - `find-node` - Vector search within a category
//! - `query` - Read-only Cypher query
//! - `dfs` - Bounded traversal from a node
//! - `init-indexes` - Create the vector indexes of the semantic categories
//! - `taxonomy` - Print the loaded category taxonomy

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use kgraph_core::{KgError, Property, Scalar, ToolCall};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// kgraph - knowledge graph construction engine
///
/// Deduplicating node upserts, name-resolved edges, vector search and
/// bounded traversal over a Neo4j graph.
#[derive(Parser, Debug)]
#[command(name = "kgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ./kgraph.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Graph store backend
    #[arg(short = 'B', long, global = true, value_enum, default_value = "neo4j")]
    pub store: StoreKind,

    /// JSON snapshot for the memory store
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Graph store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Neo4j,
    Memory,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a JSON array of tool calls as one turn
    Turn {
        /// Path to the tool call file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Create a node (deduplicated for semantic categories)
    CreateNode {
        category: String,
        name: String,
        description: String,
    },

    /// Create a relationship between two existing nodes
    CreateEdge {
        source: String,
        target: String,
        relationship: String,

        /// Edge property as key=value (repeatable)
        #[arg(short, long = "prop", value_parser = parse_property)]
        props: Vec<Property>,
    },

    /// Find the nodes of a category closest to a text
    FindNode {
        query_text: String,
        category: String,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Run a read-only Cypher query
    Query {
        cypher: String,
    },

    /// Traverse outward from a node
    Dfs {
        start_name: String,
        start_category: String,

        /// Maximum hops from the start node
        #[arg(short, long, default_value = "3", allow_negative_numbers = true)]
        depth: i64,

        #[arg(long)]
        max_nodes: Option<usize>,

        #[arg(long)]
        max_edges: Option<usize>,
    },

    /// Create the vector index of every semantic category
    InitIndexes,

    /// Print the category taxonomy
    Taxonomy,
}

/// Parse `key=value` into an edge property.
fn parse_property(raw: &str) -> Result<Property, String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    Ok(Property::new(key.trim(), Scalar::parse_lossy(value.trim())))
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), KgError> {
    let ctx = RunContext::load(&cli)?;

    match cli.command {
        Commands::Turn { file } => cmd_turn(&ctx, &file).await,
        Commands::CreateNode {
            category,
            name,
            description,
        } => {
            cmd_single(
                &ctx,
                ToolCall::CreateNode {
                    category,
                    name,
                    description,
                },
            )
            .await
        }
        Commands::CreateEdge {
            source,
            target,
            relationship,
            props,
        } => {
            cmd_single(
                &ctx,
                ToolCall::CreateEdge {
                    source_name: source,
                    target_name: target,
                    relationship_type: relationship,
                    properties: props,
                },
            )
            .await
        }
        Commands::FindNode {
            query_text,
            category,
            top_k,
        } => {
            cmd_single(
                &ctx,
                ToolCall::FindNode {
                    query_text,
                    category,
                    top_k,
                },
            )
            .await
        }
        Commands::Query { cypher } => {
            cmd_single(&ctx, ToolCall::ExecuteCypherQuery { query: cypher }).await
        }
        Commands::Dfs {
            start_name,
            start_category,
            depth,
            max_nodes,
            max_edges,
        } => {
            cmd_single(
                &ctx,
                ToolCall::Dfs {
                    start_name,
                    start_category,
                    max_depth: depth,
                    max_nodes,
                    max_edges,
                },
            )
            .await
        }
        Commands::InitIndexes => cmd_init_indexes(&ctx).await,
        Commands::Taxonomy => cmd_taxonomy(&ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_values_are_typed() {
        assert_eq!(
            parse_property("since=2024"),
            Ok(Property::new("since", 2024i64))
        );
        assert_eq!(
            parse_property("source = annual report"),
            Ok(Property::new("source", "annual report"))
        );
        assert!(parse_property("missing-separator").is_err());
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "kgraph",
            "dfs",
            "AI",
            "Idea",
            "--depth",
            "2",
            "--store",
            "memory",
            "--json-mode",
        ])
        .expect("parse");
        assert_eq!(cli.store, StoreKind::Memory);
        assert!(cli.json_mode);
        assert!(matches!(cli.command, Commands::Dfs { depth: 2, .. }));
    }
}
