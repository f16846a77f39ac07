//! # kgraph-core
//!
//! Knowledge graph construction and query engine.
//!
//! Turns a stream of LLM tool calls into a consistent property graph:
//! - `create_node`: semantic dedup upsert (embeddings + comparator verdicts)
//!   or exact-name upsert, depending on the category
//! - `create_edge`: relationship writes whose endpoints are resolved through
//!   the turn's name map, so renames made by dedup are honoured
//! - `find_node`: nearest-neighbour search over description embeddings
//! - `execute_cypher_query`: read-only ad-hoc queries, embeddings stripped
//! - `dfs`: bounded traversal that stops at reference-data nodes
//!
//! ## Turns
//!
//! All operations of one tool-calling turn run inside a single store
//! transaction owned by a [`GraphOpsContext`]. The turn commits on success
//! and rolls back on a fatal error or when the context is dropped.
//! A transient store failure ends the transaction; [`Engine::run_turn`]
//! replays the whole turn on a fresh one.
//!
//! ## Backends
//!
//! The store, the embedding model and the comparator are traits
//! ([`GraphStore`], [`EmbeddingClient`], [`ComparatorClient`]). Production
//! wiring uses Neo4j and OpenAI-compatible HTTP APIs; tests use the
//! in-memory store with scripted clients.

// =============================================================================
// MODULES
// =============================================================================

pub mod clients;
pub mod config;
pub mod context;
pub mod cypher;
pub mod primitives;
pub mod retry;
pub mod store;
pub mod taxonomy;
pub mod tools;
pub mod traversal;
pub mod types;

mod dedup;
mod edge;
mod upsert;
mod vector;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    CompareResult, EdgeRecord, EndpointSide, GraphValue, KgError, MissingEndpoint, NodeKey,
    Property, Record, Scalar, ScoredNode, StoreError, StoreErrorKind, Subgraph, TraversalEdge,
    TraversalNode, UpsertOutcome,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use clients::{
    COMPARE_SYSTEM_PROMPT, ChatComparator, CompareError, ComparatorClient, EmbeddingClient,
    NodeText, OpenAiEmbedder,
};
pub use config::Config;
pub use context::{Engine, GraphOpsContext};
pub use cypher::{QueryOutcome, check_read_only, sanitize};
pub use retry::RetryPolicy;
pub use store::{GraphStore, GraphTxn, MemoryGraphStore, Neo4jGraphStore};
pub use taxonomy::{CategoryKind, Taxonomy};
pub use tools::ToolCall;
pub use traversal::TraversalLimits;
