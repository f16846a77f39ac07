//! # Graph Store
//!
//! Abstraction over the transactional property graph the engine writes to.
//!
//! A `GraphStore` hands out `GraphTxn`s. Every engine operation runs inside
//! exactly one transaction owned by the turn's `GraphOpsContext`.
//!
//! Backends:
//! - [`Neo4jGraphStore`]: Neo4j over Bolt
//! - [`MemoryGraphStore`]: deterministic in-process graph

mod memory;
mod neo4j;

pub use memory::MemoryGraphStore;
pub use neo4j::Neo4jGraphStore;

use crate::retry::{RetryPolicy, retry_transient};
use crate::taxonomy::{Taxonomy, VectorIndex};
use crate::{EdgeRecord, GraphValue, KgError, NodeKey, Record};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

// =============================================================================
// REQUEST / RESPONSE TYPES
// =============================================================================

/// A nearest-neighbour request against a category's vector index.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub index: VectorIndex,
    pub vector: Vec<f32>,
    /// Number of neighbours requested from the index.
    pub pool: usize,
    /// Hits below this score are dropped.
    pub min_score: Option<f64>,
    /// Hits kept after filtering.
    pub limit: usize,
    /// Extra node properties to return with each hit.
    pub extra_properties: Vec<String>,
}

/// A vector index hit.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub key: NodeKey,
    pub name: String,
    pub description: String,
    pub extra: BTreeMap<String, GraphValue>,
    pub score: f64,
}

/// A node as read back by key or name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNode {
    pub key: NodeKey,
    pub name: String,
    pub description: String,
}

/// A node to create.
#[derive(Debug, Clone)]
pub struct NewNode<'a> {
    pub category: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub embedding: Option<&'a [f32]>,
}

/// One relationship incident to a node, seen from that node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjacent {
    pub relationship: String,
    /// True if the relationship points away from the origin node.
    pub outgoing: bool,
    pub name: String,
    pub description: String,
    pub labels: Vec<String>,
}

// =============================================================================
// TRAITS
// =============================================================================

/// A graph backend able to open transactions.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Open a read/write transaction.
    async fn begin(&self) -> Result<Box<dyn GraphTxn>, KgError>;

    /// Create a cosine vector index over `embedding` if it does not exist.
    async fn ensure_vector_index(
        &self,
        index: &VectorIndex,
        dimensions: usize,
    ) -> Result<(), KgError>;

    /// Compile a read query without running it, outside any open
    /// transaction. Statement errors are reported with kind `Query`.
    async fn check_query(&self, query: &str) -> Result<(), KgError>;
}

/// An open transaction.
///
/// Not safe for concurrent use; callers serialize access through the
/// owning context's lock. A transient failure terminates the transaction,
/// so a failed statement is never replayed on it.
#[async_trait]
pub trait GraphTxn: Send {
    /// Nearest neighbours ordered by descending score.
    async fn vector_search(&mut self, query: &VectorQuery) -> Result<Vec<VectorHit>, KgError>;

    /// Re-read a node by key. `None` if it no longer exists.
    async fn node_by_key(&mut self, key: &NodeKey) -> Result<Option<StoredNode>, KgError>;

    /// Look a node up by exact category and name.
    async fn find_by_name(
        &mut self,
        category: &str,
        name: &str,
    ) -> Result<Option<StoredNode>, KgError>;

    /// Create a node and return its key.
    async fn create_node(&mut self, node: &NewNode<'_>) -> Result<NodeKey, KgError>;

    /// Rewrite name, description and embedding of an existing node.
    async fn update_node(
        &mut self,
        key: &NodeKey,
        name: &str,
        description: &str,
        embedding: &[f32],
    ) -> Result<(), KgError>;

    /// Create or update a node keyed by `(category, name)`.
    async fn merge_node(
        &mut self,
        category: &str,
        name: &str,
        description: &str,
    ) -> Result<(), KgError>;

    /// Which of the given names exist on a node of any label.
    async fn existing_names(&mut self, names: &[&str]) -> Result<BTreeSet<String>, KgError>;

    /// Merge a relationship between two existing nodes, matched by name.
    ///
    /// Repeated merges of the same type and endpoints update the
    /// properties of the one relationship.
    async fn merge_edge(&mut self, edge: &EdgeRecord) -> Result<(), KgError>;

    /// Run a caller-supplied read query.
    ///
    /// A statement error fails the transaction: later calls and the commit
    /// are refused. Callers compile the query with
    /// [`GraphStore::check_query`] first.
    async fn read_query(&mut self, query: &str) -> Result<Vec<Record>, KgError>;

    /// All relationships incident to the named node, in either direction.
    async fn neighbors(&mut self, name: &str) -> Result<Vec<Adjacent>, KgError>;

    async fn commit(self: Box<Self>) -> Result<(), KgError>;

    async fn rollback(self: Box<Self>) -> Result<(), KgError>;
}

/// Create the vector index of every semantic category.
pub async fn ensure_indexes(
    store: &dyn GraphStore,
    taxonomy: &Taxonomy,
    dimensions: usize,
    retry: RetryPolicy,
) -> Result<Vec<VectorIndex>, KgError> {
    let indexes = taxonomy.vector_indexes();
    for index in &indexes {
        retry_transient!(
            retry,
            "ensure_vector_index",
            store.ensure_vector_index(index, dimensions)
        )?;
        info!(index = %index.name, label = %index.label, dimensions, "vector index ready");
    }
    Ok(indexes)
}
