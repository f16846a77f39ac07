//! # Engine Primitives
//!
//! Fixed runtime constants for the engine.
//!
//! Dedup thresholds and candidate caps are compiled in and are not
//! caller-configurable, so merge behavior stays predictable across runs.

/// Minimum vector similarity for a stored node to be a dedup candidate.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Number of nearest neighbours requested from the vector index during dedup.
pub const CANDIDATE_POOL: usize = 100;

/// Maximum number of candidates handed to the comparator.
///
/// Candidates are examined best-first and the first "same" verdict wins,
/// so this also bounds the comparator calls per upsert.
pub const MAX_CANDIDATES: usize = 10;

/// Default number of results for find_node.
pub const DEFAULT_TOP_K: usize = 25;

/// Upper bound on find_node results.
pub const MAX_TOP_K: usize = 100;

/// Default traversal depth for dfs.
pub const DEFAULT_TRAVERSAL_DEPTH: i64 = 3;

/// Maximum traversal depth for dfs.
///
/// - All traversals must be computationally bounded.
/// - Requests above this are clamped, not rejected.
pub const MAX_TRAVERSAL_DEPTH: usize = 10;

/// Default node cap for dfs results.
pub const DEFAULT_MAX_NODES: usize = 200;

/// Default edge cap for dfs results.
pub const DEFAULT_MAX_EDGES: usize = 400;

/// Property holding a node's description embedding.
///
/// Never returned to a caller.
pub const EMBEDDING_PROPERTY: &str = "embedding";

/// Suffix of every per-category vector index name.
pub const VECTOR_INDEX_SUFFIX: &str = "_description_embeddings";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for node names.
pub const MAX_NAME_LENGTH: usize = 512;

/// Maximum length for labels, relationship types and property keys.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Maximum number of properties on a single edge.
pub const MAX_EDGE_PROPERTIES: usize = 64;
