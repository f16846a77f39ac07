//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the engine:
//! - Store identifiers and property values (`NodeKey`, `Scalar`, `Property`)
//! - Operation results (`UpsertOutcome`, `ScoredNode`, `EdgeRecord`, `Subgraph`)
//! - Comparator verdicts (`CompareResult`)
//! - Values read back from free-form queries (`GraphValue`)
//! - Error types (`KgError`, `StoreError`)

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// STORE IDENTIFIERS
// =============================================================================

/// Stable identifier the store assigns to a node.
///
/// Names can be rewritten by a dedup merge; the key cannot, so merges
/// always address the node through it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey(pub String);

impl NodeKey {
    /// Create a key from its textual form.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// PROPERTY VALUES
// =============================================================================

/// A scalar property value as accepted on edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Parse a loosely typed command-line value.
    ///
    /// Integers win over floats, `true`/`false` become booleans and
    /// everything else stays a string.
    #[must_use]
    pub fn parse_lossy(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>()
            && f.is_finite()
        {
            return Self::Float(f);
        }
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::String(raw.to_string()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One `(key, value)` pair of an edge's property list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: Scalar,
}

impl Property {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// OPERATION RESULTS
// =============================================================================

/// Result of a create_node call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The name the node is stored under.
    Canonical(String),
    /// Creation refused for a reference-data category.
    Rejected(String),
}

impl UpsertOutcome {
    /// The text handed back to the tool caller.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Canonical(name) | Self::Rejected(name) => name,
        }
    }

    /// The canonical name, if the node was written.
    #[must_use]
    pub fn canonical(&self) -> Option<&str> {
        match self {
            Self::Canonical(name) => Some(name),
            Self::Rejected(_) => None,
        }
    }
}

/// A vector search hit, stripped of its embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredNode {
    pub name: String,
    pub description: String,
    /// Category-specific extras such as a milestone's reached date.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub score: f64,
}

/// A relationship as written by the edge writer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeRecord {
    pub source_name: String,
    pub relationship: String,
    pub target_name: String,
    pub properties: Vec<Property>,
}

/// A node reached by the bounded traversal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TraversalNode {
    pub name: String,
    pub description: String,
}

/// A relationship reached by the bounded traversal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TraversalEdge {
    pub source_node_name: String,
    pub relationship: String,
    pub end_node_name: String,
}

/// Induced node and edge set of a traversal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Subgraph {
    pub nodes: Vec<TraversalNode>,
    pub edges: Vec<TraversalEdge>,
}

impl Subgraph {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

// =============================================================================
// COMPARATOR VERDICT
// =============================================================================

/// Structured verdict of the comparator client.
///
/// On the wire the optional fields are called `name` and `description`.
/// They only carry meaning when `different` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareResult {
    pub different: bool,
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub improved_name: Option<String>,
    #[serde(rename = "description", default, skip_serializing_if = "Option::is_none")]
    pub merged_description: Option<String>,
}

impl CompareResult {
    /// A "different concepts" verdict.
    #[must_use]
    pub fn different() -> Self {
        Self {
            different: true,
            improved_name: None,
            merged_description: None,
        }
    }

    /// A "same concept" verdict with optional merged fields.
    #[must_use]
    pub fn same(improved_name: Option<&str>, merged_description: Option<&str>) -> Self {
        Self {
            different: false,
            improved_name: improved_name.map(str::to_string),
            merged_description: merged_description.map(str::to_string),
        }
    }

    /// Parse the comparator's raw JSON output.
    ///
    /// Blank merged fields are treated as absent.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let mut verdict: Self = serde_json::from_str(raw.trim())?;
        verdict.improved_name = verdict.improved_name.filter(|s| !s.trim().is_empty());
        verdict.merged_description = verdict
            .merged_description
            .filter(|s| !s.trim().is_empty());
        Ok(verdict)
    }
}

// =============================================================================
// QUERY VALUES
// =============================================================================

/// A value read back from the store by a free-form query.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<GraphValue>),
    Map(BTreeMap<String, GraphValue>),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    LocalDateTime(NaiveDateTime),
    /// A node, represented by its properties.
    Node(BTreeMap<String, GraphValue>),
    Relationship {
        kind: String,
        properties: BTreeMap<String, GraphValue>,
    },
}

impl From<&Scalar> for GraphValue {
    fn from(value: &Scalar) -> Self {
        match value {
            Scalar::Bool(b) => Self::Bool(*b),
            Scalar::Int(i) => Self::Int(*i),
            Scalar::Float(f) => Self::Float(*f),
            Scalar::String(s) => Self::String(s.clone()),
        }
    }
}

/// One row of a free-form query, keyed by column name.
pub type Record = BTreeMap<String, GraphValue>;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Classification of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Temporary unavailability; retried with backoff.
    Transient,
    /// Syntax or semantic error in a statement.
    Query,
    /// Non-retriable client error (auth, protocol, constraint).
    Client,
    /// Anything else.
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transient => "transient",
            Self::Query => "query",
            Self::Client => "client",
            Self::Other => "unexpected",
        };
        f.write_str(label)
    }
}

/// A failure reported by the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} store error: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Transient, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Query, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Other, message)
    }
}

/// Which end of an edge could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSide {
    Source,
    Target,
}

impl fmt::Display for EndpointSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Target => f.write_str("target"),
        }
    }
}

/// A missing edge endpoint, with the name the caller used and the name it
/// resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEndpoint {
    pub side: EndpointSide,
    pub original: String,
    pub resolved: String,
}

impl fmt::Display for MissingEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} node '{}' (original: '{}')",
            self.side, self.resolved, self.original
        )
    }
}

fn describe_missing(missing: &[MissingEndpoint]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur in the engine.
///
/// Recoverable variants are handed back to the tool caller as data;
/// the rest abort the turn and roll its transaction back.
#[derive(Debug, Error)]
pub enum KgError {
    /// Bad arguments, rejected before any store access.
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// One or both edge endpoints do not exist.
    #[error("Cannot create edge: {} not found in database", describe_missing(.missing))]
    EndpointNotFound { missing: Vec<MissingEndpoint> },

    /// The embedding client failed or produced an unusable vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The comparator client could not be reached.
    #[error("Comparator error: {0}")]
    Comparator(String),

    /// The graph store reported a failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The turn's transaction has already been closed.
    #[error("The graph operation context is closed")]
    TurnClosed,

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A result could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl KgError {
    /// Whether the error should be reported to the caller as data
    /// instead of aborting the turn.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::EndpointNotFound { .. } => true,
            Self::Store(e) => e.kind == StoreErrorKind::Query,
            _ => false,
        }
    }

    /// Whether a retry with backoff may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if e.kind == StoreErrorKind::Transient)
    }
}

// =============================================================================
// TESTS
// =============================================================================
