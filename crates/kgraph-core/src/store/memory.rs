//! # In-Memory Store
//!
//! A deterministic `GraphStore` for tests and offline runs.
//!
//! All data structures use `BTreeMap` for deterministic ordering.
//! A transaction reads and writes a private copy of the graph taken at
//! `begin` and logs its mutations. Commit replays the log onto the current
//! committed graph, so overlapping turns never overwrite each other;
//! rollback drops both.
//!
//! Like a Neo4j transaction, a transaction that hit a transient fault or a
//! statement error is failed: every later call, commit included, is refused.
//!
//! Vector scores follow the cosine convention of the Neo4j vector index:
//! `(1 + cos) / 2`, so identical directions score 1.0.

use super::{Adjacent, GraphStore, GraphTxn, NewNode, StoredNode, VectorHit, VectorQuery};
use crate::taxonomy::VectorIndex;
use crate::{
    EdgeRecord, GraphValue, KgError, NodeKey, Property, Record, Scalar, StoreError, StoreErrorKind,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

// =============================================================================
// GRAPH STATE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryNode {
    label: String,
    name: String,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, Scalar>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryEdge {
    source: u64,
    relationship: String,
    target: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<Property>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemoryGraph {
    nodes: BTreeMap<u64, MemoryNode>,
    edges: Vec<MemoryEdge>,
    next_id: u64,
}

impl MemoryGraph {
    fn insert(&mut self, node: MemoryNode) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.nodes.insert(id, node);
        id
    }

    fn ids_named(&self, name: &str) -> Vec<u64> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.name == name)
            .map(|(id, _)| *id)
            .collect()
    }

    fn find(&self, label: &str, name: &str) -> Option<u64> {
        self.nodes
            .iter()
            .find(|(_, n)| n.label == label && n.name == name)
            .map(|(id, _)| *id)
    }

    fn stored(&self, id: u64) -> Option<StoredNode> {
        self.nodes.get(&id).map(|n| StoredNode {
            key: NodeKey::new(id.to_string()),
            name: n.name.clone(),
            description: n.description.clone(),
        })
    }

    fn merge_named(&mut self, label: &str, name: &str, description: &str) {
        match self.find(label, name) {
            Some(id) => {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.description = description.to_string();
                }
            }
            None => {
                self.insert(MemoryNode {
                    label: label.to_string(),
                    name: name.to_string(),
                    description: description.to_string(),
                    embedding: None,
                    properties: BTreeMap::new(),
                });
            }
        }
    }

    fn update(&mut self, id: u64, name: &str, description: &str, embedding: &[f32]) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        node.name = name.to_string();
        node.description = description.to_string();
        node.embedding = Some(embedding.to_vec());
        true
    }

    /// Merge `edge` between every pair of nodes carrying its endpoint names.
    fn merge_named_edge(&mut self, edge: &EdgeRecord) {
        let sources = self.ids_named(&edge.source_name);
        let targets = self.ids_named(&edge.target_name);
        for s in &sources {
            for t in &targets {
                self.merge_edge(*s, &edge.relationship, *t, &edge.properties);
            }
        }
    }

    /// Apply a transaction's log. Ids of nodes created by the transaction
    /// are reassigned; ids read at `begin` are stable.
    fn replay(&mut self, log: Vec<Mutation>) {
        let mut created: BTreeMap<u64, u64> = BTreeMap::new();
        for mutation in log {
            match mutation {
                Mutation::Create { id, node } => {
                    let assigned = self.insert(node);
                    created.insert(id, assigned);
                }
                Mutation::Update {
                    id,
                    name,
                    description,
                    embedding,
                } => {
                    let id = created.get(&id).copied().unwrap_or(id);
                    if !self.update(id, &name, &description, &embedding) {
                        debug!(id, "updated node no longer exists, skipping");
                    }
                }
                Mutation::Merge {
                    label,
                    name,
                    description,
                } => self.merge_named(&label, &name, &description),
                Mutation::Edge(edge) => self.merge_named_edge(&edge),
            }
        }
    }

    fn merge_edge(&mut self, source: u64, relationship: &str, target: u64, props: &[Property]) {
        let existing = self.edges.iter_mut().find(|e| {
            e.source == source && e.target == target && e.relationship == relationship
        });
        match existing {
            Some(edge) => {
                for prop in props {
                    match edge.properties.iter_mut().find(|p| p.key == prop.key) {
                        Some(slot) => slot.value = prop.value.clone(),
                        None => edge.properties.push(prop.clone()),
                    }
                }
            }
            None => self.edges.push(MemoryEdge {
                source,
                relationship: relationship.to_string(),
                target,
                properties: props.to_vec(),
            }),
        }
    }
}

/// A write recorded by a transaction, replayed on commit.
#[derive(Debug, Clone)]
enum Mutation {
    Create {
        id: u64,
        node: MemoryNode,
    },
    Update {
        id: u64,
        name: String,
        description: String,
        embedding: Vec<f32>,
    },
    Merge {
        label: String,
        name: String,
        description: String,
    },
    Edge(EdgeRecord),
}

/// Cosine similarity mapped onto `[0, 1]`.
///
/// `None` for empty, mismatched or zero-length vectors.
fn cosine_score(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    let cos = dot / (norm_a.sqrt() * norm_b.sqrt());
    Some(((1.0 + cos) / 2.0).clamp(0.0, 1.0))
}

fn parse_key(key: &NodeKey) -> Option<u64> {
    key.as_str().parse().ok()
}

const UNSUPPORTED_QUERY: &str = "free-form Cypher queries are not supported by the in-memory store";

/// Injected transient failures: after `skip` clean calls, the next `count`
/// calls fail.
#[derive(Debug, Default)]
struct FaultPlan {
    skip: AtomicUsize,
    count: AtomicUsize,
}

impl FaultPlan {
    fn take(&self) -> Result<(), KgError> {
        if self.count.load(Ordering::SeqCst) == 0 {
            return Ok(());
        }
        let decrement = |n: usize| n.checked_sub(1);
        if self
            .skip
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, decrement)
            .is_ok()
        {
            return Ok(());
        }
        if self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, decrement)
            .is_ok()
        {
            return Err(StoreError::transient("store temporarily unavailable").into());
        }
        Ok(())
    }
}

// =============================================================================
// STORE
// =============================================================================

struct Shared {
    graph: MemoryGraph,
    snapshot: Option<PathBuf>,
}

impl Shared {
    fn persist(&self) -> Result<(), KgError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.graph)
            .map_err(|e| KgError::Serialization(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| KgError::Io(format!("Cannot write snapshot {}: {}", path.display(), e)))
    }
}

/// In-process graph store.
///
/// Cloning yields another handle onto the same graph.
#[derive(Clone)]
pub struct MemoryGraphStore {
    shared: Arc<Mutex<Shared>>,
    faults: Arc<FaultPlan>,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraphStore {
    /// Create an empty, non-persistent store.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(MemoryGraph::default(), None)
    }

    /// Open a store persisted as a JSON snapshot, creating it on first commit.
    pub fn open(path: &Path) -> Result<Self, KgError> {
        let graph = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                KgError::Io(format!("Cannot read snapshot {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&raw).map_err(|e| KgError::Serialization(e.to_string()))?
        } else {
            MemoryGraph::default()
        };
        Ok(Self::from_parts(graph, Some(path.to_path_buf())))
    }

    fn from_parts(graph: MemoryGraph, snapshot: Option<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared { graph, snapshot })),
            faults: Arc::new(FaultPlan::default()),
        }
    }

    /// Make the next `count` store calls fail with a transient error.
    pub fn inject_transient_faults(&self, count: usize) {
        self.inject_transient_faults_after(0, count);
    }

    /// Let `skip` store calls through, then fail the next `count`.
    pub fn inject_transient_faults_after(&self, skip: usize, count: usize) {
        self.faults.skip.store(skip, Ordering::SeqCst);
        self.faults.count.store(count, Ordering::SeqCst);
    }

    /// Insert a committed node directly, outside any transaction.
    pub async fn seed_node(
        &self,
        label: &str,
        name: &str,
        description: &str,
        embedding: Option<Vec<f32>>,
        properties: BTreeMap<String, Scalar>,
    ) -> Result<NodeKey, KgError> {
        let mut shared = self.shared.lock().await;
        let id = shared.graph.insert(MemoryNode {
            label: label.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            embedding,
            properties,
        });
        shared.persist()?;
        Ok(NodeKey::new(id.to_string()))
    }

    /// Insert a committed relationship directly between named nodes.
    pub async fn seed_edge(
        &self,
        source: &str,
        relationship: &str,
        target: &str,
    ) -> Result<(), KgError> {
        let mut shared = self.shared.lock().await;
        let sources = shared.graph.ids_named(source);
        let targets = shared.graph.ids_named(target);
        if sources.is_empty() || targets.is_empty() {
            return Err(StoreError::other(format!(
                "cannot seed {source}-[{relationship}]->{target}: endpoint missing"
            ))
            .into());
        }
        for s in &sources {
            for t in &targets {
                shared.graph.merge_edge(*s, relationship, *t, &[]);
            }
        }
        shared.persist()
    }

    /// `(name, description)` of every committed node with the label.
    pub async fn nodes_with_label(&self, label: &str) -> Vec<(String, String)> {
        let shared = self.shared.lock().await;
        shared
            .graph
            .nodes
            .values()
            .filter(|n| n.label == label)
            .map(|n| (n.name.clone(), n.description.clone()))
            .collect()
    }

    /// Committed embedding of the named node.
    pub async fn embedding_of(&self, name: &str) -> Option<Vec<f32>> {
        let shared = self.shared.lock().await;
        shared
            .graph
            .nodes
            .values()
            .find(|n| n.name == name)
            .and_then(|n| n.embedding.clone())
    }

    /// Every committed relationship as `(source, type, target, properties)`.
    pub async fn edges(&self) -> Vec<(String, String, String, Vec<Property>)> {
        let shared = self.shared.lock().await;
        let graph = &shared.graph;
        let name_of = |id: &u64| graph.nodes.get(id).map(|n| n.name.clone()).unwrap_or_default();
        graph
            .edges
            .iter()
            .map(|e| {
                (
                    name_of(&e.source),
                    e.relationship.clone(),
                    name_of(&e.target),
                    e.properties.clone(),
                )
            })
            .collect()
    }

    /// Number of committed nodes.
    pub async fn node_count(&self) -> usize {
        self.shared.lock().await.graph.nodes.len()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn begin(&self) -> Result<Box<dyn GraphTxn>, KgError> {
        self.faults.take()?;
        let working = self.shared.lock().await.graph.clone();
        Ok(Box::new(MemoryTxn {
            working,
            log: Vec::new(),
            failure: None,
            shared: Arc::clone(&self.shared),
            faults: Arc::clone(&self.faults),
        }))
    }

    async fn ensure_vector_index(
        &self,
        index: &VectorIndex,
        dimensions: usize,
    ) -> Result<(), KgError> {
        // Search scans nodes directly; nothing to build.
        debug!(index = %index.name, dimensions, "vector index is implicit in memory store");
        Ok(())
    }

    async fn check_query(&self, _query: &str) -> Result<(), KgError> {
        self.faults.take()?;
        Err(StoreError::query(UNSUPPORTED_QUERY).into())
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

struct MemoryTxn {
    working: MemoryGraph,
    log: Vec<Mutation>,
    /// Set once the transaction has failed.
    failure: Option<StoreError>,
    shared: Arc<Mutex<Shared>>,
    faults: Arc<FaultPlan>,
}

impl MemoryTxn {
    /// Gate every call: refuse on a failed transaction, fail it on a fault.
    fn enter(&mut self) -> Result<(), KgError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone().into());
        }
        if let Err(err) = self.faults.take() {
            self.failure = Some(StoreError::transient(
                "transaction terminated by a transient failure",
            ));
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl GraphTxn for MemoryTxn {
    async fn vector_search(&mut self, query: &VectorQuery) -> Result<Vec<VectorHit>, KgError> {
        self.enter()?;
        let mut scored: Vec<(u64, f64)> = self
            .working
            .nodes
            .iter()
            .filter(|(_, n)| n.label == query.index.label)
            .filter_map(|(id, n)| {
                let embedding = n.embedding.as_deref()?;
                cosine_score(&query.vector, embedding).map(|score| (*id, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(query.pool);
        if let Some(min) = query.min_score {
            scored.retain(|(_, score)| *score >= min);
        }
        scored.truncate(query.limit);

        let hits = scored
            .into_iter()
            .filter_map(|(id, score)| {
                let node = self.working.nodes.get(&id)?;
                let extra = query
                    .extra_properties
                    .iter()
                    .filter_map(|k| node.properties.get(k).map(|v| (k.clone(), GraphValue::from(v))))
                    .collect();
                Some(VectorHit {
                    key: NodeKey::new(id.to_string()),
                    name: node.name.clone(),
                    description: node.description.clone(),
                    extra,
                    score,
                })
            })
            .collect();
        Ok(hits)
    }

    async fn node_by_key(&mut self, key: &NodeKey) -> Result<Option<StoredNode>, KgError> {
        self.enter()?;
        Ok(parse_key(key).and_then(|id| self.working.stored(id)))
    }

    async fn find_by_name(
        &mut self,
        category: &str,
        name: &str,
    ) -> Result<Option<StoredNode>, KgError> {
        self.enter()?;
        Ok(self
            .working
            .find(category, name)
            .and_then(|id| self.working.stored(id)))
    }

    async fn create_node(&mut self, node: &NewNode<'_>) -> Result<NodeKey, KgError> {
        self.enter()?;
        let created = MemoryNode {
            label: node.category.to_string(),
            name: node.name.to_string(),
            description: node.description.to_string(),
            embedding: node.embedding.map(<[f32]>::to_vec),
            properties: BTreeMap::new(),
        };
        let id = self.working.insert(created.clone());
        self.log.push(Mutation::Create { id, node: created });
        Ok(NodeKey::new(id.to_string()))
    }

    async fn update_node(
        &mut self,
        key: &NodeKey,
        name: &str,
        description: &str,
        embedding: &[f32],
    ) -> Result<(), KgError> {
        self.enter()?;
        let id = parse_key(key)
            .filter(|id| self.working.update(*id, name, description, embedding))
            .ok_or_else(|| StoreError::other(format!("node {key} does not exist")))?;
        self.log.push(Mutation::Update {
            id,
            name: name.to_string(),
            description: description.to_string(),
            embedding: embedding.to_vec(),
        });
        Ok(())
    }

    async fn merge_node(
        &mut self,
        category: &str,
        name: &str,
        description: &str,
    ) -> Result<(), KgError> {
        self.enter()?;
        self.working.merge_named(category, name, description);
        self.log.push(Mutation::Merge {
            label: category.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        });
        Ok(())
    }

    async fn existing_names(&mut self, names: &[&str]) -> Result<BTreeSet<String>, KgError> {
        self.enter()?;
        Ok(self
            .working
            .nodes
            .values()
            .filter(|n| names.contains(&n.name.as_str()))
            .map(|n| n.name.clone())
            .collect())
    }

    async fn merge_edge(&mut self, edge: &EdgeRecord) -> Result<(), KgError> {
        self.enter()?;
        self.working.merge_named_edge(edge);
        self.log.push(Mutation::Edge(edge.clone()));
        Ok(())
    }

    async fn read_query(&mut self, _query: &str) -> Result<Vec<Record>, KgError> {
        self.enter()?;
        self.failure = Some(StoreError::new(
            StoreErrorKind::Client,
            "transaction marked as failed by an earlier statement error",
        ));
        Err(StoreError::query(UNSUPPORTED_QUERY).into())
    }

    async fn neighbors(&mut self, name: &str) -> Result<Vec<Adjacent>, KgError> {
        self.enter()?;
        let origin: BTreeSet<u64> = self.working.ids_named(name).into_iter().collect();
        let mut adjacent = Vec::new();
        for edge in &self.working.edges {
            let (other, outgoing) = if origin.contains(&edge.source) {
                (edge.target, true)
            } else if origin.contains(&edge.target) {
                (edge.source, false)
            } else {
                continue;
            };
            if let Some(node) = self.working.nodes.get(&other) {
                adjacent.push(Adjacent {
                    relationship: edge.relationship.clone(),
                    outgoing,
                    name: node.name.clone(),
                    description: node.description.clone(),
                    labels: vec![node.label.clone()],
                });
            }
        }
        Ok(adjacent)
    }

    async fn commit(self: Box<Self>) -> Result<(), KgError> {
        let mut txn = *self;
        txn.enter()?;
        let MemoryTxn { log, shared, .. } = txn;
        let mut shared = shared.lock().await;
        shared.graph.replay(log);
        shared.persist()
    }

    async fn rollback(self: Box<Self>) -> Result<(), KgError> {
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_score_bounds() {
        let a = [1.0, 0.0];
        assert_eq!(cosine_score(&a, &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_score(&a, &[-1.0, 0.0]), Some(0.0));
        assert_eq!(cosine_score(&a, &[0.0, 1.0]), Some(0.5));
        assert_eq!(cosine_score(&a, &[0.0, 0.0]), None);
        assert_eq!(cosine_score(&a, &[1.0]), None);
    }

    #[tokio::test]
    async fn uncommitted_writes_are_private() {
        let store = MemoryGraphStore::new();
        let mut txn = store.begin().await.expect("begin");
        txn.merge_node("Organization", "OpenAI", "lab")
            .await
            .expect("merge");
        assert_eq!(store.node_count().await, 0);
        txn.commit().await.expect("commit");
        assert_eq!(store.node_count().await, 1);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = MemoryGraphStore::new();
        let mut txn = store.begin().await.expect("begin");
        txn.merge_node("Organization", "OpenAI", "lab")
            .await
            .expect("merge");
        txn.rollback().await.expect("rollback");
        assert_eq!(store.node_count().await, 0);
    }

    #[tokio::test]
    async fn repeated_edge_merges_update_properties() {
        let store = MemoryGraphStore::new();
        store
            .seed_node("Idea", "A", "a", None, BTreeMap::new())
            .await
            .expect("seed");
        store
            .seed_node("Idea", "B", "b", None, BTreeMap::new())
            .await
            .expect("seed");

        let mut txn = store.begin().await.expect("begin");
        for weight in [1i64, 2] {
            let edge = EdgeRecord {
                source_name: "A".into(),
                relationship: "ENABLES".into(),
                target_name: "B".into(),
                properties: vec![Property::new("weight", weight)],
            };
            txn.merge_edge(&edge).await.expect("edge");
        }
        txn.commit().await.expect("commit");

        let edges = store.edges().await;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].3, vec![Property::new("weight", 2i64)]);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graph.json");

        let store = MemoryGraphStore::open(&path).expect("open");
        let mut txn = store.begin().await.expect("begin");
        txn.merge_node("Organization", "DeepMind", "lab")
            .await
            .expect("merge");
        txn.commit().await.expect("commit");

        let reopened = MemoryGraphStore::open(&path).expect("reopen");
        assert_eq!(
            reopened.nodes_with_label("Organization").await,
            vec![("DeepMind".to_string(), "lab".to_string())]
        );
    }

    #[tokio::test]
    async fn overlapping_commits_keep_both_writes() {
        let store = MemoryGraphStore::new();
        let mut first = store.begin().await.expect("begin");
        let mut second = store.begin().await.expect("begin");

        first
            .merge_node("Organization", "Acme", "d")
            .await
            .expect("merge");
        second.merge_node("Person", "Ada", "p").await.expect("merge");
        first.commit().await.expect("commit");
        second.commit().await.expect("commit");

        assert_eq!(store.node_count().await, 2);
    }

    #[tokio::test]
    async fn created_nodes_keep_their_updates_after_interleaved_commit() {
        let store = MemoryGraphStore::new();
        let mut early = store.begin().await.expect("begin");
        let mut late = store.begin().await.expect("begin");

        let key = late
            .create_node(&NewNode {
                category: "Idea",
                name: "Draft",
                description: "first",
                embedding: Some(&[1.0, 0.0]),
            })
            .await
            .expect("create");
        late.update_node(&key, "Final", "second", &[0.0, 1.0])
            .await
            .expect("update");
        early
            .create_node(&NewNode {
                category: "Idea",
                name: "Other",
                description: "o",
                embedding: None,
            })
            .await
            .expect("create");
        early.commit().await.expect("commit");
        late.commit().await.expect("commit");

        let mut ideas = store.nodes_with_label("Idea").await;
        ideas.sort();
        assert_eq!(
            ideas,
            vec![
                ("Final".to_string(), "second".to_string()),
                ("Other".to_string(), "o".to_string())
            ]
        );
        assert_eq!(store.embedding_of("Final").await, Some(vec![0.0, 1.0]));
    }

    #[tokio::test]
    async fn fault_fails_the_transaction() {
        let store = MemoryGraphStore::new();
        let mut txn = store.begin().await.expect("begin");
        txn.merge_node("Organization", "Acme", "d")
            .await
            .expect("merge");

        store.inject_transient_faults(1);
        let err = txn.merge_node("Person", "Ada", "p").await.expect_err("fault");
        assert!(err.is_transient());

        // The fault is spent, but the transaction stays failed.
        assert!(txn.merge_node("Person", "Ada", "p").await.is_err());
        assert!(txn.commit().await.is_err());
        assert_eq!(store.node_count().await, 0);
    }

    #[tokio::test]
    async fn statement_error_fails_the_transaction() {
        let store = MemoryGraphStore::new();
        let mut txn = store.begin().await.expect("begin");

        let err = txn.read_query("MATCH (n) RETURN n").await.expect_err("unsupported");
        assert!(err.is_recoverable());

        let after = txn
            .merge_node("Organization", "Acme", "d")
            .await
            .expect_err("failed transaction");
        assert!(!after.is_recoverable());
        assert!(txn.commit().await.is_err());

        let checked = store.check_query("MATCH (n) RETURN n").await.expect_err("unsupported");
        assert!(checked.is_recoverable());
    }

    #[tokio::test]
    async fn faults_can_start_after_clean_calls() {
        let store = MemoryGraphStore::new();
        store.inject_transient_faults_after(1, 1);
        let mut txn = store.begin().await.expect("begin");
        assert!(txn.merge_node("Person", "Ada", "p").await.is_err());
        assert!(store.begin().await.is_ok());
    }

    #[tokio::test]
    async fn injected_faults_are_transient() {
        let store = MemoryGraphStore::new();
        store.inject_transient_faults(1);
        let err = store.begin().await.err().expect("fault");
        assert!(err.is_transient());
        assert!(store.begin().await.is_ok());
    }
}
