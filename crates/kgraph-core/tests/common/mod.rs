//! Shared fixtures: scripted model clients over the in-memory store.

#![allow(dead_code, clippy::unwrap_used, clippy::panic)]

use async_trait::async_trait;
use kgraph_core::store::{Adjacent, NewNode, StoredNode, VectorHit, VectorQuery};
use kgraph_core::taxonomy::VectorIndex;
use kgraph_core::{
    CompareError, CompareResult, ComparatorClient, EdgeRecord, EmbeddingClient, Engine,
    GraphStore, GraphTxn, KgError, MemoryGraphStore, NodeKey, NodeText, Record, RetryPolicy,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// Returns a fixed vector per text. Unknown text is an embedding error.
#[derive(Default)]
pub struct StaticEmbedder {
    vectors: Mutex<BTreeMap<String, Vec<f32>>>,
    calls: AtomicUsize,
}

impl StaticEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, text: &str, vector: &[f32]) -> Self {
        self.vectors
            .lock()
            .unwrap()
            .insert(text.to_string(), vector.to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingClient for StaticEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KgError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vectors
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .ok_or_else(|| KgError::Embedding(format!("no vector scripted for '{text}'")))
    }
}

// =============================================================================
// COMPARATOR
// =============================================================================

/// Scripted answer for one `(existing, incoming)` name pair.
#[derive(Debug, Clone)]
pub enum Verdict {
    Same {
        name: Option<&'static str>,
        description: Option<&'static str>,
    },
    Different,
    Garbage,
    Unreachable,
}

/// Answers from a script keyed by `(existing name, incoming name)`.
/// Unscripted pairs are "different".
#[derive(Default)]
pub struct ScriptedComparator {
    script: Mutex<BTreeMap<(String, String), Verdict>>,
    delays: Mutex<BTreeMap<(String, String), Duration>>,
    gate: Option<Arc<Barrier>>,
    history: Mutex<Vec<(String, String)>>,
}

impl ScriptedComparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, existing: &str, incoming: &str, verdict: Verdict) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert((existing.to_string(), incoming.to_string()), verdict);
        self
    }

    /// Hold every comparison until `parties` comparisons are in flight.
    pub fn gated(mut self, parties: usize) -> Self {
        self.gate = Some(Arc::new(Barrier::new(parties)));
        self
    }

    /// Answer the pair only after `millis` have passed.
    pub fn delayed(self, existing: &str, incoming: &str, millis: u64) -> Self {
        self.delays.lock().unwrap().insert(
            (existing.to_string(), incoming.to_string()),
            Duration::from_millis(millis),
        );
        self
    }

    /// `(existing, incoming)` pairs in call order.
    pub fn history(&self) -> Vec<(String, String)> {
        self.history.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.history.lock().unwrap().len()
    }
}

#[async_trait]
impl ComparatorClient for ScriptedComparator {
    async fn compare(
        &self,
        existing: NodeText<'_>,
        incoming: NodeText<'_>,
    ) -> Result<CompareResult, CompareError> {
        let key = (existing.name.to_string(), incoming.name.to_string());
        self.history.lock().unwrap().push(key.clone());
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        let delay = self.delays.lock().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let verdict = self
            .script
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or(Verdict::Different);
        match verdict {
            Verdict::Same { name, description } => Ok(CompareResult::same(name, description)),
            Verdict::Different => Ok(CompareResult::different()),
            Verdict::Garbage => Err(CompareError::Parse("not json".to_string())),
            Verdict::Unreachable => Err(CompareError::Transport("connection refused".to_string())),
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

pub struct Harness {
    pub store: MemoryGraphStore,
    pub embedder: Arc<StaticEmbedder>,
    pub comparator: Arc<ScriptedComparator>,
    pub engine: Engine,
}

pub fn harness(embedder: StaticEmbedder, comparator: ScriptedComparator) -> Harness {
    harness_with_store(MemoryGraphStore::new(), embedder, comparator)
}

pub fn harness_with_store(
    store: MemoryGraphStore,
    embedder: StaticEmbedder,
    comparator: ScriptedComparator,
) -> Harness {
    let embedder = Arc::new(embedder);
    let comparator = Arc::new(comparator);
    let engine = engine_over(Arc::new(store.clone()), &embedder, &comparator);
    Harness {
        store,
        embedder,
        comparator,
        engine,
    }
}

/// An engine over any store, without retries.
pub fn engine_over(
    store: Arc<dyn GraphStore>,
    embedder: &Arc<StaticEmbedder>,
    comparator: &Arc<ScriptedComparator>,
) -> Engine {
    Engine::new(
        store,
        Arc::clone(embedder) as Arc<dyn EmbeddingClient>,
        Arc::clone(comparator) as Arc<dyn ComparatorClient>,
    )
    .with_retry(RetryPolicy::none())
}

/// Property-free node seeding.
pub async fn seed(store: &MemoryGraphStore, label: &str, name: &str, vector: Option<&[f32]>) {
    store
        .seed_node(
            label,
            name,
            &format!("{name} description"),
            vector.map(<[f32]>::to_vec),
            BTreeMap::new(),
        )
        .await
        .unwrap();
}

// =============================================================================
// VANISHING NODES
// =============================================================================

/// A memory store whose transactions no longer find the given nodes by key,
/// as if another writer deleted them after they were searched.
#[derive(Clone)]
pub struct VanishingStore {
    pub inner: MemoryGraphStore,
    vanished: Arc<BTreeSet<NodeKey>>,
}

impl VanishingStore {
    pub fn new(inner: MemoryGraphStore, vanished: impl IntoIterator<Item = NodeKey>) -> Self {
        Self {
            inner,
            vanished: Arc::new(vanished.into_iter().collect()),
        }
    }
}

#[async_trait]
impl GraphStore for VanishingStore {
    async fn begin(&self) -> Result<Box<dyn GraphTxn>, KgError> {
        Ok(Box::new(VanishingTxn {
            inner: self.inner.begin().await?,
            vanished: Arc::clone(&self.vanished),
        }))
    }

    async fn ensure_vector_index(
        &self,
        index: &VectorIndex,
        dimensions: usize,
    ) -> Result<(), KgError> {
        self.inner.ensure_vector_index(index, dimensions).await
    }

    async fn check_query(&self, query: &str) -> Result<(), KgError> {
        self.inner.check_query(query).await
    }
}

struct VanishingTxn {
    inner: Box<dyn GraphTxn>,
    vanished: Arc<BTreeSet<NodeKey>>,
}

#[async_trait]
impl GraphTxn for VanishingTxn {
    async fn vector_search(&mut self, query: &VectorQuery) -> Result<Vec<VectorHit>, KgError> {
        self.inner.vector_search(query).await
    }

    async fn node_by_key(&mut self, key: &NodeKey) -> Result<Option<StoredNode>, KgError> {
        if self.vanished.contains(key) {
            return Ok(None);
        }
        self.inner.node_by_key(key).await
    }

    async fn find_by_name(
        &mut self,
        category: &str,
        name: &str,
    ) -> Result<Option<StoredNode>, KgError> {
        self.inner.find_by_name(category, name).await
    }

    async fn create_node(&mut self, node: &NewNode<'_>) -> Result<NodeKey, KgError> {
        self.inner.create_node(node).await
    }

    async fn update_node(
        &mut self,
        key: &NodeKey,
        name: &str,
        description: &str,
        embedding: &[f32],
    ) -> Result<(), KgError> {
        self.inner.update_node(key, name, description, embedding).await
    }

    async fn merge_node(
        &mut self,
        category: &str,
        name: &str,
        description: &str,
    ) -> Result<(), KgError> {
        self.inner.merge_node(category, name, description).await
    }

    async fn existing_names(&mut self, names: &[&str]) -> Result<BTreeSet<String>, KgError> {
        self.inner.existing_names(names).await
    }

    async fn merge_edge(&mut self, edge: &EdgeRecord) -> Result<(), KgError> {
        self.inner.merge_edge(edge).await
    }

    async fn read_query(&mut self, query: &str) -> Result<Vec<Record>, KgError> {
        self.inner.read_query(query).await
    }

    async fn neighbors(&mut self, name: &str) -> Result<Vec<Adjacent>, KgError> {
        self.inner.neighbors(name).await
    }

    async fn commit(self: Box<Self>) -> Result<(), KgError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), KgError> {
        self.inner.rollback().await
    }
}
