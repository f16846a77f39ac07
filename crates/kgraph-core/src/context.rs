//! # Graph Operation Context
//!
//! Turn-scoped state shared by every engine operation:
//! - the turn's store transaction (exclusively owned)
//! - a mutual-exclusion lock serializing access to it
//! - the name map from caller-supplied names to canonical stored names
//!
//! A context is created by [`Engine::begin_turn`] and closed by
//! [`GraphOpsContext::commit`] or [`GraphOpsContext::rollback`]. Dropping an
//! open context (cancellation, early return) rolls the transaction back.

use crate::clients::{ComparatorClient, EmbeddingClient};
use crate::retry::{RetryPolicy, retry_transient};
use crate::store::{GraphStore, GraphTxn};
use crate::taxonomy::Taxonomy;
use crate::tools::ToolCall;
use crate::KgError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

// =============================================================================
// ENGINE
// =============================================================================

/// Long-lived engine handle. Cheap to clone; shared across turns.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingClient>,
    comparator: Arc<dyn ComparatorClient>,
    taxonomy: Arc<Taxonomy>,
    retry: RetryPolicy,
}

impl Engine {
    /// Create an engine with the default taxonomy and retry policy.
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn EmbeddingClient>,
        comparator: Arc<dyn ComparatorClient>,
    ) -> Self {
        Self {
            store,
            embedder,
            comparator,
            taxonomy: Arc::new(Taxonomy::default()),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the category taxonomy.
    #[must_use]
    pub fn with_taxonomy(mut self, taxonomy: Taxonomy) -> Self {
        self.taxonomy = Arc::new(taxonomy);
        self
    }

    /// Replace the transient-error retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub(crate) fn embedder(&self) -> &dyn EmbeddingClient {
        self.embedder.as_ref()
    }

    pub(crate) fn comparator(&self) -> &dyn ComparatorClient {
        self.comparator.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    pub(crate) fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Open a transaction and wrap it in a fresh context.
    ///
    /// Only opening is retried. A transient failure inside the turn fails
    /// its transaction and is returned to the caller.
    pub async fn begin_turn(&self) -> Result<GraphOpsContext, KgError> {
        let txn = retry_transient!(self.retry, "begin", self.store.begin())?;
        Ok(self.open(txn))
    }

    fn open(&self, txn: Box<dyn GraphTxn>) -> GraphOpsContext {
        debug!("turn opened");
        GraphOpsContext {
            engine: self.clone(),
            state: Mutex::new(TurnState {
                txn: Some(txn),
                names: BTreeMap::new(),
            }),
        }
    }

    /// Run a batch of tool calls as one turn.
    ///
    /// Recoverable failures become `{"error": ...}` results and the turn
    /// continues. The first fatal failure rolls the whole turn back and is
    /// returned; otherwise the turn commits.
    ///
    /// A transient failure anywhere in the turn rolls it back and replays
    /// every call on a fresh transaction, with backoff, until the retry
    /// policy is spent.
    pub async fn run_turn(&self, calls: Vec<ToolCall>) -> Result<Vec<Value>, KgError> {
        retry_transient!(self.retry, "turn", self.attempt_turn(&calls))
    }

    async fn attempt_turn(&self, calls: &[ToolCall]) -> Result<Vec<Value>, KgError> {
        let ctx = self.open(self.store.begin().await?);
        let mut results = Vec::with_capacity(calls.len());

        for call in calls.iter().cloned() {
            match ctx.dispatch(call).await {
                Ok(value) => results.push(value),
                Err(err) => {
                    warn!(error = %err, "turn aborted, rolling back");
                    if let Err(rollback_err) = ctx.rollback().await {
                        warn!(error = %rollback_err, "rollback failed");
                    }
                    return Err(err);
                }
            }
        }

        ctx.commit().await?;
        info!(calls = results.len(), "turn committed");
        Ok(results)
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

struct TurnState {
    txn: Option<Box<dyn GraphTxn>>,
    /// original name -> canonical name
    names: BTreeMap<String, String>,
}

/// Exclusive access to the turn's state, held while talking to the store.
pub(crate) struct TurnGuard<'a> {
    state: MutexGuard<'a, TurnState>,
}

impl TurnGuard<'_> {
    /// The open transaction.
    pub(crate) fn txn(&mut self) -> Result<&mut (dyn GraphTxn + 'static), KgError> {
        self.state.txn.as_deref_mut().ok_or(KgError::TurnClosed)
    }

    /// Resolve a caller-supplied name, falling back to the literal name.
    pub(crate) fn resolve(&self, name: &str) -> String {
        self.state
            .names
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Record that `original` is stored as itself.
    pub(crate) fn record_identity(&mut self, original: &str) {
        self.state
            .names
            .insert(original.to_string(), original.to_string());
    }

    /// Record a merge of `original` into a node previously called `previous`
    /// and now called `canonical`.
    ///
    /// Every earlier entry that pointed at `previous` follows the rename.
    pub(crate) fn record_merge(&mut self, previous: &str, original: &str, canonical: &str) {
        if previous != canonical {
            for target in self.state.names.values_mut() {
                if target == previous {
                    *target = canonical.to_string();
                }
            }
            self.state
                .names
                .insert(previous.to_string(), canonical.to_string());
        }
        self.state
            .names
            .insert(original.to_string(), canonical.to_string());
    }
}

/// Per-turn context. All operations take `&self` and may run concurrently;
/// store access is serialized internally.
pub struct GraphOpsContext {
    engine: Engine,
    state: Mutex<TurnState>,
}

impl GraphOpsContext {
    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) async fn lock(&self) -> TurnGuard<'_> {
        TurnGuard {
            state: self.state.lock().await,
        }
    }

    /// Canonical name for a caller-supplied name.
    pub async fn resolve(&self, name: &str) -> String {
        self.lock().await.resolve(name)
    }

    /// Snapshot of the name map.
    pub async fn name_map(&self) -> BTreeMap<String, String> {
        self.state.lock().await.names.clone()
    }

    /// Commit the turn's transaction.
    pub async fn commit(mut self) -> Result<(), KgError> {
        let txn = self.state.get_mut().txn.take().ok_or(KgError::TurnClosed)?;
        txn.commit().await
    }

    /// Roll the turn's transaction back.
    pub async fn rollback(mut self) -> Result<(), KgError> {
        let txn = self.state.get_mut().txn.take().ok_or(KgError::TurnClosed)?;
        txn.rollback().await
    }
}

impl Drop for GraphOpsContext {
    fn drop(&mut self) {
        let Some(txn) = self.state.get_mut().txn.take() else {
            return;
        };
        warn!("turn dropped with an open transaction, rolling back");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = txn.rollback().await {
                        warn!(error = %err, "rollback of dropped turn failed");
                    }
                });
            }
            Err(_) => warn!("no runtime available; transaction abandoned to the store"),
        }
    }
}
