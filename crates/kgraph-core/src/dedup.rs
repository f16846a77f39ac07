//! # Dedup Upsert
//!
//! Create-or-merge for semantic categories.
//!
//! 1. Embed the incoming description.
//! 2. Fetch up to `MAX_CANDIDATES` neighbours scoring at least
//!    `SIMILARITY_THRESHOLD` from the category's vector index.
//! 3. Ask the comparator about each candidate, best score first, and stop at
//!    the first "same" verdict.
//! 4. On a match, rewrite the existing node (by key) with the merged name,
//!    description and a fresh embedding.
//! 5. Otherwise create a new node, or refresh the node already carrying the
//!    name.
//!
//! Names stay unique within a semantic category: a merge never renames a
//! node onto a name another node holds.
//!
//! The lock is held only around store access. The merge write re-reads the
//! candidate under the lock, so a rename earlier in the turn is honoured.

use crate::clients::{CompareError, NodeText};
use crate::context::GraphOpsContext;
use crate::primitives::{CANDIDATE_POOL, MAX_CANDIDATES, SIMILARITY_THRESHOLD};
use crate::store::{NewNode, VectorHit, VectorQuery};
use crate::taxonomy::{CategoryKind, validate_identifier, validate_name};
use crate::{CompareResult, KgError, UpsertOutcome};
use tracing::{debug, info, info_span, warn, Instrument};

impl GraphOpsContext {
    /// Create a node, routing by category kind.
    ///
    /// Reference-data categories are refused with an explanatory message;
    /// the store is not touched.
    pub async fn create_node(
        &self,
        category: &str,
        name: &str,
        description: &str,
    ) -> Result<UpsertOutcome, KgError> {
        validate_identifier("category", category)?;
        validate_name("name", name)?;

        let taxonomy = self.engine().taxonomy();
        match taxonomy.kind(category) {
            CategoryKind::Reference => {
                info!(category, name, "refused to create reference-data node");
                Ok(UpsertOutcome::Rejected(taxonomy.rejection_message(category)))
            }
            CategoryKind::Simple => self
                .merge_simple(category, name, description)
                .await
                .map(UpsertOutcome::Canonical),
            CategoryKind::Semantic => self
                .upsert_semantic(category, name, description)
                .instrument(info_span!("dedup_upsert", category, name))
                .await
                .map(UpsertOutcome::Canonical),
        }
    }

    /// Embed text, refusing empty or all-zero vectors.
    pub(crate) async fn embed_checked(&self, text: &str) -> Result<Vec<f32>, KgError> {
        let vector = self.engine().embedder().embed(text).await?;
        if vector.is_empty() || vector.iter().all(|x| *x == 0.0) {
            return Err(KgError::Embedding(
                "embedding client returned an empty or all-zero vector".to_string(),
            ));
        }
        Ok(vector)
    }

    async fn upsert_semantic(
        &self,
        category: &str,
        name: &str,
        description: &str,
    ) -> Result<String, KgError> {
        let index = self.engine().taxonomy().vector_index(category)?;
        let vector = self.embed_checked(description).await?;

        let query = VectorQuery {
            index,
            vector,
            pool: CANDIDATE_POOL,
            min_score: Some(SIMILARITY_THRESHOLD),
            limit: MAX_CANDIDATES,
            extra_properties: Vec::new(),
        };
        let candidates = self.lock().await.txn()?.vector_search(&query).await?;
        debug!(candidates = candidates.len(), "dedup candidates");

        for candidate in &candidates {
            let Some(verdict) = self.judge(candidate, name, description).await? else {
                continue;
            };
            let merged = self
                .merge_into(category, candidate, &verdict, name, description)
                .await?;
            if let Some(canonical) = merged {
                return Ok(canonical);
            }
        }

        let mut turn = self.lock().await;
        let txn = turn.txn()?;
        match txn.find_by_name(category, name).await? {
            Some(existing) => {
                txn.update_node(&existing.key, &existing.name, description, &query.vector)
                    .await?;
                info!("refreshed node with the same name");
            }
            None => {
                txn.create_node(&NewNode {
                    category,
                    name,
                    description,
                    embedding: Some(&query.vector),
                })
                .await?;
                info!("created new node");
            }
        }
        turn.record_identity(name);
        Ok(name.to_string())
    }

    /// Ask the comparator about one candidate.
    ///
    /// `None` means "not the same concept", including unparseable verdicts.
    async fn judge(
        &self,
        candidate: &VectorHit,
        name: &str,
        description: &str,
    ) -> Result<Option<CompareResult>, KgError> {
        let verdict = self
            .engine()
            .comparator()
            .compare(
                NodeText::new(&candidate.name, &candidate.description),
                NodeText::new(name, description),
            )
            .await;

        match verdict {
            Ok(verdict) if verdict.different => {
                debug!(candidate = %candidate.name, score = candidate.score, "different concept");
                Ok(None)
            }
            Ok(verdict) => Ok(Some(verdict)),
            Err(CompareError::Parse(reason)) => {
                warn!(candidate = %candidate.name, %reason, "comparator verdict unparseable, treating as different");
                Ok(None)
            }
            Err(err @ CompareError::Transport(_)) => Err(KgError::Comparator(err.to_string())),
        }
    }

    /// Merge the incoming node into `candidate`.
    ///
    /// Returns `None` if the candidate disappeared since the search.
    async fn merge_into(
        &self,
        category: &str,
        candidate: &VectorHit,
        verdict: &CompareResult,
        name: &str,
        description: &str,
    ) -> Result<Option<String>, KgError> {
        let merged_description = verdict
            .merged_description
            .clone()
            .unwrap_or_else(|| description.to_string());
        let merged_vector = self.embed_checked(&merged_description).await?;

        let mut turn = self.lock().await;
        let txn = turn.txn()?;
        let Some(current) = txn.node_by_key(&candidate.key).await? else {
            warn!(candidate = %candidate.name, "candidate vanished before merge");
            return Ok(None);
        };
        let canonical = match &verdict.improved_name {
            Some(improved) if *improved != current.name => {
                let taken = txn
                    .find_by_name(category, improved)
                    .await?
                    .is_some_and(|other| other.key != candidate.key);
                if taken {
                    warn!(
                        current = %current.name,
                        improved = %improved,
                        "improved name belongs to another node, keeping current name"
                    );
                    current.name.clone()
                } else {
                    improved.clone()
                }
            }
            _ => current.name.clone(),
        };

        txn.update_node(&candidate.key, &canonical, &merged_description, &merged_vector)
            .await?;
        turn.record_merge(&current.name, name, &canonical);
        info!(
            previous = %current.name,
            canonical = %canonical,
            score = candidate.score,
            "merged into existing node"
        );
        Ok(Some(canonical))
    }
}
