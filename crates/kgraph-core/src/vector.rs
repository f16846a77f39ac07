//! # Vector Lookup
//!
//! Nearest-neighbour search over a semantic category's description
//! embeddings. Results never carry the embedding itself.

use crate::context::GraphOpsContext;
use crate::cypher::sanitize;
use crate::primitives::{DEFAULT_TOP_K, MAX_TOP_K};
use crate::store::VectorQuery;
use crate::taxonomy::validate_identifier;
use crate::{KgError, ScoredNode};
use tracing::debug;

impl GraphOpsContext {
    /// Find the `top_k` nodes of `category` closest to `query_text`,
    /// best score first.
    pub async fn find_node(
        &self,
        query_text: &str,
        category: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<ScoredNode>, KgError> {
        validate_identifier("category", category)?;
        if query_text.trim().is_empty() {
            return Err(KgError::Validation("query_text must not be empty".to_string()));
        }
        let taxonomy = self.engine().taxonomy();
        let index = taxonomy.vector_index(category)?;
        let top_k = top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K);

        let vector = self.embed_checked(query_text).await?;
        let query = VectorQuery {
            index,
            vector,
            pool: top_k,
            min_score: None,
            limit: top_k,
            extra_properties: taxonomy.extra_properties(category).to_vec(),
        };
        let hits = self.lock().await.txn()?.vector_search(&query).await?;
        debug!(category, hits = hits.len(), "vector lookup");

        Ok(hits
            .into_iter()
            .map(|hit| ScoredNode {
                name: hit.name,
                description: hit.description,
                properties: hit
                    .extra
                    .into_iter()
                    .map(|(k, v)| (k, sanitize(v)))
                    .collect(),
                score: hit.score,
            })
            .collect())
    }
}
