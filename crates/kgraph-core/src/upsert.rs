//! # Simple Upsert
//!
//! Idempotent create-or-update keyed by exact `(category, name)`.
//! No embedding, no comparator; the returned name is always the given one.

use crate::context::GraphOpsContext;
use crate::taxonomy::{validate_identifier, validate_name};
use crate::KgError;
use tracing::debug;

impl GraphOpsContext {
    /// Merge a node of a simple category and record it in the name map.
    pub(crate) async fn merge_simple(
        &self,
        category: &str,
        name: &str,
        description: &str,
    ) -> Result<String, KgError> {
        validate_identifier("category", category)?;
        validate_name("name", name)?;

        let mut turn = self.lock().await;
        turn.txn()?.merge_node(category, name, description).await?;
        turn.record_identity(name);
        debug!(category, name, "merged simple node");
        Ok(name.to_string())
    }
}
