//! # Model Clients
//!
//! Narrow interfaces to the two model-backed collaborators:
//! - [`EmbeddingClient`]: description text to vector
//! - [`ComparatorClient`]: "are these two nodes the same concept?"
//!
//! Both are stateless and shared read-only across concurrent calls.

mod comparator;
mod embedding;

pub use comparator::{COMPARE_SYSTEM_PROMPT, ChatComparator};
pub use embedding::OpenAiEmbedder;

use crate::{CompareResult, KgError};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Name and description of one side of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeText<'a> {
    pub name: &'a str,
    pub description: &'a str,
}

impl<'a> NodeText<'a> {
    #[must_use]
    pub fn new(name: &'a str, description: &'a str) -> Self {
        Self { name, description }
    }
}

/// Comparator failures.
#[derive(Debug, Error)]
pub enum CompareError {
    /// The model answered but the verdict could not be parsed.
    #[error("unparseable comparator verdict: {0}")]
    Parse(String),
    /// The model could not be reached or refused the request.
    #[error("comparator request failed: {0}")]
    Transport(String),
}

/// Maps description text to a fixed-length vector.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KgError>;
}

/// Judges whether two nodes describe the same concept.
#[async_trait]
pub trait ComparatorClient: Send + Sync {
    async fn compare(
        &self,
        existing: NodeText<'_>,
        incoming: NodeText<'_>,
    ) -> Result<CompareResult, CompareError>;
}

// =============================================================================
// HTTP HELPERS
// =============================================================================

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| e.to_string())
}

/// Send a JSON POST and decode a JSON reply, flattening failures to text.
async fn post_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
) -> Result<T, String> {
    let resp = http
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| format!("cannot reach {url}: {e}"))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(format!("{url} returned {}: {}", status.as_u16(), text));
    }
    resp.json::<T>()
        .await
        .map_err(|e| format!("invalid response from {url}: {e}"))
}
