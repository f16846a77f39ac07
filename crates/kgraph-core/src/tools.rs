//! # Tool Surface
//!
//! The operations as an LLM tool-calling loop sees them: a JSON request
//! tagged by `"tool"` and a JSON result.
//!
//! Recoverable failures come back as `{"error": "..."}` so the caller can
//! correct itself; fatal failures are returned as `Err` and end the turn.

use crate::context::GraphOpsContext;
use crate::primitives::DEFAULT_TRAVERSAL_DEPTH;
use crate::traversal::TraversalLimits;
use crate::{KgError, Property, UpsertOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info_span, warn, Instrument};

fn default_depth() -> i64 {
    DEFAULT_TRAVERSAL_DEPTH
}

/// One tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolCall {
    CreateNode {
        category: String,
        name: String,
        description: String,
    },
    CreateEdge {
        source_name: String,
        target_name: String,
        relationship_type: String,
        #[serde(default)]
        properties: Vec<Property>,
    },
    FindNode {
        query_text: String,
        category: String,
        #[serde(default)]
        top_k: Option<usize>,
    },
    ExecuteCypherQuery {
        query: String,
    },
    Dfs {
        start_name: String,
        start_category: String,
        #[serde(default = "default_depth")]
        max_depth: i64,
        #[serde(default)]
        max_nodes: Option<usize>,
        #[serde(default)]
        max_edges: Option<usize>,
    },
}

impl ToolCall {
    /// The tool name as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateNode { .. } => "create_node",
            Self::CreateEdge { .. } => "create_edge",
            Self::FindNode { .. } => "find_node",
            Self::ExecuteCypherQuery { .. } => "execute_cypher_query",
            Self::Dfs { .. } => "dfs",
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, KgError> {
    serde_json::to_value(value).map_err(|e| KgError::Serialization(e.to_string()))
}

impl GraphOpsContext {
    /// Execute one tool call and render its result.
    pub async fn dispatch(&self, call: ToolCall) -> Result<Value, KgError> {
        let span = info_span!("tool", name = call.name());
        let result = self.run_call(call).instrument(span).await;
        match result {
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "tool call failed");
                Ok(json!({ "error": err.to_string() }))
            }
            other => other,
        }
    }

    async fn run_call(&self, call: ToolCall) -> Result<Value, KgError> {
        match call {
            ToolCall::CreateNode {
                category,
                name,
                description,
            } => {
                let outcome = self.create_node(&category, &name, &description).await?;
                Ok(match outcome {
                    UpsertOutcome::Canonical(name) | UpsertOutcome::Rejected(name) => {
                        Value::String(name)
                    }
                })
            }
            ToolCall::CreateEdge {
                source_name,
                target_name,
                relationship_type,
                properties,
            } => {
                let record = self
                    .create_edge(&source_name, &target_name, &relationship_type, &properties)
                    .await?;
                to_json(&record)
            }
            ToolCall::FindNode {
                query_text,
                category,
                top_k,
            } => to_json(&self.find_node(&query_text, &category, top_k).await?),
            ToolCall::ExecuteCypherQuery { query } => {
                to_json(&self.execute_cypher_query(&query).await?)
            }
            ToolCall::Dfs {
                start_name,
                start_category,
                max_depth,
                max_nodes,
                max_edges,
            } => {
                let defaults = TraversalLimits::default();
                let limits = TraversalLimits {
                    max_depth,
                    max_nodes: max_nodes.unwrap_or(defaults.max_nodes),
                    max_edges: max_edges.unwrap_or(defaults.max_edges),
                };
                to_json(&self.dfs(&start_name, &start_category, limits).await?)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::Scalar;

    #[test]
    fn calls_parse_from_tagged_json() {
        let calls: Vec<ToolCall> = serde_json::from_str(
            r#"[
                {"tool": "create_node", "category": "Idea", "name": "AI", "description": "d"},
                {"tool": "create_edge", "source_name": "AI", "target_name": "ML",
                 "relationship_type": "ENABLES",
                 "properties": [{"key": "since", "value": 2024}]},
                {"tool": "find_node", "query_text": "machine minds", "category": "Idea"},
                {"tool": "execute_cypher_query", "query": "MATCH (n) RETURN n"},
                {"tool": "dfs", "start_name": "AI", "start_category": "Idea"}
            ]"#,
        )
        .expect("parse");

        assert_eq!(calls.len(), 5);
        match &calls[1] {
            ToolCall::CreateEdge { properties, .. } => {
                assert_eq!(properties[0].value, Scalar::Int(2024));
            }
            other => panic!("unexpected call {other:?}"),
        }
        assert!(matches!(calls[2], ToolCall::FindNode { top_k: None, .. }));
        assert!(matches!(
            calls[4],
            ToolCall::Dfs {
                max_depth: 3,
                max_nodes: None,
                ..
            }
        ));
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let parsed: Result<ToolCall, _> =
            serde_json::from_str(r#"{"tool": "drop_database"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn wire_names_match_tags() {
        let call = ToolCall::ExecuteCypherQuery {
            query: "RETURN 1".into(),
        };
        let value = serde_json::to_value(&call).expect("serialize");
        assert_eq!(value["tool"], call.name());
    }
}
