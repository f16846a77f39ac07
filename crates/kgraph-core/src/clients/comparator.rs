//! Chat-completion comparator.
//!
//! Asks an OpenAI-compatible chat model for a structured same/different
//! verdict, constrained by a JSON schema.

use super::{CompareError, ComparatorClient, NodeText, http_client, post_json};
use crate::config::ComparatorSettings;
use crate::{CompareResult, KgError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

/// System prompt sent with every comparison.
pub const COMPARE_SYSTEM_PROMPT: &str = "Determine whether the following two nodes represent \
the same concept by carefully comparing their names and descriptions. Reason step by step: \
First, analyze similarities in meaning. Second, decide if they are semantically identical. \
If they are the same, provide an improved short name (combining the best aspects) and a merged \
description (concise, comprehensive, avoiding redundancy). If different, just indicate they are \
different. Always output only a JSON object with keys: different (boolean), and optionally name \
(string) and description (string) if not different.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn verdict_schema() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "compare_result",
            "schema": {
                "type": "object",
                "properties": {
                    "different": { "type": "boolean" },
                    "name": { "type": "string" },
                    "description": { "type": "string" }
                },
                "required": ["different"],
                "additionalProperties": false
            }
        }
    })
}

fn user_message(existing: NodeText<'_>, incoming: NodeText<'_>) -> String {
    format!(
        "Node A name: {}\nNode A description: {}\n\nNode B name: {}\nNode B description: {}",
        existing.name, existing.description, incoming.name, incoming.description
    )
}

/// Comparator over an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatComparator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    reasoning_effort: Option<String>,
}

impl std::fmt::Debug for ChatComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatComparator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("reasoning_effort", &self.reasoning_effort)
            .finish()
    }
}

impl ChatComparator {
    pub fn new(settings: &ComparatorSettings, api_key: impl Into<String>) -> Result<Self, KgError> {
        Ok(Self {
            http: http_client(settings.timeout_secs).map_err(KgError::Comparator)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            reasoning_effort: settings
                .reasoning_effort
                .clone()
                .filter(|effort| !effort.trim().is_empty()),
        })
    }

    fn request_body(&self, existing: NodeText<'_>, incoming: NodeText<'_>) -> Value {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": COMPARE_SYSTEM_PROMPT },
                { "role": "user", "content": user_message(existing, incoming) }
            ],
            "response_format": verdict_schema(),
        });
        if let Some(effort) = &self.reasoning_effort {
            body["reasoning_effort"] = Value::String(effort.clone());
        }
        body
    }
}

#[async_trait]
impl ComparatorClient for ChatComparator {
    async fn compare(
        &self,
        existing: NodeText<'_>,
        incoming: NodeText<'_>,
    ) -> Result<CompareResult, CompareError> {
        let body = self.request_body(existing, incoming);
        let url = format!("{}/chat/completions", self.base_url);
        let response: ChatResponse = post_json(&self.http, &url, &self.api_key, &body)
            .await
            .map_err(CompareError::Transport)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompareError::Parse("empty completion".to_string()))?;
        debug!(existing = existing.name, incoming = incoming.name, verdict = %content, "comparator verdict");

        CompareResult::parse(&content).map_err(|e| CompareError::Parse(format!("{e}: {content}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_layout() {
        let msg = user_message(
            NodeText::new("Singularity", "a point"),
            NodeText::new("The Singularity", "refers to a point"),
        );
        assert_eq!(
            msg,
            "Node A name: Singularity\nNode A description: a point\n\n\
             Node B name: The Singularity\nNode B description: refers to a point"
        );
    }

    #[test]
    fn schema_requires_verdict() {
        let schema = verdict_schema();
        assert_eq!(schema["json_schema"]["name"], "compare_result");
        assert_eq!(schema["json_schema"]["schema"]["required"], json!(["different"]));
    }

    #[test]
    fn request_carries_reasoning_effort() {
        let a = NodeText::new("A", "a");
        let b = NodeText::new("B", "b");

        let comparator = ChatComparator::new(&ComparatorSettings::default(), "key").expect("client");
        let body = comparator.request_body(a, b);
        assert_eq!(body["reasoning_effort"], "low");
        assert_eq!(body["model"], "openai/gpt-oss-120b");

        let settings = ComparatorSettings {
            reasoning_effort: None,
            ..ComparatorSettings::default()
        };
        let comparator = ChatComparator::new(&settings, "key").expect("client");
        assert!(comparator.request_body(a, b).get("reasoning_effort").is_none());

        let settings = ComparatorSettings {
            reasoning_effort: Some(" ".to_string()),
            ..ComparatorSettings::default()
        };
        let comparator = ChatComparator::new(&settings, "key").expect("client");
        assert!(comparator.request_body(a, b).get("reasoning_effort").is_none());
    }
}
