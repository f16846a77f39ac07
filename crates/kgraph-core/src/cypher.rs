//! # Query Executor
//!
//! Runs caller-supplied read-only Cypher inside the turn's transaction.
//!
//! - Write clauses are refused before the store sees the statement.
//! - The statement is compiled outside the turn first. A statement error
//!   inside the transaction would fail it, losing the turn's writes.
//! - `embedding` keys are stripped from every record at any depth.
//! - Temporal values are rendered as ISO-8601 strings.
//! - Syntax errors come back as data (`{"error": ...}`), so an LLM caller
//!   can revise the query within the same turn.

use crate::context::GraphOpsContext;
use crate::primitives::EMBEDDING_PROPERTY;
use crate::retry::retry_transient;
use crate::{GraphValue, KgError, Record};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Clauses that mutate the graph or reach outside it.
const WRITE_CLAUSES: &[&str] = &[
    "CREATE", "MERGE", "SET", "DELETE", "DETACH", "REMOVE", "DROP", "FOREACH", "LOAD",
];

/// Procedures a read query may CALL (lower-case, exact).
const READ_PROCEDURES: &[&str] = &[
    "db.index.vector.querynodes",
    "db.index.vector.queryrelationships",
    "db.labels",
    "db.relationshiptypes",
    "db.propertykeys",
    "db.schema.visualization",
    "db.schema.nodetypeproperties",
    "db.schema.reltypeproperties",
];

/// Outcome of a read query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    /// Sanitized records, possibly empty.
    Rows(Vec<Map<String, Value>>),
    /// A recoverable query failure, reported as data.
    Error { error: String },
}

// =============================================================================
// READ-ONLY GUARD
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
enum Token {
    /// A keyword, identifier or dotted name.
    Word(String),
    Punct(char),
}

/// Split a statement into words and punctuation, skipping string literals,
/// backtick-quoted identifiers and comments.
fn tokenize(statement: &str) -> Vec<Token> {
    let chars: Vec<char> = statement.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                i += 1;
                while i < chars.len() && chars[i] != c {
                    if chars[i] == '\\' && c != '`' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric()
                        || chars[i] == '_'
                        || (chars[i] == '.'
                            && chars.get(i + 1).is_some_and(|n| n.is_alphanumeric() || *n == '_')))
                {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            c if c.is_whitespace() => i += 1,
            c => {
                tokens.push(Token::Punct(c));
                i += 1;
            }
        }
    }
    tokens
}

/// Refuse statements that could write. Returns the reason on refusal.
pub fn check_read_only(statement: &str) -> Result<(), String> {
    let tokens = tokenize(statement);
    for (pos, token) in tokens.iter().enumerate() {
        let Token::Word(word) = token else {
            continue;
        };
        // Property access (`n.set`) and map keys (`{set: 1}`) are not clauses.
        if matches!(tokens.get(pos + 1), Some(Token::Punct(':')))
            || (pos > 0 && matches!(tokens[pos - 1], Token::Punct('.')))
        {
            continue;
        }
        let upper = word.to_ascii_uppercase();
        if WRITE_CLAUSES.contains(&upper.as_str()) {
            return Err(format!(
                "Only read-only queries are allowed; found write clause '{upper}'"
            ));
        }
        if upper == "CALL" {
            match tokens.get(pos + 1) {
                Some(Token::Punct('{')) => {}
                Some(Token::Word(proc)) => {
                    let proc = proc.to_ascii_lowercase();
                    if !READ_PROCEDURES.contains(&proc.as_str()) {
                        return Err(format!(
                            "Only read-only queries are allowed; procedure '{proc}' is not permitted"
                        ));
                    }
                }
                _ => return Err("Only read-only queries are allowed; malformed CALL".to_string()),
            }
        }
    }
    Ok(())
}

// =============================================================================
// SANITIZATION
// =============================================================================

fn sanitize_map(map: BTreeMap<String, GraphValue>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(key, _)| key != EMBEDDING_PROPERTY)
        .map(|(key, value)| (key, sanitize(value)))
        .collect()
}

/// Convert a store value to JSON, dropping embeddings and rendering temporals.
pub fn sanitize(value: GraphValue) -> Value {
    match value {
        GraphValue::Null => Value::Null,
        GraphValue::Bool(b) => Value::Bool(b),
        GraphValue::Int(i) => Value::Number(i.into()),
        GraphValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        GraphValue::String(s) => Value::String(s),
        GraphValue::List(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        GraphValue::Map(map) | GraphValue::Node(map) => Value::Object(sanitize_map(map)),
        GraphValue::Relationship { kind, properties } => {
            let mut out = Map::new();
            out.insert("type".to_string(), Value::String(kind));
            out.insert("properties".to_string(), Value::Object(sanitize_map(properties)));
            Value::Object(out)
        }
        GraphValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        GraphValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
        GraphValue::LocalDateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
    }
}

/// Sanitize a whole record.
pub fn sanitize_record(record: Record) -> Map<String, Value> {
    sanitize_map(record)
}

// =============================================================================
// OPERATION
// =============================================================================

impl GraphOpsContext {
    /// Execute a read-only query.
    ///
    /// Refused and malformed queries yield `QueryOutcome::Error`; transient
    /// exhaustion and client errors are raised and abort the turn.
    pub async fn execute_cypher_query(&self, query: &str) -> Result<QueryOutcome, KgError> {
        if query.trim().is_empty() {
            return Err(KgError::Validation("query must not be empty".to_string()));
        }
        if let Err(reason) = check_read_only(query) {
            warn!(%reason, "refused query");
            return Ok(QueryOutcome::Error { error: reason });
        }

        let engine = self.engine();
        let result = match retry_transient!(
            engine.retry(),
            "check_query",
            engine.store().check_query(query)
        ) {
            Ok(()) => self.lock().await.txn()?.read_query(query).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(records) => {
                debug!(rows = records.len(), "query executed");
                Ok(QueryOutcome::Rows(
                    records.into_iter().map(sanitize_record).collect(),
                ))
            }
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "query failed");
                Ok(QueryOutcome::Error {
                    error: err.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate};

    #[test]
    fn plain_reads_pass() {
        assert!(check_read_only("MATCH (n:Idea) RETURN n.name LIMIT 5").is_ok());
        assert!(
            check_read_only(
                "MATCH (n:Idea)-[r]->(m) WHERE n.name CONTAINS 'x' RETURN n, r, m ORDER BY n.name"
            )
            .is_ok()
        );
    }

    #[test]
    fn write_clauses_are_refused() {
        for q in [
            "CREATE (n:Idea {name: 'x'})",
            "MATCH (n) DETACH DELETE n",
            "MATCH (n) set n.name = 'y'",
            "MERGE (n:Idea {name: 'x'})",
            "MATCH (n) REMOVE n.description",
            "LOAD CSV FROM 'file:///x' AS row RETURN row",
            "MATCH (n) FOREACH (x IN [1] | SET n.a = x)",
        ] {
            assert!(check_read_only(q).is_err(), "{q}");
        }
    }

    #[test]
    fn keywords_inside_literals_and_comments_are_ignored() {
        assert!(check_read_only("MATCH (n) WHERE n.description = 'create merge' RETURN n").is_ok());
        assert!(check_read_only("MATCH (n) RETURN n.`set` // DELETE everything").is_ok());
        assert!(check_read_only("MATCH (n) /* MERGE */ RETURN n.set, {create: 1}").is_ok());
        assert!(check_read_only(r#"MATCH (n) WHERE n.name = "it\"s SET" RETURN n"#).is_ok());
    }

    #[test]
    fn calls_are_restricted() {
        assert!(
            check_read_only(
                "CALL db.index.vector.queryNodes('idea_description_embeddings', 5, $v) YIELD node RETURN node"
            )
            .is_ok()
        );
        assert!(check_read_only("CALL db.labels()").is_ok());
        assert!(check_read_only("CALL apoc.periodic.iterate('a', 'b', {})").is_err());
        assert!(check_read_only("CALL dbms.killQuery('q')").is_err());
        assert!(check_read_only("CALL db.schema.nodeTypeProperties()").is_ok());
        for q in [
            "CALL db.index.vector.createNodeIndex('x', 'Idea', 'embedding', 4, 'cosine')",
            "CALL db.index.vector.queryNodesAndDelete('x', 1, $v)",
            "CALL db.labelsWithSideEffects()",
        ] {
            assert!(check_read_only(q).is_err(), "{q}");
        }
        assert!(check_read_only("MATCH (n) CALL { WITH n RETURN n.name AS x } RETURN x").is_ok());
    }

    #[test]
    fn embeddings_are_stripped_at_any_depth() {
        let mut node = BTreeMap::new();
        node.insert("name".to_string(), GraphValue::String("AI".into()));
        node.insert(
            "embedding".to_string(),
            GraphValue::List(vec![GraphValue::Float(0.1)]),
        );
        let mut inner = BTreeMap::new();
        inner.insert("embedding".to_string(), GraphValue::List(vec![]));
        inner.insert("node".to_string(), GraphValue::Node(node.clone()));

        let mut record = Record::new();
        record.insert("n".to_string(), GraphValue::Node(node));
        record.insert("nested".to_string(), GraphValue::List(vec![GraphValue::Map(inner)]));
        record.insert("embedding".to_string(), GraphValue::Null);

        let json = Value::Object(sanitize_record(record)).to_string();
        assert!(!json.contains("embedding"), "{json}");
        assert!(json.contains("\"name\":\"AI\""));
    }

    #[test]
    fn temporals_become_iso_strings() {
        let date = NaiveDate::from_ymd_opt(2029, 12, 31).expect("date");
        assert_eq!(sanitize(GraphValue::Date(date)), Value::String("2029-12-31".into()));

        let dt = DateTime::parse_from_rfc3339("2030-01-02T03:04:05+02:00").expect("dt");
        assert_eq!(
            sanitize(GraphValue::DateTime(dt)),
            Value::String("2030-01-02T03:04:05+02:00".into())
        );
    }

    #[test]
    fn relationships_keep_their_type() {
        let value = sanitize(GraphValue::Relationship {
            kind: "ENABLES".into(),
            properties: BTreeMap::new(),
        });
        assert_eq!(value["type"], "ENABLES");
    }
}
