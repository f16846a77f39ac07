//! # Neo4j Store
//!
//! `GraphStore` over Bolt using `neo4rs`.
//!
//! Labels, relationship types and property keys are validated identifiers
//! spliced into the statement text; every value travels as a parameter.

use super::{Adjacent, GraphStore, GraphTxn, NewNode, StoredNode, VectorHit, VectorQuery};
use crate::config::StoreSettings;
use crate::primitives::EMBEDDING_PROPERTY;
use crate::taxonomy::VectorIndex;
use crate::{EdgeRecord, GraphValue, KgError, NodeKey, Record, Scalar, StoreError, StoreErrorKind};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use neo4rs::{
    BoltMap, BoltType, ConfigBuilder, Graph, Neo4jClientErrorKind, Neo4jErrorKind, Query, Row,
    Txn, query,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

// =============================================================================
// ERROR CLASSIFICATION
// =============================================================================

/// Map a driver error onto the engine's store taxonomy.
fn classify(err: neo4rs::Error) -> KgError {
    let kind = match &err {
        neo4rs::Error::Neo4j(e) => match e.kind() {
            Neo4jErrorKind::Transient => StoreErrorKind::Transient,
            Neo4jErrorKind::Client(Neo4jClientErrorKind::SessionExpired) => {
                StoreErrorKind::Transient
            }
            Neo4jErrorKind::Client(_) if e.code().starts_with("Neo.ClientError.Statement.") => {
                StoreErrorKind::Query
            }
            Neo4jErrorKind::Client(_) => StoreErrorKind::Client,
            Neo4jErrorKind::Database | Neo4jErrorKind::Unknown => StoreErrorKind::Other,
        },
        neo4rs::Error::ConnectionError | neo4rs::Error::IOError { .. } => {
            StoreErrorKind::Transient
        }
        neo4rs::Error::AuthenticationError(_) => StoreErrorKind::Client,
        _ => StoreErrorKind::Other,
    };
    StoreError::new(kind, err.to_string()).into()
}

fn decode(err: impl std::fmt::Display) -> KgError {
    StoreError::other(format!("cannot decode row: {err}")).into()
}

// =============================================================================
// VALUE CONVERSION
// =============================================================================

fn scalar_to_bolt(value: &Scalar) -> BoltType {
    match value {
        Scalar::Bool(b) => BoltType::from(*b),
        Scalar::Int(i) => BoltType::from(*i),
        Scalar::Float(f) => BoltType::from(*f),
        Scalar::String(s) => BoltType::from(s.as_str()),
    }
}

fn map_to_graph(map: BoltMap) -> BTreeMap<String, GraphValue> {
    map.value
        .into_iter()
        .map(|(k, v)| (k.value, to_graph_value(v)))
        .collect()
}

/// Convert a driver value into a `GraphValue`.
///
/// Temporal values become chrono types; spatial, duration and byte values
/// fall back to their debug text.
fn to_graph_value(value: BoltType) -> GraphValue {
    match value {
        BoltType::Null(_) => GraphValue::Null,
        BoltType::Boolean(b) => GraphValue::Bool(b.value),
        BoltType::Integer(i) => GraphValue::Int(i.value),
        BoltType::Float(f) => GraphValue::Float(f.value),
        BoltType::String(s) => GraphValue::String(s.value),
        BoltType::List(list) => {
            GraphValue::List(list.value.into_iter().map(to_graph_value).collect())
        }
        BoltType::Map(map) => GraphValue::Map(map_to_graph(map)),
        BoltType::Node(node) => GraphValue::Node(map_to_graph(node.properties)),
        BoltType::Relation(rel) => GraphValue::Relationship {
            kind: rel.typ.value,
            properties: map_to_graph(rel.properties),
        },
        BoltType::UnboundedRelation(rel) => GraphValue::Relationship {
            kind: rel.typ.value,
            properties: map_to_graph(rel.properties),
        },
        BoltType::Path(path) => {
            let mut parts = BTreeMap::new();
            parts.insert(
                "nodes".to_string(),
                GraphValue::List(path.nodes.value.into_iter().map(to_graph_value).collect()),
            );
            parts.insert(
                "relationships".to_string(),
                GraphValue::List(path.rels.value.into_iter().map(to_graph_value).collect()),
            );
            GraphValue::Map(parts)
        }
        BoltType::Date(d) => NaiveDate::try_from(&d)
            .map(GraphValue::Date)
            .unwrap_or(GraphValue::Null),
        BoltType::DateTime(d) => DateTime::<FixedOffset>::try_from(&d)
            .map(GraphValue::DateTime)
            .unwrap_or(GraphValue::Null),
        BoltType::DateTimeZoneId(d) => DateTime::<FixedOffset>::try_from(&d)
            .map(GraphValue::DateTime)
            .unwrap_or(GraphValue::Null),
        BoltType::LocalDateTime(d) => NaiveDateTime::try_from(&d)
            .map(GraphValue::LocalDateTime)
            .unwrap_or(GraphValue::Null),
        other => GraphValue::String(format!("{other:?}")),
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Neo4j-backed graph store.
#[derive(Clone)]
pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    /// Connect using the given settings and password.
    pub async fn connect(settings: &StoreSettings, password: &str) -> Result<Self, KgError> {
        let mut builder = ConfigBuilder::default()
            .uri(settings.uri.as_str())
            .user(settings.username.as_str())
            .password(password)
            .max_connections(settings.max_connections);
        if let Some(db) = &settings.database {
            builder = builder.db(db.as_str());
        }
        let config = builder.build().map_err(classify)?;
        let graph = Graph::connect(config).await.map_err(classify)?;
        info!(uri = %settings.uri, "connected to neo4j");
        Ok(Self { graph })
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn begin(&self) -> Result<Box<dyn GraphTxn>, KgError> {
        let txn = self.graph.start_txn().await.map_err(classify)?;
        Ok(Box::new(Neo4jTxn { txn }))
    }

    async fn ensure_vector_index(
        &self,
        index: &VectorIndex,
        dimensions: usize,
    ) -> Result<(), KgError> {
        let statement = format!(
            "CREATE VECTOR INDEX {name} IF NOT EXISTS \
             FOR (n:{label}) ON (n.{EMBEDDING_PROPERTY}) \
             OPTIONS {{indexConfig: {{`vector.dimensions`: {dimensions}, \
             `vector.similarity_function`: 'cosine'}}}}",
            name = index.name,
            label = index.label,
        );
        self.graph.run(query(&statement)).await.map_err(classify)?;
        info!(index = %index.name, dimensions, "vector index ensured");
        Ok(())
    }

    async fn check_query(&self, statement: &str) -> Result<(), KgError> {
        // Auto-commit: a failure here leaves the turn's transaction intact.
        self.graph
            .run(query(&explain(statement)))
            .await
            .map_err(classify)
    }
}

/// `EXPLAIN` form of a statement, replacing any leading plan keyword.
fn explain(statement: &str) -> String {
    let trimmed = statement.trim_start();
    let first = trimmed
        .split(|c: char| c.is_whitespace())
        .next()
        .unwrap_or_default();
    let body = if first.eq_ignore_ascii_case("EXPLAIN") || first.eq_ignore_ascii_case("PROFILE") {
        &trimmed[first.len()..]
    } else {
        trimmed
    };
    format!("EXPLAIN {}", body.trim_start())
}

// =============================================================================
// TRANSACTION
// =============================================================================

struct Neo4jTxn {
    txn: Txn,
}

impl Neo4jTxn {
    async fn rows(&mut self, q: Query) -> Result<Vec<Row>, KgError> {
        let mut stream = self.txn.execute(q).await.map_err(classify)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(self.txn.handle()).await.map_err(classify)? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn stored(row: &Row) -> Result<StoredNode, KgError> {
        Ok(StoredNode {
            key: NodeKey::new(row.get::<String>("key").map_err(decode)?),
            name: row.get::<String>("name").map_err(decode)?,
            description: row
                .get::<Option<String>>("description")
                .map_err(decode)?
                .unwrap_or_default(),
        })
    }
}

#[async_trait]
impl GraphTxn for Neo4jTxn {
    async fn vector_search(&mut self, vq: &VectorQuery) -> Result<Vec<VectorHit>, KgError> {
        let projection = if vq.extra_properties.is_empty() {
            "{}".to_string()
        } else {
            let fields: Vec<String> = vq.extra_properties.iter().map(|k| format!(".{k}")).collect();
            format!("node {{{}}}", fields.join(", "))
        };
        let statement = format!(
            "CALL db.index.vector.queryNodes($index, $pool, $vector) YIELD node, score \
             WHERE $min_score IS NULL OR score >= $min_score \
             RETURN elementId(node) AS key, node.name AS name, \
             node.description AS description, {projection} AS extra, score \
             ORDER BY score DESC LIMIT $limit"
        );
        let q = query(&statement)
            .param("index", vq.index.name.as_str())
            .param("pool", vq.pool as i64)
            .param("vector", vq.vector.clone())
            .param("min_score", vq.min_score)
            .param("limit", vq.limit as i64);

        let mut hits = Vec::new();
        for row in self.rows(q).await? {
            let node = Self::stored(&row)?;
            let extra = row
                .get::<HashMap<String, BoltType>>("extra")
                .map_err(decode)?
                .into_iter()
                .filter(|(_, v)| !matches!(v, BoltType::Null(_)))
                .map(|(k, v)| (k, to_graph_value(v)))
                .collect();
            hits.push(VectorHit {
                key: node.key,
                name: node.name,
                description: node.description,
                extra,
                score: row.get::<f64>("score").map_err(decode)?,
            });
        }
        debug!(index = %vq.index.name, hits = hits.len(), "vector search");
        Ok(hits)
    }

    async fn node_by_key(&mut self, key: &NodeKey) -> Result<Option<StoredNode>, KgError> {
        let q = query(
            "MATCH (n) WHERE elementId(n) = $key \
             RETURN elementId(n) AS key, n.name AS name, n.description AS description",
        )
        .param("key", key.as_str());
        self.rows(q).await?.first().map(Self::stored).transpose()
    }

    async fn find_by_name(
        &mut self,
        category: &str,
        name: &str,
    ) -> Result<Option<StoredNode>, KgError> {
        let statement = format!(
            "MATCH (n:{category} {{name: $name}}) \
             RETURN elementId(n) AS key, n.name AS name, n.description AS description LIMIT 1"
        );
        let q = query(&statement).param("name", name);
        self.rows(q).await?.first().map(Self::stored).transpose()
    }

    async fn create_node(&mut self, node: &NewNode<'_>) -> Result<NodeKey, KgError> {
        let statement = format!(
            "CREATE (n:{} {{name: $name, description: $description}}) \
             SET n.{EMBEDDING_PROPERTY} = $embedding \
             RETURN elementId(n) AS key",
            node.category
        );
        let q = query(&statement)
            .param("name", node.name)
            .param("description", node.description)
            .param("embedding", node.embedding.map(<[f32]>::to_vec));
        let rows = self.rows(q).await?;
        let row = rows
            .first()
            .ok_or_else(|| StoreError::other("CREATE returned no row"))?;
        Ok(NodeKey::new(row.get::<String>("key").map_err(decode)?))
    }

    async fn update_node(
        &mut self,
        key: &NodeKey,
        name: &str,
        description: &str,
        embedding: &[f32],
    ) -> Result<(), KgError> {
        let statement = format!(
            "MATCH (n) WHERE elementId(n) = $key \
             SET n.name = $name, n.description = $description, n.{EMBEDDING_PROPERTY} = $embedding \
             RETURN elementId(n) AS key"
        );
        let q = query(&statement)
            .param("key", key.as_str())
            .param("name", name)
            .param("description", description)
            .param("embedding", embedding.to_vec());
        if self.rows(q).await?.is_empty() {
            return Err(StoreError::other(format!("node {key} does not exist")).into());
        }
        Ok(())
    }

    async fn merge_node(
        &mut self,
        category: &str,
        name: &str,
        description: &str,
    ) -> Result<(), KgError> {
        let statement =
            format!("MERGE (n:{category} {{name: $name}}) SET n.description = $description");
        let q = query(&statement)
            .param("name", name)
            .param("description", description);
        self.txn.run(q).await.map_err(classify)
    }

    async fn existing_names(&mut self, names: &[&str]) -> Result<BTreeSet<String>, KgError> {
        let q = query(
            "UNWIND $names AS wanted MATCH (n {name: wanted}) RETURN DISTINCT n.name AS name",
        )
        .param("names", names.iter().map(|n| n.to_string()).collect::<Vec<_>>());
        self.rows(q)
            .await?
            .iter()
            .map(|row| row.get::<String>("name").map_err(decode))
            .collect()
    }

    async fn merge_edge(&mut self, edge: &EdgeRecord) -> Result<(), KgError> {
        let statement = format!(
            "MATCH (source {{name: $source}}) MATCH (target {{name: $target}}) \
             MERGE (source)-[r:{}]->(target) SET r += $props",
            edge.relationship
        );
        let props: HashMap<String, BoltType> = edge
            .properties
            .iter()
            .map(|p| (p.key.clone(), scalar_to_bolt(&p.value)))
            .collect();
        let q = query(&statement)
            .param("source", edge.source_name.as_str())
            .param("target", edge.target_name.as_str())
            .param("props", props);
        self.txn.run(q).await.map_err(classify)
    }

    async fn read_query(&mut self, statement: &str) -> Result<Vec<Record>, KgError> {
        let rows = self.rows(query(statement)).await?;
        rows.iter()
            .map(|row| {
                let columns = row
                    .to_strict::<HashMap<String, BoltType>>()
                    .map_err(decode)?;
                Ok(columns
                    .into_iter()
                    .map(|(k, v)| (k, to_graph_value(v)))
                    .collect())
            })
            .collect()
    }

    async fn neighbors(&mut self, name: &str) -> Result<Vec<Adjacent>, KgError> {
        let q = query(
            "MATCH (n {name: $name})-[r]-(m) \
             RETURN type(r) AS relationship, startNode(r) = n AS outgoing, \
             m.name AS name, m.description AS description, labels(m) AS labels",
        )
        .param("name", name);
        let mut adjacent = Vec::new();
        for row in self.rows(q).await? {
            // Nodes without a name cannot be addressed by later calls.
            let Some(other) = row.get::<Option<String>>("name").map_err(decode)? else {
                continue;
            };
            adjacent.push(Adjacent {
                relationship: row.get::<String>("relationship").map_err(decode)?,
                outgoing: row.get::<bool>("outgoing").map_err(decode)?,
                name: other,
                description: row
                    .get::<Option<String>>("description")
                    .map_err(decode)?
                    .unwrap_or_default(),
                labels: row.get::<Vec<String>>("labels").map_err(decode)?,
            });
        }
        Ok(adjacent)
    }

    async fn commit(self: Box<Self>) -> Result<(), KgError> {
        self.txn.commit().await.map_err(classify)
    }

    async fn rollback(self: Box<Self>) -> Result<(), KgError> {
        self.txn.rollback().await.map_err(classify)
    }
}
