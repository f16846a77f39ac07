//! # CLI Command Implementations

use super::{Cli, StoreKind};
use kgraph_core::config::{COMPARATOR_KEY_ENV, EMBEDDING_KEY_ENV, NEO4J_PASSWORD_ENV, secret};
use kgraph_core::store::ensure_indexes;
use kgraph_core::{
    ChatComparator, Config, Engine, GraphStore, KgError, MemoryGraphStore, Neo4jGraphStore,
    OpenAiEmbedder, ToolCall,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Maximum size of a tool call file (10 MB).
const MAX_TURN_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of tool calls in one turn file.
const MAX_TURN_CALLS: usize = 1_000;

// =============================================================================
// RUN CONTEXT
// =============================================================================

/// Settings shared by every command.
pub struct RunContext {
    pub config: Config,
    pub store: StoreKind,
    pub snapshot: Option<PathBuf>,
    pub json_mode: bool,
}

impl RunContext {
    pub fn load(cli: &Cli) -> Result<Self, KgError> {
        let config = Config::load(cli.config.as_deref())?;
        if cli.snapshot.is_some() && cli.store != StoreKind::Memory {
            return Err(KgError::Config(
                "--snapshot is only valid with --store memory".to_string(),
            ));
        }
        Ok(Self {
            config,
            store: cli.store,
            snapshot: cli.snapshot.clone(),
            json_mode: cli.json_mode,
        })
    }

    /// Open the configured graph store.
    pub async fn open_store(&self) -> Result<Arc<dyn GraphStore>, KgError> {
        match self.store {
            StoreKind::Neo4j => {
                let password = secret(NEO4J_PASSWORD_ENV)?;
                tracing::info!(uri = %self.config.store.uri, "connecting to Neo4j");
                Ok(Arc::new(
                    Neo4jGraphStore::connect(&self.config.store, &password).await?,
                ))
            }
            StoreKind::Memory => match &self.snapshot {
                Some(path) => Ok(Arc::new(MemoryGraphStore::open(path)?)),
                None => {
                    tracing::warn!("memory store without --snapshot; writes are discarded on exit");
                    Ok(Arc::new(MemoryGraphStore::new()))
                }
            },
        }
    }

    /// Wire the engine: store, model clients, taxonomy and retry policy.
    pub async fn engine(&self) -> Result<Engine, KgError> {
        let store = self.open_store().await?;
        let embedder = OpenAiEmbedder::new(&self.config.embedding, secret(EMBEDDING_KEY_ENV)?)?;
        let comparator =
            ChatComparator::new(&self.config.comparator, secret(COMPARATOR_KEY_ENV)?)?;
        Ok(
            Engine::new(store, Arc::new(embedder), Arc::new(comparator))
                .with_taxonomy(self.config.taxonomy.clone())
                .with_retry(self.config.retry),
        )
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_results(ctx: &RunContext, calls: &[&'static str], results: &[Value]) {
    if ctx.json_mode {
        let output = Value::Array(results.to_vec());
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return;
    }
    for (name, result) in calls.iter().zip(results) {
        let rendered = match result {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_default(),
        };
        println!("{name}: {rendered}");
    }
}

// =============================================================================
// TURN COMMANDS
// =============================================================================

fn read_turn_file(path: &Path) -> Result<Vec<ToolCall>, KgError> {
    let canonical = path.canonicalize().map_err(|e| {
        KgError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;
    let metadata = std::fs::metadata(&canonical)
        .map_err(|e| KgError::Io(format!("Cannot read file metadata: {}", e)))?;
    if !metadata.is_file() {
        return Err(KgError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    if metadata.len() > MAX_TURN_FILE_SIZE {
        return Err(KgError::Io(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_TURN_FILE_SIZE
        )));
    }

    let raw = std::fs::read(&canonical)
        .map_err(|e| KgError::Io(format!("Read file: {}", e)))?;
    let calls: Vec<ToolCall> =
        serde_json::from_slice(&raw).map_err(|e| KgError::Serialization(e.to_string()))?;
    if calls.len() > MAX_TURN_CALLS {
        return Err(KgError::Validation(format!(
            "Tool call count {} exceeds maximum allowed {}",
            calls.len(),
            MAX_TURN_CALLS
        )));
    }
    Ok(calls)
}

/// Run every call in a file as one turn.
pub async fn cmd_turn(ctx: &RunContext, file: &Path) -> Result<(), KgError> {
    let calls = read_turn_file(file)?;
    tracing::info!("Running {} tool calls from {:?}", calls.len(), file);
    run_calls(ctx, calls).await
}

/// Run a single call as its own turn.
pub async fn cmd_single(ctx: &RunContext, call: ToolCall) -> Result<(), KgError> {
    run_calls(ctx, vec![call]).await
}

async fn run_calls(ctx: &RunContext, calls: Vec<ToolCall>) -> Result<(), KgError> {
    let engine = ctx.engine().await?;
    let names: Vec<&'static str> = calls.iter().map(ToolCall::name).collect();
    let results = engine.run_turn(calls).await?;
    print_results(ctx, &names, &results);
    Ok(())
}

// =============================================================================
// SCHEMA COMMANDS
// =============================================================================

/// Create the vector index of every semantic category.
pub async fn cmd_init_indexes(ctx: &RunContext) -> Result<(), KgError> {
    let store = ctx.open_store().await?;
    let dimensions = ctx.config.embedding.dimensions;
    let indexes = ensure_indexes(
        store.as_ref(),
        &ctx.config.taxonomy,
        dimensions,
        ctx.config.retry,
    )
    .await?;

    if ctx.json_mode {
        let output = serde_json::json!({
            "dimensions": dimensions,
            "similarity": "cosine",
            "indexes": indexes
                .iter()
                .map(|i| serde_json::json!({"name": i.name, "label": i.label}))
                .collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Vector Indexes ({} dimensions, cosine)", dimensions);
    println!("===============");
    for index in &indexes {
        println!("  {:<40} on :{}", index.name, index.label);
    }
    Ok(())
}

/// Print the loaded taxonomy.
pub fn cmd_taxonomy(ctx: &RunContext) -> Result<(), KgError> {
    let taxonomy = &ctx.config.taxonomy;

    if ctx.json_mode {
        let output =
            serde_json::to_value(taxonomy).map_err(|e| KgError::Serialization(e.to_string()))?;
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    let join = |items: Vec<&str>| items.join(", ");
    println!("Category Taxonomy");
    println!("=================");
    println!(
        "Semantic:  {}",
        join(taxonomy.semantic.iter().map(String::as_str).collect())
    );
    println!(
        "Reference: {}",
        join(taxonomy.reference.iter().map(String::as_str).collect())
    );
    for (category, keys) in &taxonomy.extra_properties {
        println!("Extras:    {} -> {}", category, keys.join(", "));
    }
    println!("Every other category is upserted by exact name.");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn turn_file_is_parsed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("calls.json");
        std::fs::write(
            &path,
            r#"[{"tool": "create_node", "category": "Person", "name": "Ada", "description": "p"}]"#,
        )
        .unwrap();

        let calls = read_turn_file(&path).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name(), "create_node");
    }

    #[test]
    fn turn_file_must_be_a_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(read_turn_file(dir.path()), Err(KgError::Io(_))));
        assert!(read_turn_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn malformed_calls_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("calls.json");
        std::fs::write(&path, r#"[{"tool": "drop_everything"}]"#).unwrap();
        assert!(matches!(
            read_turn_file(&path),
            Err(KgError::Serialization(_))
        ));
    }
}
