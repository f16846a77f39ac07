//! # Bounded Traversal
//!
//! Depth-first exploration outward from a named node.
//!
//! The search is iterative with an explicit stack and a best-depth table, so
//! cycles terminate and a node reached again by a shorter path is expanded
//! from there. Reference-data nodes are never returned or expanded; edges
//! touching them are omitted.

use crate::context::GraphOpsContext;
use crate::primitives::{
    DEFAULT_MAX_EDGES, DEFAULT_MAX_NODES, DEFAULT_TRAVERSAL_DEPTH, MAX_TRAVERSAL_DEPTH,
};
use crate::taxonomy::{CategoryKind, validate_identifier, validate_name};
use crate::{KgError, Subgraph, TraversalEdge, TraversalNode};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Bounds of one traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalLimits {
    /// Maximum hops from the start node. Must be positive; clamped to
    /// `MAX_TRAVERSAL_DEPTH`.
    pub max_depth: i64,
    pub max_nodes: usize,
    pub max_edges: usize,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_TRAVERSAL_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
            max_edges: DEFAULT_MAX_EDGES,
        }
    }
}

impl TraversalLimits {
    /// Limits with the given depth and default caps.
    #[must_use]
    pub fn depth(max_depth: i64) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }
}

/// Accumulates the induced subgraph in discovery order.
#[derive(Default)]
struct Collected {
    nodes: Vec<TraversalNode>,
    names: BTreeSet<String>,
    edges: Vec<TraversalEdge>,
    edge_keys: BTreeSet<(String, String, String)>,
}

impl Collected {
    fn add_node(&mut self, name: &str, description: &str) {
        if self.names.insert(name.to_string()) {
            self.nodes.push(TraversalNode {
                name: name.to_string(),
                description: description.to_string(),
            });
        }
    }

    fn add_edge(&mut self, source: &str, relationship: &str, target: &str) {
        let key = (
            source.to_string(),
            relationship.to_string(),
            target.to_string(),
        );
        if self.edge_keys.insert(key) {
            self.edges.push(TraversalEdge {
                source_node_name: source.to_string(),
                relationship: relationship.to_string(),
                end_node_name: target.to_string(),
            });
        }
    }

    fn into_subgraph(self) -> Subgraph {
        Subgraph {
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

impl GraphOpsContext {
    /// Explore up to `limits.max_depth` hops from `(start_category, start_name)`.
    ///
    /// An unknown start node yields an empty subgraph.
    pub async fn dfs(
        &self,
        start_name: &str,
        start_category: &str,
        limits: TraversalLimits,
    ) -> Result<Subgraph, KgError> {
        validate_name("start_name", start_name)?;
        validate_identifier("start_category", start_category)?;
        if limits.max_depth < 1 {
            return Err(KgError::Validation(format!(
                "max_depth must be positive, got {}",
                limits.max_depth
            )));
        }
        let taxonomy = self.engine().taxonomy();
        if taxonomy.kind(start_category) == CategoryKind::Reference {
            return Ok(Subgraph::default());
        }
        let max_depth = usize::try_from(limits.max_depth)
            .unwrap_or(MAX_TRAVERSAL_DEPTH)
            .min(MAX_TRAVERSAL_DEPTH);

        let mut turn = self.lock().await;
        let start_name = turn.resolve(start_name);
        let txn = turn.txn()?;
        let Some(start) = txn.find_by_name(start_category, &start_name).await? else {
            debug!(start = %start_name, "start node not found");
            return Ok(Subgraph::default());
        };

        let mut out = Collected::default();
        if limits.max_nodes == 0 {
            return Ok(out.into_subgraph());
        }
        out.add_node(&start.name, &start.description);

        let mut best_depth: BTreeMap<String, usize> = BTreeMap::new();
        best_depth.insert(start.name.clone(), 0);
        let mut stack = vec![(start.name, 0usize)];

        while let Some((name, depth)) = stack.pop() {
            if depth >= max_depth || best_depth.get(&name).is_some_and(|d| *d < depth) {
                continue;
            }
            let next_depth = depth + 1;
            let mut next = Vec::new();

            for adj in txn.neighbors(&name).await? {
                if taxonomy.is_reference_labelled(&adj.labels) {
                    continue;
                }
                if !out.names.contains(&adj.name) {
                    if out.nodes.len() >= limits.max_nodes {
                        continue;
                    }
                    out.add_node(&adj.name, &adj.description);
                }
                if out.edges.len() < limits.max_edges {
                    if adj.outgoing {
                        out.add_edge(&name, &adj.relationship, &adj.name);
                    } else {
                        out.add_edge(&adj.name, &adj.relationship, &name);
                    }
                }
                if best_depth.get(&adj.name).is_none_or(|d| next_depth < *d) {
                    best_depth.insert(adj.name.clone(), next_depth);
                    next.push((adj.name, next_depth));
                }
            }
            // Reverse so the first neighbour is explored first.
            stack.extend(next.into_iter().rev());
        }

        debug!(
            start = %start_name,
            nodes = out.nodes.len(),
            edges = out.edges.len(),
            "traversal finished"
        );
        Ok(out.into_subgraph())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_are_deduplicated() {
        let mut out = Collected::default();
        out.add_node("A", "a");
        out.add_node("A", "again");
        out.add_edge("A", "ENABLES", "B");
        out.add_edge("A", "ENABLES", "B");
        out.add_edge("B", "ENABLES", "A");
        let graph = out.into_subgraph();
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].description, "a");
        assert_eq!(graph.edges.len(), 2);
    }

    #[test]
    fn default_limits() {
        let limits = TraversalLimits::default();
        assert_eq!(limits.max_depth, 3);
        assert_eq!(limits.max_nodes, 200);
        assert_eq!(limits.max_edges, 400);
        assert_eq!(TraversalLimits::depth(5).max_nodes, 200);
    }
}
