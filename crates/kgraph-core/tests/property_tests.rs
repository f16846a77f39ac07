//! # Property-Based Tests
//!
//! Traversal bounds and name-map consistency over random graphs.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{ScriptedComparator, StaticEmbedder, harness, seed};
use kgraph_core::TraversalLimits;
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn idea(i: usize) -> String {
    format!("N{i}")
}

/// Hop distance from `N0` over undirected edges, never passing through the
/// reference node `R`.
fn distances(node_count: usize, edges: &[(usize, usize)]) -> BTreeMap<String, usize> {
    let mut adjacency: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for (a, b) in edges {
        if *a < node_count && *b < node_count {
            adjacency.entry(*a).or_default().insert(*b);
            adjacency.entry(*b).or_default().insert(*a);
        }
    }
    let mut dist = BTreeMap::new();
    dist.insert(0usize, 0usize);
    let mut queue = VecDeque::from([0usize]);
    while let Some(node) = queue.pop_front() {
        let d = dist[&node];
        for next in adjacency.get(&node).into_iter().flatten() {
            if !dist.contains_key(next) {
                dist.insert(*next, d + 1);
                queue.push_back(*next);
            }
        }
    }
    dist.into_iter().map(|(i, d)| (idea(i), d)).collect()
}

proptest! {
    /// Traversal returns exactly the nodes within `depth` hops, never the
    /// reference node, and only edges between returned nodes.
    #[test]
    fn traversal_stays_within_bound(
        node_count in 2usize..10,
        raw_edges in vec((0usize..10, 0usize..10), 0..30),
        reference_links in vec(0usize..10, 0..4),
        depth in 1i64..6,
    ) {
        let edges: Vec<(usize, usize)> = raw_edges
            .into_iter()
            .filter(|(a, b)| *a < node_count && *b < node_count)
            .collect();
        let expected: BTreeSet<String> = distances(node_count, &edges)
            .into_iter()
            .filter(|(_, d)| *d as i64 <= depth)
            .map(|(name, _)| name)
            .collect();

        let subgraph = runtime().block_on(async {
            let h = harness(StaticEmbedder::new(), ScriptedComparator::new());
            for i in 0..node_count {
                seed(&h.store, "Idea", &idea(i), None).await;
            }
            seed(&h.store, "EmTech", "R", None).await;
            for (a, b) in &edges {
                h.store.seed_edge(&idea(*a), "LINKS", &idea(*b)).await.unwrap();
            }
            for i in &reference_links {
                if *i < node_count {
                    h.store.seed_edge(&idea(*i), "USES", "R").await.unwrap();
                    h.store.seed_edge("R", "ENABLES", &idea((*i + 1) % node_count)).await.unwrap();
                }
            }
            let ctx = h.engine.begin_turn().await.unwrap();
            ctx.dfs("N0", "Idea", TraversalLimits::depth(depth)).await.unwrap()
        });

        let returned: BTreeSet<String> = subgraph.nodes.iter().map(|n| n.name.clone()).collect();
        prop_assert_eq!(returned.len(), subgraph.nodes.len());
        prop_assert_eq!(&returned, &expected);
        prop_assert!(!returned.contains("R"));
        for edge in &subgraph.edges {
            prop_assert!(returned.contains(&edge.source_node_name));
            prop_assert!(returned.contains(&edge.end_node_name));
        }
        let unique: BTreeSet<_> = subgraph
            .edges
            .iter()
            .map(|e| (&e.source_node_name, &e.relationship, &e.end_node_name))
            .collect();
        prop_assert_eq!(unique.len(), subgraph.edges.len());
    }

    /// After simple upserts, every name resolves to itself and exists once.
    #[test]
    fn simple_names_resolve_to_stored_nodes(
        names in vec("[A-Z][a-z]{0,6}", 1..12),
    ) {
        let (resolved, stored) = runtime().block_on(async {
            let h = harness(StaticEmbedder::new(), ScriptedComparator::new());
            let ctx = h.engine.begin_turn().await.unwrap();
            for name in &names {
                ctx.create_node("Organization", name, "d").await.unwrap();
            }
            let mut resolved = Vec::new();
            for name in &names {
                resolved.push((name.clone(), ctx.resolve(name).await));
            }
            ctx.commit().await.unwrap();
            (resolved, h.store.nodes_with_label("Organization").await)
        });

        let distinct: BTreeSet<&String> = names.iter().collect();
        prop_assert_eq!(stored.len(), distinct.len());
        for (original, canonical) in resolved {
            prop_assert_eq!(&original, &canonical);
            prop_assert!(stored.iter().any(|(name, _)| *name == canonical));
        }
    }
}
