//! # Edge Resolver & Writer
//!
//! Creates typed relationships between nodes whose names may have changed
//! during dedup earlier in the turn.
//!
//! Both endpoints are resolved through the turn's name map, then checked for
//! existence before the write. A missing endpoint is reported with the
//! original and resolved name so the caller can correct itself; nothing is
//! written in that case.

use crate::context::GraphOpsContext;
use crate::primitives::MAX_EDGE_PROPERTIES;
use crate::taxonomy::{validate_identifier, validate_name};
use crate::{EdgeRecord, EndpointSide, KgError, MissingEndpoint, Property};
use tracing::info;

/// Collapse duplicate keys, keeping the last value at the first position.
fn dedup_properties(properties: &[Property]) -> Vec<Property> {
    let mut out: Vec<Property> = Vec::with_capacity(properties.len());
    for prop in properties {
        match out.iter_mut().find(|p| p.key == prop.key) {
            Some(slot) => slot.value = prop.value.clone(),
            None => out.push(prop.clone()),
        }
    }
    out
}

impl GraphOpsContext {
    /// Create or merge `source -[relationship_type]-> target`.
    pub async fn create_edge(
        &self,
        source_name: &str,
        target_name: &str,
        relationship_type: &str,
        properties: &[Property],
    ) -> Result<EdgeRecord, KgError> {
        validate_name("source_name", source_name)?;
        validate_name("target_name", target_name)?;
        validate_identifier("relationship type", relationship_type)?;
        if properties.len() > MAX_EDGE_PROPERTIES {
            return Err(KgError::Validation(format!(
                "at most {MAX_EDGE_PROPERTIES} edge properties are allowed"
            )));
        }
        for prop in properties {
            validate_identifier("property key", &prop.key)?;
        }

        let mut turn = self.lock().await;
        let source = turn.resolve(source_name);
        let target = turn.resolve(target_name);

        let existing = turn
            .txn()?
            .existing_names(&[source.as_str(), target.as_str()])
            .await?;

        let missing: Vec<MissingEndpoint> = [
            (EndpointSide::Source, source_name, &source),
            (EndpointSide::Target, target_name, &target),
        ]
        .into_iter()
        .filter(|(_, _, resolved)| !existing.contains(resolved.as_str()))
        .map(|(side, original, resolved)| MissingEndpoint {
            side,
            original: original.to_string(),
            resolved: resolved.clone(),
        })
        .collect();
        if !missing.is_empty() {
            return Err(KgError::EndpointNotFound { missing });
        }

        let record = EdgeRecord {
            source_name: source,
            relationship: relationship_type.to_string(),
            target_name: target,
            properties: dedup_properties(properties),
        };
        turn.txn()?.merge_edge(&record).await?;
        info!(
            source = %record.source_name,
            relationship = %record.relationship,
            target = %record.target_name,
            "edge merged"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Scalar;

    #[test]
    fn duplicate_keys_keep_last_value() {
        let props = vec![
            Property::new("since", 2020i64),
            Property::new("source", "report"),
            Property::new("since", 2024i64),
        ];
        let deduped = dedup_properties(&props);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].key, "since");
        assert_eq!(deduped[0].value, Scalar::Int(2024));
        assert_eq!(deduped[1].key, "source");
    }
}
