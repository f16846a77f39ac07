//! # Category Taxonomy
//!
//! Decides which upsert strategy and which vector index apply to a node
//! category. The taxonomy is fixed configuration loaded at startup.
//!
//! - **Semantic** categories are deduplicated by meaning.
//! - **Reference** categories are a fixed taxonomy and are never created.
//! - Every other category is **simple**: keyed by exact name.

use crate::primitives::{
    EMBEDDING_PROPERTY, MAX_IDENTIFIER_LENGTH, MAX_NAME_LENGTH, VECTOR_INDEX_SUFFIX,
};
use crate::KgError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Upsert strategy for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    Semantic,
    Simple,
    Reference,
}

/// A per-category vector index over description embeddings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorIndex {
    /// Index name, e.g. `idea_description_embeddings`.
    pub name: String,
    /// Node label the index covers.
    pub label: String,
}

impl VectorIndex {
    /// Derive the index for a category.
    #[must_use]
    pub fn for_category(category: &str) -> Self {
        Self {
            name: format!("{}{}", category.to_lowercase(), VECTOR_INDEX_SUFFIX),
            label: category.to_string(),
        }
    }
}

/// The category taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Taxonomy {
    /// Categories subject to semantic dedup.
    pub semantic: BTreeSet<String>,
    /// Reference-data categories; creation is refused.
    pub reference: BTreeSet<String>,
    /// Extra scalar properties returned by find_node, per category.
    pub extra_properties: BTreeMap<String, Vec<String>>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        let semantic = [
            "Convergence",
            "Capability",
            "Milestone",
            "Trend",
            "Idea",
            "Bet",
            "LTC",
            "LAC",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let mut extra_properties = BTreeMap::new();
        extra_properties.insert(
            "Milestone".to_string(),
            vec!["milestone_reached_date".to_string()],
        );

        Self {
            semantic,
            reference: BTreeSet::from(["EmTech".to_string()]),
            extra_properties,
        }
    }
}

impl Taxonomy {
    /// Classify a category. Reference wins over semantic if both list it.
    #[must_use]
    pub fn kind(&self, category: &str) -> CategoryKind {
        if self.reference.contains(category) {
            CategoryKind::Reference
        } else if self.semantic.contains(category) {
            CategoryKind::Semantic
        } else {
            CategoryKind::Simple
        }
    }

    /// Whether any of the given labels is a reference category.
    #[must_use]
    pub fn is_reference_labelled<S: AsRef<str>>(&self, labels: &[S]) -> bool {
        labels
            .iter()
            .any(|label| self.reference.contains(label.as_ref()))
    }

    /// Vector index for a semantic category.
    pub fn vector_index(&self, category: &str) -> Result<VectorIndex, KgError> {
        match self.kind(category) {
            CategoryKind::Semantic => Ok(VectorIndex::for_category(category)),
            _ => Err(KgError::Validation(format!(
                "category '{}' has no vector index; searchable categories are: {}",
                category,
                self.semantic.iter().cloned().collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// All vector indexes the engine depends on.
    #[must_use]
    pub fn vector_indexes(&self) -> Vec<VectorIndex> {
        self.semantic
            .iter()
            .filter(|c| !self.reference.contains(*c))
            .map(|c| VectorIndex::for_category(c))
            .collect()
    }

    /// Extra properties for a category (empty for most).
    #[must_use]
    pub fn extra_properties(&self, category: &str) -> &[String] {
        self.extra_properties
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Message returned instead of creating a reference-data node.
    #[must_use]
    pub fn rejection_message(&self, category: &str) -> String {
        format!(
            "Do not create new {category} type nodes. {category}s are reference data, use existing ones."
        )
    }

    /// Check that every configured name is usable as a label.
    pub fn validate(&self) -> Result<(), KgError> {
        for category in self.semantic.iter().chain(self.reference.iter()) {
            validate_identifier("category", category)?;
        }
        for (category, keys) in &self.extra_properties {
            validate_identifier("category", category)?;
            for key in keys {
                validate_identifier("property key", key)?;
                if key == EMBEDDING_PROPERTY {
                    return Err(KgError::Validation(format!(
                        "'{EMBEDDING_PROPERTY}' cannot be returned as an extra property of {category}"
                    )));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// INPUT VALIDATION
// =============================================================================

/// Validate a label, relationship type or property key.
///
/// These are spliced into statements (the store cannot take them as
/// parameters), so only `[A-Za-z_][A-Za-z0-9_]*` is accepted.
pub fn validate_identifier(what: &str, value: &str) -> Result<(), KgError> {
    let mut chars = value.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest {
        return Err(KgError::Validation(format!(
            "{what} '{value}' must match [A-Za-z_][A-Za-z0-9_]*"
        )));
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(KgError::Validation(format!(
            "{what} exceeds {MAX_IDENTIFIER_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Validate a node name.
pub fn validate_name(what: &str, value: &str) -> Result<(), KgError> {
    if value.trim().is_empty() {
        return Err(KgError::Validation(format!("{what} must not be empty")));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(KgError::Validation(format!(
            "{what} exceeds {MAX_NAME_LENGTH} bytes"
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_kinds() {
        let taxonomy = Taxonomy::default();
        assert_eq!(taxonomy.kind("Idea"), CategoryKind::Semantic);
        assert_eq!(taxonomy.kind("Milestone"), CategoryKind::Semantic);
        assert_eq!(taxonomy.kind("EmTech"), CategoryKind::Reference);
        assert_eq!(taxonomy.kind("Organization"), CategoryKind::Simple);
    }

    #[test]
    fn index_name_is_lowercased_category() {
        let index = VectorIndex::for_category("LTC");
        assert_eq!(index.name, "ltc_description_embeddings");
        assert_eq!(index.label, "LTC");
    }

    #[test]
    fn simple_category_has_no_index() {
        let taxonomy = Taxonomy::default();
        assert!(taxonomy.vector_index("Organization").is_err());
        assert!(taxonomy.vector_index("EmTech").is_err());
        assert_eq!(taxonomy.vector_indexes().len(), 8);
    }

    #[test]
    fn rejection_message_for_reference_data() {
        let taxonomy = Taxonomy::default();
        assert_eq!(
            taxonomy.rejection_message("EmTech"),
            "Do not create new EmTech type nodes. EmTechs are reference data, use existing ones."
        );
    }

    #[test]
    fn milestone_extras() {
        let taxonomy = Taxonomy::default();
        assert_eq!(
            taxonomy.extra_properties("Milestone"),
            ["milestone_reached_date".to_string()]
        );
        assert!(taxonomy.extra_properties("Idea").is_empty());
    }

    #[test]
    fn identifiers() {
        assert!(validate_identifier("type", "ENABLES").is_ok());
        assert!(validate_identifier("type", "_x1").is_ok());
        assert!(validate_identifier("type", "").is_err());
        assert!(validate_identifier("type", "1ABC").is_err());
        assert!(validate_identifier("type", "A]->(m) DETACH DELETE m //").is_err());
    }

    #[test]
    fn names() {
        assert!(validate_name("name", "The Singularity").is_ok());
        assert!(validate_name("name", "   ").is_err());
    }

    #[test]
    fn taxonomy_from_toml() {
        let taxonomy: Taxonomy = toml::from_str(
            r#"
            semantic = ["Idea"]
            reference = ["Sector"]
            "#,
        )
        .expect("parse");
        assert_eq!(taxonomy.kind("Idea"), CategoryKind::Semantic);
        assert_eq!(taxonomy.kind("Trend"), CategoryKind::Simple);
        assert_eq!(taxonomy.kind("Sector"), CategoryKind::Reference);
        assert!(taxonomy.validate().is_ok());
    }
}
