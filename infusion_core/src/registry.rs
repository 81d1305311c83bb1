//! The active drug table and its lookup indices.
//!
//! The built-in table ships with the crate and is what the calculator runs on
//! until a remote document has been validated and swapped in.

use crate::document::DrugDocument;
use crate::types::*;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;

static BUILTIN_DOCUMENT: &str = include_str!("../data/builtin_drugs.json");

/// Cached default registry - built once and cloned into each run
static DEFAULT_REGISTRY: Lazy<ConfigRegistry> = Lazy::new(build_default_registry_internal);

/// Get a reference to the cached built-in registry
pub fn get_default_registry() -> &'static ConfigRegistry {
    &DEFAULT_REGISTRY
}

/// Builds the built-in registry from the bundled drug document
///
/// **Note**: Prefer `get_default_registry()` which returns a cached reference.
pub fn build_default_registry() -> ConfigRegistry {
    build_default_registry_internal()
}

fn build_default_registry_internal() -> ConfigRegistry {
    let drugs = DrugDocument::parse(BUILTIN_DOCUMENT)
        .and_then(DrugDocument::into_records)
        .expect("bundled drug table must validate");
    ConfigRegistry::from_drugs(drugs, RegistryOrigin::Builtin, None)
}

impl ConfigRegistry {
    /// Build a registry and its indices from an ordered drug list
    pub fn from_drugs(
        drugs: Vec<DrugRecord>,
        origin: RegistryOrigin,
        data_version: Option<DateTime<Utc>>,
    ) -> Self {
        let mut by_id = HashMap::with_capacity(drugs.len());
        let mut by_synonym = HashMap::new();

        for (ix, drug) in drugs.iter().enumerate() {
            by_id.insert(drug.id.clone(), ix);
            by_synonym
                .entry(drug.id.to_lowercase())
                .or_insert_with(|| drug.id.clone());
        }

        // Synonyms never shadow a real id; the first drug to claim one keeps it.
        for drug in &drugs {
            for synonym in &drug.synonyms {
                let key = synonym.to_lowercase();
                match by_synonym.get(&key) {
                    Some(existing) if existing != &drug.id => {
                        tracing::warn!(
                            "Synonym '{}' of '{}' already resolves to '{}', ignoring",
                            key,
                            drug.id,
                            existing
                        );
                    }
                    Some(_) => {}
                    None => {
                        by_synonym.insert(key, drug.id.clone());
                    }
                }
            }
        }

        tracing::debug!(
            "Built registry with {} drugs and {} lookup keys",
            drugs.len(),
            by_synonym.len()
        );

        Self {
            drugs,
            by_id,
            by_synonym,
            origin,
            data_version,
        }
    }

    /// Swap in a new drug table wholesale, rebuilding the indices
    pub fn replace(&mut self, drugs: Vec<DrugRecord>, data_version: DateTime<Utc>) {
        *self = Self::from_drugs(drugs, RegistryOrigin::Remote, Some(data_version));
        tracing::info!(
            "Registry replaced: {} drugs, data version {}",
            self.drugs.len(),
            data_version.to_rfc3339()
        );
    }

    /// Drugs in display order
    pub fn drugs(&self) -> &[DrugRecord] {
        &self.drugs
    }

    pub fn first(&self) -> Option<&DrugRecord> {
        self.drugs.first()
    }

    /// Exact lookup by canonical id
    pub fn get(&self, id: &str) -> Option<&DrugRecord> {
        self.by_id.get(id).map(|&ix| &self.drugs[ix])
    }

    /// Map a slug (id or synonym, any case) to its canonical id
    pub fn canonical_id(&self, slug: &str) -> Option<&str> {
        let key = slug.trim().to_lowercase();
        self.by_synonym.get(&key).map(String::as_str)
    }

    /// Resolve a slug to a drug record
    pub fn resolve(&self, slug: &str) -> Option<&DrugRecord> {
        self.canonical_id(slug).and_then(|id| self.get(id))
    }

    /// Resolve a drug id, falling back to the first drug in display order
    pub fn resolve_or_first(&self, slug: Option<&str>) -> Option<&DrugRecord> {
        slug.and_then(|s| self.resolve(s)).or_else(|| self.first())
    }

    pub fn origin(&self) -> RegistryOrigin {
        self.origin
    }

    pub fn data_version(&self) -> Option<DateTime<Utc>> {
        self.data_version
    }

    pub fn len(&self) -> usize {
        self.drugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drugs.is_empty()
    }
}
