//! Domain registry: the static mapping from domain id to display name and
//! index artifact locations.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::RetrievalError;

/// One registered clinical domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainSpec {
    pub id: String,
    pub name: String,
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl DomainSpec {
    /// Domain with artifacts at `<dir>/<id>_index.bin` and `<dir>/<id>_metadata.json`.
    pub fn in_dir(id: &str, name: &str, dir: &Path) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            index_path: dir.join(format!("{id}_index.bin")),
            metadata_path: dir.join(format!("{id}_metadata.json")),
        }
    }
}

/// Ordered, immutable set of domains.
///
/// Iteration order is registration order; retrieval visits domains in this
/// order, which fixes the tie-break between equal scores.
#[derive(Debug, Clone, Default)]
pub struct DomainRegistry {
    domains: Vec<DomainSpec>,
}

impl DomainRegistry {
    pub fn new(domains: Vec<DomainSpec>) -> Result<Self, RetrievalError> {
        for (i, d) in domains.iter().enumerate() {
            if d.id.trim().is_empty() {
                return Err(RetrievalError::InvalidInput(
                    "domain id must not be empty".to_string(),
                ));
            }
            if domains[..i].iter().any(|other| other.id == d.id) {
                return Err(RetrievalError::InvalidInput(format!(
                    "duplicate domain id '{}'",
                    d.id
                )));
            }
        }
        Ok(Self { domains })
    }

    /// The four clinical domains, with artifacts under `index_dir`.
    pub fn clinical_defaults(index_dir: &Path) -> Self {
        let domains = [
            ("covid", "COVID Clinical Research"),
            ("diabetes", "Diabetes"),
            ("heart_attack", "Heart Attack"),
            ("knee_injuries", "Knee Injuries"),
        ]
        .iter()
        .map(|(id, name)| DomainSpec::in_dir(id, name, index_dir))
        .collect();
        Self { domains }
    }

    pub fn get(&self, id: &str) -> Option<&DomainSpec> {
        self.domains.iter().find(|d| d.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainSpec> {
        self.domains.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.domains.iter().map(|d| d.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
