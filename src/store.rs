//! On-disk domain index artifacts.
//!
//! Each domain has two files, addressed by its [`DomainSpec`]:
//!
//! - the index artifact: `CRIX` magic, format version, dims and row count,
//!   followed by the rows as little-endian `f32`;
//! - the metadata artifact: a JSON array of passages, index-aligned.
//!
//! Both are written atomically (temp file then rename). A missing artifact
//! means "not built" and loads as `None`; a present but unreadable one is
//! corruption and an error.
//!
//! `manifest.json` in the index directory records how each domain was built.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clinical_rag_core::embedding::{bytes_to_vec, vec_to_bytes};
use clinical_rag_core::index::VectorIndex;
use clinical_rag_core::{DomainIndex, DomainRegistry, DomainSpec, FlatIndex, Passage};

const MAGIC: &[u8; 4] = b"CRIX";
const FORMAT_VERSION: u32 = 1;
/// magic + version + dims + count
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// File name of the build manifest inside the index directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Serialize a flat index to the artifact format.
pub fn encode_index(index: &FlatIndex) -> Vec<u8> {
    let rows = index.as_slice();
    let mut out = Vec::with_capacity(HEADER_LEN + rows.len() * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(index.dims() as u32).to_le_bytes());
    out.extend_from_slice(&(index.len() as u64).to_le_bytes());
    out.extend_from_slice(&vec_to_bytes(rows));
    out
}

/// Parse an index artifact produced by [`encode_index`].
///
/// # Errors
///
/// Fails on a short header, a wrong magic or version, or a body whose size
/// does not match `count * dims` rows.
pub fn decode_index(bytes: &[u8]) -> Result<FlatIndex> {
    if bytes.len() < HEADER_LEN {
        bail!("index artifact truncated: {} bytes", bytes.len());
    }
    if &bytes[0..4] != MAGIC {
        bail!("not an index artifact (bad magic)");
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        bail!("unsupported index format version {}", version);
    }
    let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let body = &bytes[HEADER_LEN..];
    let expected = count
        .checked_mul(dims)
        .and_then(|n| n.checked_mul(4))
        .context("index artifact header overflows")?;
    if body.len() != expected {
        bail!(
            "index artifact holds {} bytes of rows, header implies {}",
            body.len(),
            expected
        );
    }
    Ok(FlatIndex::from_rows(dims, bytes_to_vec(body))?)
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist one domain's index and metadata.
///
/// Both artifacts are written with [`write_atomic`] to the paths in `spec`;
/// parent directories are created as needed.
///
/// # Returns
///
/// The SHA-256 of the metadata artifact, recorded in the manifest.
pub fn save_domain(spec: &DomainSpec, index: &DomainIndex) -> Result<String> {
    let metadata = serde_json::to_vec(index.passages())?;
    write_atomic(&spec.index_path, &encode_index(index.index()))
        .with_context(|| format!("domain '{}': saving index", spec.id))?;
    write_atomic(&spec.metadata_path, &metadata)
        .with_context(|| format!("domain '{}': saving metadata", spec.id))?;
    Ok(sha256_hex(&metadata))
}

/// Load one domain. `Ok(None)` when either artifact does not exist.
///
/// # Errors
///
/// A present but unreadable artifact, a decode failure, or a vector count
/// that differs from the passage count. The error context names the domain.
pub fn load_domain(spec: &DomainSpec) -> Result<Option<DomainIndex>> {
    if !spec.index_path.exists() || !spec.metadata_path.exists() {
        return Ok(None);
    }

    let bytes = std::fs::read(&spec.index_path)
        .with_context(|| format!("domain '{}': reading {}", spec.id, spec.index_path.display()))?;
    let index = decode_index(&bytes)
        .with_context(|| format!("domain '{}': decoding {}", spec.id, spec.index_path.display()))?;

    let metadata = std::fs::read(&spec.metadata_path).with_context(|| {
        format!("domain '{}': reading {}", spec.id, spec.metadata_path.display())
    })?;
    let passages: Vec<Passage> = serde_json::from_slice(&metadata).with_context(|| {
        format!("domain '{}': parsing {}", spec.id, spec.metadata_path.display())
    })?;

    let domain_index = DomainIndex::new(index, passages)
        .with_context(|| format!("domain '{}': index and metadata disagree", spec.id))?;
    Ok(Some(domain_index))
}

/// Delete a domain's index and metadata artifacts.
///
/// # Returns
///
/// `true` if at least one artifact existed and was removed. Absent files are
/// not an error.
pub fn remove_domain(spec: &DomainSpec) -> Result<bool> {
    let mut removed = false;
    for path in [&spec.index_path, &spec.metadata_path] {
        if path.exists() {
            std::fs::remove_file(path).with_context(|| {
                format!("domain '{}': removing {}", spec.id, path.display())
            })?;
            removed = true;
        }
    }
    Ok(removed)
}

/// Outcome of loading every registered domain.
#[derive(Default)]
pub struct LoadReport {
    pub loaded: Vec<(String, DomainIndex)>,
    /// Domains with no artifacts on disk.
    pub missing: Vec<String>,
    /// Domain id and error chain for artifacts that failed to load.
    pub failed: Vec<(String, String)>,
}

/// Load every registered domain. Missing and corrupt domains are reported,
/// logged, and left out.
pub fn load_all(registry: &DomainRegistry) -> LoadReport {
    let mut report = LoadReport::default();
    for spec in registry.iter() {
        match load_domain(spec) {
            Ok(Some(index)) => {
                tracing::info!(
                    domain = %spec.id,
                    vectors = index.vector_count(),
                    "loaded domain index"
                );
                report.loaded.push((spec.id.clone(), index));
            }
            Ok(None) => {
                tracing::warn!(
                    domain = %spec.id,
                    index = %spec.index_path.display(),
                    "index artifacts not found; domain unavailable"
                );
                report.missing.push(spec.id.clone());
            }
            Err(e) => {
                tracing::error!(domain = %spec.id, error = %format!("{e:#}"), "corrupt domain index");
                report.failed.push((spec.id.clone(), format!("{e:#}")));
            }
        }
    }
    report
}

/// Build record for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub model: String,
    pub dims: usize,
    pub vector_count: usize,
    pub metadata_sha256: String,
    pub built_at: DateTime<Utc>,
}

/// Contents of `manifest.json`, keyed by domain id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    #[serde(default)]
    pub domains: BTreeMap<String, ManifestEntry>,
}

/// Read the manifest in `dir`; an absent file is an empty manifest.
pub fn read_manifest(dir: &Path) -> Result<IndexManifest> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(IndexManifest::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn write_manifest(dir: &Path, manifest: &IndexManifest) -> Result<()> {
    let json = serde_json::to_vec_pretty(manifest)?;
    write_atomic(&dir.join(MANIFEST_FILE), &json)
}
