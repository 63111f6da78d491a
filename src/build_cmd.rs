//! `clinrag build`: embed pre-extracted passages and write domain indexes.
//!
//! Input layout: `<input>/<domain-id>/**/*.json`, each file a JSON array of
//! passages (`text` and `source` required). Extraction from PDFs or tables
//! happens upstream; this command only embeds and indexes.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use std::time::Instant;
use walkdir::WalkDir;

use clinical_rag_core::embedding::Embedder;
use clinical_rag_core::{DomainIndex, DomainRegistry, Passage};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::store::{
    read_manifest, remove_domain, save_domain, sha256_hex, write_manifest, ManifestEntry,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltDomain {
    pub id: String,
    pub vectors: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub built: Vec<BuiltDomain>,
    /// Domains with no usable passages in the input.
    pub skipped: Vec<String>,
    /// Skipped domains whose artifacts from an earlier build were deleted.
    pub removed: Vec<String>,
}

/// Stable content-derived id: first 16 hex chars of SHA-256(source + text).
pub fn chunk_id_for(source: &str, text: &str) -> String {
    let mut bytes = Vec::with_capacity(source.len() + text.len());
    bytes.extend_from_slice(source.as_bytes());
    bytes.extend_from_slice(text.as_bytes());
    sha256_hex(&bytes)[..16].to_string()
}

/// Read every passage file for `domain` under `input`, in path order.
///
/// Empty-text passages are dropped; `domain` and missing `chunk_id`s are
/// filled in.
pub fn collect_passages(input: &Path, domain: &str) -> Result<Vec<Passage>> {
    let root = input.join(domain);
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut passages = Vec::new();
    let mut dropped = 0usize;
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let batch: Vec<Passage> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse passages in {}", path.display()))?;

        for mut p in batch {
            if p.text.trim().is_empty() {
                dropped += 1;
                continue;
            }
            p.domain = domain.to_string();
            if p.chunk_id.is_empty() {
                p.chunk_id = chunk_id_for(&p.source, &p.text);
            }
            passages.push(p);
        }
    }

    if dropped > 0 {
        tracing::debug!(domain, dropped, "dropped empty passages");
    }
    Ok(passages)
}

/// Embed and save every registered domain found under `input`.
///
/// A domain with no passages is skipped. Any artifacts and manifest entry
/// left from an earlier build of it are removed, so a later load does not
/// serve a corpus the input no longer contains.
pub async fn build_domains(
    registry: &DomainRegistry,
    embedder: &dyn Embedder,
    input: &Path,
    batch_size: usize,
    index_dir: &Path,
) -> Result<BuildReport> {
    let mut report = BuildReport::default();
    let mut manifest = read_manifest(index_dir)?;
    let batch_size = batch_size.max(1);

    for spec in registry.iter() {
        let passages = collect_passages(input, &spec.id)?;
        if passages.is_empty() {
            tracing::warn!(domain = %spec.id, "no passages found; skipping");
            let had_entry = manifest.domains.remove(&spec.id).is_some();
            if remove_domain(spec)? || had_entry {
                tracing::warn!(domain = %spec.id, "removed stale index artifacts");
                report.removed.push(spec.id.clone());
            }
            report.skipped.push(spec.id.clone());
            continue;
        }

        let started = Instant::now();
        let mut vectors = Vec::with_capacity(passages.len());
        for batch in passages.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            let embedded = embedder
                .embed(&texts)
                .await
                .with_context(|| format!("domain '{}': embedding failed", spec.id))?;
            vectors.extend(embedded);
        }

        let count = passages.len();
        let index = DomainIndex::build(embedder.dims(), &vectors, passages)
            .with_context(|| format!("domain '{}': building index", spec.id))?;
        let metadata_sha256 = save_domain(spec, &index)?;

        manifest.domains.insert(
            spec.id.clone(),
            ManifestEntry {
                model: embedder.model_name().to_string(),
                dims: embedder.dims(),
                vector_count: count,
                metadata_sha256,
                built_at: Utc::now(),
            },
        );
        tracing::info!(
            domain = %spec.id,
            vectors = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built domain index"
        );
        report.built.push(BuiltDomain {
            id: spec.id.clone(),
            vectors: count,
        });
    }

    write_manifest(index_dir, &manifest)?;
    Ok(report)
}

/// CLI entry point for `clinrag build`.
pub async fn run_build(config: &Config, input: &Path) -> Result<()> {
    let registry = config.registry()?;
    let embedder = create_embedder(&config.embedding)?;

    let report = build_domains(
        &registry,
        embedder.as_ref(),
        input,
        config.embedding.batch_size,
        &config.index.dir,
    )
    .await?;

    for d in &report.built {
        println!("{:<16} {:>8} vectors", d.id, d.vectors);
    }
    for id in &report.skipped {
        if report.removed.contains(id) {
            println!("{:<16} skipped (no passages; previous index removed)", id);
        } else {
            println!("{:<16} skipped (no passages)", id);
        }
    }
    println!(
        "Built {} domain(s) into {}",
        report.built.len(),
        config.index.dir.display()
    );
    Ok(())
}
