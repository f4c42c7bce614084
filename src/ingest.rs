//! Ingestion pipeline orchestration.
//!
//! Coordinates the upload flow for one knowledge base: text → chunking →
//! fragment records → segmentation → index batch. Segmentation failures
//! are non-fatal; the affected fragment is indexed with its raw text.

use anyhow::{Context, Result};
use tracing::{info, warn};

use minerag_core::chunk::{chunk_text, ChunkOptions};
use minerag_core::keywords::Tokenizer;
use minerag_core::models::{build_fragment_records, FragmentRecord, KnowledgeBaseRef};

use crate::config::Config;
use crate::lifecycle::IndexManager;
use crate::scan::collect_sources;

/// Outcome of ingesting one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub source_name: String,
    pub chunks: usize,
    /// Fragments indexed with raw text after segmentation failed.
    pub fallbacks: usize,
    pub skipped: bool,
}

/// Replace each record's `segmentContent` with tokenized text.
///
/// Returns the number of records that kept their raw content.
pub async fn segment_records(tokenizer: &dyn Tokenizer, records: &mut [FragmentRecord]) -> usize {
    let mut fallbacks = 0;
    for record in records.iter_mut() {
        match tokenizer.tokenize(&record.content).await {
            Ok(segmented) if !segmented.trim().is_empty() => record.segment_content = segmented,
            Ok(_) => {}
            Err(e) => {
                warn!(
                    source = %record.source_name,
                    sequence = record.sequence_index,
                    error = %e,
                    "segmentation failed, indexing raw text"
                );
                fallbacks += 1;
            }
        }
    }
    fallbacks
}

/// Chunk `text` and write its fragments into the index for `kb`.
///
/// Empty text is skipped with a warning. The add task is awaited, so the
/// fragments are searchable when this returns.
pub async fn ingest_text(
    manager: &IndexManager,
    chunking: &ChunkOptions,
    tokenizer: Option<&dyn Tokenizer>,
    kb: &KnowledgeBaseRef,
    source_name: &str,
    text: &str,
) -> Result<IngestReport> {
    let mut report = IngestReport {
        source_name: source_name.to_string(),
        ..Default::default()
    };
    if text.trim().is_empty() {
        warn!(source = source_name, "empty text, skipping");
        report.skipped = true;
        return Ok(report);
    }

    let index_name = manager
        .prepare(&kb.label)
        .await
        .with_context(|| format!("Failed to prepare index for knowledge base '{}'", kb.label))?;

    let chunks = chunk_text(text, chunking);
    let mut records = build_fragment_records(chunks, source_name, kb);
    report.chunks = records.len();
    if let Some(tokenizer) = tokenizer {
        report.fallbacks = segment_records(tokenizer, &mut records).await;
    }

    let task = manager
        .client()
        .add_documents(&index_name, &records)
        .await
        .with_context(|| format!("Failed to add fragments of '{}'", source_name))?;
    manager
        .wait(task)
        .await
        .with_context(|| format!("Indexing '{}' did not complete", source_name))?;

    info!(
        index = %index_name,
        source = source_name,
        chunks = report.chunks,
        fallbacks = report.fallbacks,
        "source ingested"
    );
    Ok(report)
}

/// `mrag ingest`: index every discovered text file into `kb`.
#[allow(clippy::too_many_arguments)]
pub async fn run_ingest(
    config: &Config,
    manager: &IndexManager,
    tokenizer: Option<&dyn Tokenizer>,
    kb: &str,
    name: Option<String>,
    paths: &[std::path::PathBuf],
    include: &[String],
    exclude: &[String],
    dry_run: bool,
) -> Result<()> {
    let files = collect_sources(paths, include, exclude)?;
    let chunking = config.chunking.options();

    if dry_run {
        println!("ingest {} (dry-run)", kb);
        println!("  files found: {}", files.len());
        let mut total_chunks = 0;
        for file in &files {
            let text = std::fs::read_to_string(&file.path)
                .with_context(|| format!("Failed to read {}", file.path.display()))?;
            let n = if text.trim().is_empty() {
                0
            } else {
                chunk_text(&text, &chunking).len()
            };
            println!("  {}: {} chunks", file.source_name, n);
            total_chunks += n;
        }
        println!("  estimated chunks: {}", total_chunks);
        return Ok(());
    }

    let kb_ref = KnowledgeBaseRef {
        label: kb.to_string(),
        name: name.unwrap_or_else(|| kb.to_string()),
    };

    let mut chunks = 0;
    let mut fallbacks = 0;
    let mut skipped = 0;
    for file in &files {
        let text = std::fs::read_to_string(&file.path)
            .with_context(|| format!("Failed to read {}", file.path.display()))?;
        let report = ingest_text(
            manager,
            &chunking,
            tokenizer,
            &kb_ref,
            &file.source_name,
            &text,
        )
        .await?;
        if report.skipped {
            skipped += 1;
        }
        chunks += report.chunks;
        fallbacks += report.fallbacks;
    }

    println!("ingest {}", kb);
    println!("  files: {}", files.len());
    println!("  skipped (empty): {}", skipped);
    println!("  fragments written: {}", chunks);
    if fallbacks > 0 {
        println!("  unsegmented fragments: {}", fallbacks);
    }
    println!("ok");
    Ok(())
}
