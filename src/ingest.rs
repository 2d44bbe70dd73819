//! Ingestion commands.
//!
//! Wires the core [`Pipeline`] to SQLite and the filesystem blob store and
//! renders per-unit results on stdout. Progress events go to stderr via
//! the configured reporter.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use lexgraph_core::embedding::DeterministicEmbedder;
use lexgraph_core::graph::GraphBuilder;
use lexgraph_core::parse::SourceProfile;
use lexgraph_core::pipeline::{IngestReport, IngestRequest, IngestStatus, Pipeline};
use lexgraph_core::progress::ProgressReporter;
use lexgraph_core::store::{BlobStore, Store};

use crate::blob_fs::FsBlobStore;
use crate::config::Config;
use crate::db;
use crate::progress::ProgressMode;
use crate::sqlite_store::SqliteStore;

/// Source recorded for files whose corpus cannot be inferred.
pub const DEFAULT_SOURCE: &str = "local";

/// Build a pipeline from config around explicit store handles.
pub fn build_pipeline<'a, S, B>(
    config: &Config,
    store: &'a S,
    blobs: &'a B,
    progress: &'a dyn ProgressReporter,
) -> Pipeline<'a, S, B>
where
    S: Store + ?Sized,
    B: BlobStore + ?Sized,
{
    Pipeline::new(store, blobs)
        .with_embedder(Box::new(DeterministicEmbedder::new(config.embedding.dims)))
        .with_chunking(config.chunking.to_chunk_config())
        .with_graph(GraphBuilder::with_policy(config.graph.conflict_policy))
        .with_progress(progress)
}

/// Corpus source for a file: the explicit `--source`, else the parent
/// directory's name when it names a known source profile.
pub fn infer_source(path: &Path, explicit: Option<&str>) -> String {
    if let Some(source) = explicit {
        return source.to_string();
    }
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .filter(|n| SourceProfile::lookup(n).is_some())
        .unwrap_or(DEFAULT_SOURCE)
        .to_string()
}

fn read_request(path: &Path, name: String, source: String) -> Result<IngestRequest> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(IngestRequest::new(name, source, bytes))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_report(report: &IngestReport) {
    println!(
        "{:<8}  {}  {}",
        report.status().as_str(),
        report.name,
        report.message()
    );
}

/// `lexgraph ingest <file>`
pub async fn run_ingest(
    config: &Config,
    file: &Path,
    source: Option<&str>,
    mode: ProgressMode,
) -> Result<()> {
    let request = read_request(file, file_name(file), infer_source(file, source))?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let blobs = FsBlobStore::new(&config.blobs.root);
    let reporter = mode.reporter();
    let pipeline = build_pipeline(config, &store, &blobs, reporter.as_ref());

    let report = pipeline.ingest(&request).await;
    pool.close().await;

    match report.status() {
        IngestStatus::Failed => bail!("{}: {}", report.name, report.message()),
        _ => {
            println!("{}", report.message());
            if let Some(id) = report.document_id() {
                println!("  document: {}", id);
            }
        }
    }
    Ok(())
}

/// `lexgraph bulk <dir>`: ingest every matching file in authority order.
pub async fn run_bulk(
    config: &Config,
    dir: &Path,
    source: Option<&str>,
    mode: ProgressMode,
) -> Result<()> {
    let files = scan_directory(config, dir)?;
    if files.is_empty() {
        println!("bulk {}: no matching files", dir.display());
        return Ok(());
    }

    let mut requests = Vec::with_capacity(files.len());
    for (path, rel) in &files {
        requests.push(read_request(path, rel.clone(), infer_source(path, source))?);
    }

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let blobs = FsBlobStore::new(&config.blobs.root);
    let reporter = mode.reporter();
    let pipeline = build_pipeline(config, &store, &blobs, reporter.as_ref());

    let summary = pipeline.ingest_bulk(requests).await;
    pool.close().await;

    println!("bulk {}", dir.display());
    for report in &summary.reports {
        print_report(report);
    }
    println!(
        "  ingested: {}  skipped: {}  failed: {}",
        summary.ingested, summary.skipped, summary.failed
    );

    if summary.failed > 0 {
        bail!("{} of {} files failed", summary.failed, summary.reports.len());
    }
    println!("ok");
    Ok(())
}

/// `lexgraph revise <document-id> <file>`
pub async fn run_revise(
    config: &Config,
    document_id: &str,
    file: &Path,
    source: Option<&str>,
    mode: ProgressMode,
) -> Result<()> {
    let request = read_request(file, file_name(file), infer_source(file, source))?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let blobs = FsBlobStore::new(&config.blobs.root);
    let reporter = mode.reporter();
    let pipeline = build_pipeline(config, &store, &blobs, reporter.as_ref());

    let report = pipeline.ingest_revision(document_id, &request).await;
    pool.close().await;

    match report.status() {
        IngestStatus::Failed => bail!("{}: {}", report.name, report.message()),
        IngestStatus::Skipped => println!("{}", report.message()),
        IngestStatus::Ingested => {
            let version = report
                .outputs
                .document_versions
                .first()
                .map(|v| v.version_number)
                .unwrap_or_default();
            println!("Revised: {} (version {})", document_id, version);
            println!("  {}", report.message());
        }
    }
    Ok(())
}

/// `lexgraph purge --yes`: delete every ingested record and stored blob.
pub async fn run_purge(config: &Config, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("purge deletes all ingested data; re-run with --yes to confirm");
    }
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    store.purge().await?;
    pool.close().await;

    FsBlobStore::new(&config.blobs.root).clear().await?;
    println!("All ingested data purged.");
    Ok(())
}

/// Files under `dir` accepted by the `[bulk]` globs, as (path, relative
/// name) pairs sorted by relative name.
pub fn scan_directory(
    config: &Config,
    dir: &Path,
) -> Result<Vec<(std::path::PathBuf, String)>> {
    if !dir.is_dir() {
        bail!("Bulk directory does not exist: {}", dir.display());
    }

    let include_set = build_globset(&config.bulk.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(config.bulk.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(config.bulk.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((path.to_path_buf(), rel_str));
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
