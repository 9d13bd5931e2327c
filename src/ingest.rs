//! File and directory ingestion.
//!
//! Files are classified by extension: `*.pcap`, `*.pcapng` and `*.cap` are
//! decoded as captures, everything else is read as log text. Each file
//! becomes one artifact submitted to the [`PipelineRunner`]; directory
//! ingestion waits for every run to finish before reporting.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use telecom_harness_core::models::{ArtifactKind, NewArtifact, ProcessingStatus};

use crate::config::{Config, IngestConfig};
use crate::decode::{is_capture_path, read_capture};
use crate::pipeline::{Payload, PipelineError, PipelineOutcome};
use crate::runner::PipelineRunner;
use crate::services;

/// Read `path` into an artifact description and its decoded payload.
pub fn load_file(path: &Path) -> Result<(NewArtifact, Payload)> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let (kind, payload) = if is_capture_path(path) {
        (ArtifactKind::Capture, Payload::Capture(read_capture(path)?))
    } else {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        (
            ArtifactKind::Log,
            Payload::Log(String::from_utf8_lossy(&bytes).into_owned()),
        )
    };

    Ok((
        NewArtifact {
            kind,
            filename,
            content_ref: path.display().to_string(),
            size_bytes: metadata.len(),
        },
        payload,
    ))
}

/// Files under `root` matching the include globs and none of the excludes,
/// sorted by relative path.
pub fn scan_dir(root: &Path, ingest: &IngestConfig) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Ingest root is not a directory: {}", root.display());
    }

    let include_set = build_globset(&ingest.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(ingest.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(ingest.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((rel_str, path.to_path_buf()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub outcomes: Vec<PipelineOutcome>,
    /// Files that never became artifacts, with the reason.
    pub rejected: Vec<(PathBuf, String)>,
    /// Files whose submission or run ended in an error.
    pub failed: Vec<(PathBuf, String)>,
}

impl IngestReport {
    pub fn count(&self, status: ProcessingStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Submit every file under `root` and wait for all runs.
///
/// A file that cannot be submitted is recorded in
/// [`IngestReport::failed`]; runs already scheduled are still awaited.
pub async fn ingest_dir(
    runner: &PipelineRunner,
    root: &Path,
    ingest: &IngestConfig,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    let mut pending = Vec::new();

    for path in scan_dir(root, ingest)? {
        let (artifact, payload) = match load_file(&path) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                report.rejected.push((path, format!("{:#}", e)));
                continue;
            }
        };
        match runner.submit(artifact, payload).await {
            Ok((_, handle)) => pending.push((path, handle)),
            Err(PipelineError::InputRejected(reason)) => {
                tracing::info!(path = %path.display(), reason = %reason, "Rejected");
                report.rejected.push((path, reason));
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Submit failed");
                report.failed.push((path, format!("{:#}", e)));
            }
        }
    }

    for (path, handle) in pending {
        match handle.await {
            Ok(Ok(outcome)) => report.outcomes.push(outcome),
            Ok(Err(e)) => report.failed.push((path, e.to_string())),
            Err(e) => report.failed.push((path, format!("run task failed: {}", e))),
        }
    }

    Ok(report)
}

/// CLI entry point for `tlh analyze <file>`.
pub async fn run_analyze(config: &Config, path: &Path) -> Result<()> {
    let (artifact, payload) = load_file(path)?;
    let (pool, runner) = services::open_runner(config).await?;

    let (artifact, handle) = runner.submit(artifact, payload).await?;
    println!("analyze {}", path.display());
    println!("  artifact: {}", artifact.id);

    let result = handle.await?;
    pool.close().await;

    let outcome = result?;
    println!("  status: {}", outcome.status);
    for degradation in &outcome.degradations {
        println!("  degraded: {}", degradation);
    }
    println!("ok");
    Ok(())
}

/// CLI entry point for `tlh ingest <dir>`.
pub async fn run_ingest(config: &Config, root: &Path) -> Result<()> {
    let (pool, runner) = services::open_runner(config).await?;
    let report = ingest_dir(&runner, root, &config.ingest).await?;
    pool.close().await;

    println!("ingest {}", root.display());
    println!("  artifacts: {}", report.outcomes.len() + report.failed.len());
    println!("  completed: {}", report.count(ProcessingStatus::Completed));
    println!(
        "  completed without vectors: {}",
        report.count(ProcessingStatus::CompletedWithoutVectors)
    );
    println!("  errors: {}", report.failed.len());
    println!("  rejected: {}", report.rejected.len());
    for (path, reason) in report.rejected.iter().chain(report.failed.iter()) {
        println!("    {}: {}", path.display(), reason);
    }
    println!("ok");
    Ok(())
}
