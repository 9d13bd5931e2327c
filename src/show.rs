//! Read-side commands: artifact detail, resolution updates, activity log.

use anyhow::{bail, Result};
use serde::Serialize;

use telecom_harness_core::capture::render_summary;
use telecom_harness_core::models::{
    Activity, AnalysisResult, Artifact, EmbeddingRecord, ResolutionStatus,
};
use telecom_harness_core::store::RecordStore;

use crate::config::Config;
use crate::db;
use crate::services;
use crate::sqlite_store::SqliteRecordStore;

/// Everything stored for one artifact.
#[derive(Debug, Serialize)]
pub struct ArtifactDetail {
    pub artifact: Artifact,
    pub result: Option<AnalysisResult>,
    pub embeddings: Vec<EmbeddingRecord>,
    pub activities: Vec<Activity>,
}

pub async fn get_artifact_detail(store: &dyn RecordStore, id: i64) -> Result<ArtifactDetail> {
    let Some(artifact) = store.get_artifact(id).await? else {
        bail!("Artifact not found: {}", id);
    };
    let result = store.get_analysis_result_by_artifact(id).await?;
    let embeddings = store.list_embedding_records(id).await?;
    let activities = store.list_activities(Some(id), 1000).await?;
    Ok(ArtifactDetail {
        artifact,
        result,
        embeddings,
        activities,
    })
}

/// CLI entry point for `tlh show`.
pub async fn run_show(config: &Config, id: i64, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteRecordStore::new(pool.clone());
    let detail = get_artifact_detail(&store, id).await;
    pool.close().await;
    let detail = detail?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let a = &detail.artifact;
    println!("--- Artifact ---");
    println!("id:         {}", a.id);
    println!("kind:       {}", a.kind.as_str());
    println!("filename:   {}", a.filename);
    println!("source:     {}", a.content_ref);
    println!("size:       {} bytes", a.size_bytes);
    println!("created_at: {}", a.created_at.to_rfc3339());
    println!("status:     {}", a.processing_status);
    println!();

    match &detail.result {
        Some(result) => {
            println!("--- Analysis ---");
            println!("severity:   {}", result.severity);
            println!("resolution: {}", result.resolution_status.as_str());
            println!("summary:    {}", result.summary);
            for issue in &result.issues {
                println!(
                    "  [{}] {}{}",
                    issue.severity,
                    issue.title,
                    issue
                        .first_seen
                        .as_deref()
                        .map(|t| format!(" (first seen {})", t))
                        .unwrap_or_default()
                );
            }
            for rec in &result.recommendations {
                println!("  -> {} [{}]", rec.title, rec.category);
            }
            println!();
            if let Some(report) = &result.capture_report {
                println!("{}", render_summary(report));
            }
        }
        None => {
            println!("--- Analysis ---");
            println!("(none)");
            println!();
        }
    }

    let ok = detail.embeddings.iter().filter(|e| e.success).count();
    println!("--- Chunks ({}, {} embedded) ---", detail.embeddings.len(), ok);
    for e in &detail.embeddings {
        let id = if e.vector_id.is_empty() {
            "-"
        } else {
            e.vector_id.as_str()
        };
        println!("[chunk {}] {} {}", e.chunk_index, id, e.text.lines().next().unwrap_or(""));
    }
    println!();

    println!("--- Activity ---");
    for act in detail.activities.iter().rev() {
        print_activity(act);
    }
    Ok(())
}

/// CLI entry point for `tlh resolve`.
pub async fn run_resolve(config: &Config, id: i64, status: &str) -> Result<()> {
    let Some(status) = ResolutionStatus::parse(status) else {
        bail!(
            "Unknown resolution status: '{}'. Use pending, in_progress, or resolved.",
            status
        );
    };
    let (pool, runner) = services::open_runner(config).await?;
    let result = runner.pipeline().update_resolution_status(id, status).await;
    pool.close().await;

    let result = result?;
    println!("artifact {}: {}", result.artifact_id, result.resolution_status.as_str());
    Ok(())
}

/// CLI entry point for `tlh activities`.
pub async fn run_activities(config: &Config, artifact: Option<i64>, limit: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteRecordStore::new(pool.clone());
    let activities = store.list_activities(artifact, limit).await;
    pool.close().await;

    let activities = activities?;
    if activities.is_empty() {
        println!("No activity.");
        return Ok(());
    }
    for act in &activities {
        print_activity(act);
    }
    Ok(())
}

fn print_activity(act: &Activity) {
    let artifact = act
        .artifact_id
        .map(|id| format!("#{}", id))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{}  {:<4} {:<10} {:<7} {}",
        act.created_at.format("%Y-%m-%d %H:%M:%S"),
        artifact,
        act.kind.as_str(),
        act.status.as_str(),
        act.description
    );
}
