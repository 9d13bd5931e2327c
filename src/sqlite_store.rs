//! SQLite-backed [`RecordStore`] and [`VectorStore`].
//!
//! Both share one `SqlitePool` (WAL mode, see [`db::connect`](crate::db::connect)).
//! Structured fields of an analysis result (issues, recommendations, the
//! capture report) are stored as JSON text; vectors as little-endian f32
//! BLOBs. Timestamps are Unix seconds.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use telecom_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use telecom_harness_core::models::{
    Activity, ActivityKind, ActivityStatus, AnalysisResult, Artifact, ArtifactKind,
    EmbeddingRecord, NewActivity, NewAnalysisResult, NewArtifact, NewEmbeddingRecord,
    ProcessingStatus, ResolutionStatus, Severity,
};
use telecom_harness_core::store::RecordStore;
use telecom_harness_core::vector::{VectorItem, VectorMatch, VectorStore};

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn parse_enum<T>(value: &str, parse: fn(&str) -> Option<T>, what: &str) -> Result<T> {
    parse(value).ok_or_else(|| anyhow!("unknown {} '{}' in database", what, value))
}

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn artifact_from_row(row: &SqliteRow) -> Result<Artifact> {
    let kind: String = row.get("kind");
    let status: String = row.get("processing_status");
    let size: i64 = row.get("size_bytes");
    Ok(Artifact {
        id: row.get("id"),
        kind: parse_enum(&kind, ArtifactKind::parse, "artifact kind")?,
        filename: row.get("filename"),
        content_ref: row.get("content_ref"),
        size_bytes: size.max(0) as u64,
        created_at: from_ts(row.get("created_at")),
        processing_status: parse_enum(&status, ProcessingStatus::parse, "processing status")?,
    })
}

fn result_from_row(row: &SqliteRow) -> Result<AnalysisResult> {
    let issues: String = row.get("issues_json");
    let recommendations: String = row.get("recommendations_json");
    let severity: String = row.get("severity");
    let resolution: String = row.get("resolution_status");
    let report: Option<String> = row.get("capture_report_json");
    Ok(AnalysisResult {
        id: row.get("id"),
        artifact_id: row.get("artifact_id"),
        issues: serde_json::from_str(&issues).context("corrupt issues_json")?,
        recommendations: serde_json::from_str(&recommendations)
            .context("corrupt recommendations_json")?,
        summary: row.get("summary"),
        severity: parse_enum(&severity, Severity::parse, "severity")?,
        resolution_status: parse_enum(&resolution, ResolutionStatus::parse, "resolution status")?,
        capture_report: report
            .map(|r| serde_json::from_str(&r))
            .transpose()
            .context("corrupt capture_report_json")?,
        created_at: from_ts(row.get("created_at")),
    })
}

fn embedding_from_row(row: &SqliteRow) -> EmbeddingRecord {
    let blob: Vec<u8> = row.get("vector");
    let chunk_index: i64 = row.get("chunk_index");
    EmbeddingRecord {
        id: row.get("id"),
        artifact_id: row.get("artifact_id"),
        chunk_index: chunk_index.max(0) as usize,
        text: row.get("text"),
        vector: blob_to_vec(&blob),
        vector_id: row.get("vector_id"),
        success: row.get("success"),
        created_at: from_ts(row.get("created_at")),
    }
}

fn activity_from_row(row: &SqliteRow) -> Result<Activity> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    Ok(Activity {
        id: row.get("id"),
        artifact_id: row.get("artifact_id"),
        kind: parse_enum(&kind, ActivityKind::parse, "activity kind")?,
        description: row.get("description"),
        status: parse_enum(&status, ActivityStatus::parse, "activity status")?,
        created_at: from_ts(row.get("created_at")),
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create_artifact(&self, artifact: NewArtifact) -> Result<Artifact> {
        let now = Utc::now().timestamp();
        let id = sqlx::query(
            r#"
            INSERT INTO artifacts (kind, filename, content_ref, size_bytes, created_at, processing_status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(artifact.kind.as_str())
        .bind(&artifact.filename)
        .bind(&artifact.content_ref)
        .bind(artifact.size_bytes as i64)
        .bind(now)
        .bind(ProcessingStatus::Pending.as_str())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Artifact {
            id,
            kind: artifact.kind,
            filename: artifact.filename,
            content_ref: artifact.content_ref,
            size_bytes: artifact.size_bytes,
            created_at: from_ts(now),
            processing_status: ProcessingStatus::Pending,
        })
    }

    async fn get_artifact(&self, id: i64) -> Result<Option<Artifact>> {
        let row = sqlx::query("SELECT * FROM artifacts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(artifact_from_row).transpose()
    }

    async fn list_artifacts(&self, limit: usize) -> Result<Vec<Artifact>> {
        let rows = sqlx::query("SELECT * FROM artifacts ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(artifact_from_row).collect()
    }

    async fn update_status(&self, id: i64, status: ProcessingStatus) -> Result<Option<Artifact>> {
        let affected = sqlx::query("UPDATE artifacts SET processing_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Ok(None);
        }
        self.get_artifact(id).await
    }

    async fn create_analysis_result(&self, result: NewAnalysisResult) -> Result<AnalysisResult> {
        let now = Utc::now().timestamp();
        let analysis = &result.analysis;
        let report_json = result
            .capture_report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let id = sqlx::query(
            r#"
            INSERT INTO analysis_results
                (artifact_id, issues_json, recommendations_json, summary, severity,
                 resolution_status, capture_report_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.artifact_id)
        .bind(serde_json::to_string(&analysis.issues)?)
        .bind(serde_json::to_string(&analysis.recommendations)?)
        .bind(&analysis.summary)
        .bind(analysis.severity.as_str())
        .bind(ResolutionStatus::Pending.as_str())
        .bind(report_json)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "failed to store analysis result for artifact {}",
                result.artifact_id
            )
        })?
        .last_insert_rowid();

        Ok(AnalysisResult {
            id,
            artifact_id: result.artifact_id,
            issues: result.analysis.issues,
            recommendations: result.analysis.recommendations,
            summary: result.analysis.summary,
            severity: result.analysis.severity,
            resolution_status: ResolutionStatus::Pending,
            capture_report: result.capture_report,
            created_at: from_ts(now),
        })
    }

    async fn get_analysis_result_by_artifact(
        &self,
        artifact_id: i64,
    ) -> Result<Option<AnalysisResult>> {
        let row = sqlx::query("SELECT * FROM analysis_results WHERE artifact_id = ?")
            .bind(artifact_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(result_from_row).transpose()
    }

    async fn update_resolution_status(
        &self,
        artifact_id: i64,
        status: ResolutionStatus,
    ) -> Result<Option<AnalysisResult>> {
        let affected =
            sqlx::query("UPDATE analysis_results SET resolution_status = ? WHERE artifact_id = ?")
                .bind(status.as_str())
                .bind(artifact_id)
                .execute(&self.pool)
                .await?
                .rows_affected();
        if affected == 0 {
            return Ok(None);
        }
        self.get_analysis_result_by_artifact(artifact_id).await
    }

    async fn create_embedding_record(
        &self,
        record: NewEmbeddingRecord,
    ) -> Result<EmbeddingRecord> {
        let now = Utc::now().timestamp();
        let id = sqlx::query(
            r#"
            INSERT INTO embedding_records
                (artifact_id, chunk_index, text, vector, vector_id, success, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.artifact_id)
        .bind(record.chunk_index as i64)
        .bind(&record.text)
        .bind(vec_to_blob(&record.vector))
        .bind(&record.vector_id)
        .bind(record.success)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(EmbeddingRecord {
            id,
            artifact_id: record.artifact_id,
            chunk_index: record.chunk_index,
            text: record.text,
            vector: record.vector,
            vector_id: record.vector_id,
            success: record.success,
            created_at: from_ts(now),
        })
    }

    async fn list_embedding_records(&self, artifact_id: i64) -> Result<Vec<EmbeddingRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM embedding_records WHERE artifact_id = ? ORDER BY chunk_index, id",
        )
        .bind(artifact_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(embedding_from_row).collect())
    }

    async fn create_activity(&self, activity: NewActivity) -> Result<Activity> {
        let now = Utc::now().timestamp();
        let id = sqlx::query(
            r#"
            INSERT INTO activities (artifact_id, kind, description, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(activity.artifact_id)
        .bind(activity.kind.as_str())
        .bind(&activity.description)
        .bind(activity.status.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Activity {
            id,
            artifact_id: activity.artifact_id,
            kind: activity.kind,
            description: activity.description,
            status: activity.status,
            created_at: from_ts(now),
        })
    }

    async fn list_activities(
        &self,
        artifact_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Activity>> {
        let rows = match artifact_id {
            Some(id) => {
                sqlx::query("SELECT * FROM activities WHERE artifact_id = ? ORDER BY id DESC LIMIT ?")
                    .bind(id)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM activities ORDER BY id DESC LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(activity_from_row).collect()
    }
}

/// Vector store over the `chunk_vectors` table.
///
/// Search is brute force: every stored vector is loaded and scored with
/// cosine similarity in Rust.
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, artifact_id: i64, items: &[VectorItem]) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = sqlx::query(
                "INSERT INTO chunk_vectors (artifact_id, text, dims, embedding) VALUES (?, ?, ?, ?)",
            )
            .bind(artifact_id)
            .bind(&item.text)
            .bind(item.vector.len() as i64)
            .bind(vec_to_blob(&item.vector))
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
            ids.push(format!("vec-{}", id));
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let rows = sqlx::query("SELECT artifact_id, text, embedding FROM chunk_vectors")
            .fetch_all(&self.pool)
            .await?;

        let mut matches: Vec<VectorMatch> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                VectorMatch {
                    artifact_id: row.get("artifact_id"),
                    text: row.get("text"),
                    score: cosine_similarity(vector, &blob_to_vec(&blob)),
                }
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}
