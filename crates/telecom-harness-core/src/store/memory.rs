//! In-memory [`RecordStore`] for tests and single-process use.
//!
//! Records live in `HashMap`s and `Vec`s behind `std::sync::RwLock`; ids come
//! from per-table `AtomicI64` counters, so they are unique and increasing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    Activity, AnalysisResult, Artifact, EmbeddingRecord, NewActivity, NewAnalysisResult,
    NewArtifact, NewEmbeddingRecord, ProcessingStatus, ResolutionStatus,
};

use super::RecordStore;

/// In-memory record store.
pub struct InMemoryRecordStore {
    artifacts: RwLock<HashMap<i64, Artifact>>,
    results: RwLock<HashMap<i64, AnalysisResult>>,
    embeddings: RwLock<Vec<EmbeddingRecord>>,
    activities: RwLock<Vec<Activity>>,
    next_artifact_id: AtomicI64,
    next_result_id: AtomicI64,
    next_embedding_id: AtomicI64,
    next_activity_id: AtomicI64,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            artifacts: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
            embeddings: RwLock::new(Vec::new()),
            activities: RwLock::new(Vec::new()),
            next_artifact_id: AtomicI64::new(1),
            next_result_id: AtomicI64::new(1),
            next_embedding_id: AtomicI64::new(1),
            next_activity_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("record store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("record store lock poisoned"))
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_artifact(&self, artifact: NewArtifact) -> Result<Artifact> {
        let id = self.next_artifact_id.fetch_add(1, Ordering::SeqCst);
        let stored = Artifact {
            id,
            kind: artifact.kind,
            filename: artifact.filename,
            content_ref: artifact.content_ref,
            size_bytes: artifact.size_bytes,
            created_at: Utc::now(),
            processing_status: ProcessingStatus::Pending,
        };
        write(&self.artifacts)?.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_artifact(&self, id: i64) -> Result<Option<Artifact>> {
        Ok(read(&self.artifacts)?.get(&id).cloned())
    }

    async fn list_artifacts(&self, limit: usize) -> Result<Vec<Artifact>> {
        let mut all: Vec<Artifact> = read(&self.artifacts)?.values().cloned().collect();
        all.sort_by(|a, b| b.id.cmp(&a.id));
        all.truncate(limit);
        Ok(all)
    }

    async fn update_status(&self, id: i64, status: ProcessingStatus) -> Result<Option<Artifact>> {
        let mut artifacts = write(&self.artifacts)?;
        Ok(artifacts.get_mut(&id).map(|a| {
            a.processing_status = status;
            a.clone()
        }))
    }

    async fn create_analysis_result(&self, result: NewAnalysisResult) -> Result<AnalysisResult> {
        let mut results = write(&self.results)?;
        if results.contains_key(&result.artifact_id) {
            bail!(
                "analysis result already exists for artifact {}",
                result.artifact_id
            );
        }
        let stored = AnalysisResult {
            id: self.next_result_id.fetch_add(1, Ordering::SeqCst),
            artifact_id: result.artifact_id,
            issues: result.analysis.issues,
            recommendations: result.analysis.recommendations,
            summary: result.analysis.summary,
            severity: result.analysis.severity,
            resolution_status: ResolutionStatus::Pending,
            capture_report: result.capture_report,
            created_at: Utc::now(),
        };
        results.insert(stored.artifact_id, stored.clone());
        Ok(stored)
    }

    async fn get_analysis_result_by_artifact(
        &self,
        artifact_id: i64,
    ) -> Result<Option<AnalysisResult>> {
        Ok(read(&self.results)?.get(&artifact_id).cloned())
    }

    async fn update_resolution_status(
        &self,
        artifact_id: i64,
        status: ResolutionStatus,
    ) -> Result<Option<AnalysisResult>> {
        let mut results = write(&self.results)?;
        Ok(results.get_mut(&artifact_id).map(|r| {
            r.resolution_status = status;
            r.clone()
        }))
    }

    async fn create_embedding_record(
        &self,
        record: NewEmbeddingRecord,
    ) -> Result<EmbeddingRecord> {
        let stored = EmbeddingRecord {
            id: self.next_embedding_id.fetch_add(1, Ordering::SeqCst),
            artifact_id: record.artifact_id,
            chunk_index: record.chunk_index,
            text: record.text,
            vector: record.vector,
            vector_id: record.vector_id,
            success: record.success,
            created_at: Utc::now(),
        };
        write(&self.embeddings)?.push(stored.clone());
        Ok(stored)
    }

    async fn list_embedding_records(&self, artifact_id: i64) -> Result<Vec<EmbeddingRecord>> {
        let mut records: Vec<EmbeddingRecord> = read(&self.embeddings)?
            .iter()
            .filter(|r| r.artifact_id == artifact_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.chunk_index);
        Ok(records)
    }

    async fn create_activity(&self, activity: NewActivity) -> Result<Activity> {
        let stored = Activity {
            id: self.next_activity_id.fetch_add(1, Ordering::SeqCst),
            artifact_id: activity.artifact_id,
            kind: activity.kind,
            description: activity.description,
            status: activity.status,
            created_at: Utc::now(),
        };
        write(&self.activities)?.push(stored.clone());
        Ok(stored)
    }

    async fn list_activities(
        &self,
        artifact_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Activity>> {
        Ok(read(&self.activities)?
            .iter()
            .rev()
            .filter(|a| artifact_id.is_none() || a.artifact_id == artifact_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityKind, ActivityStatus, ArtifactKind, LogAnalysis};

    fn new_log(name: &str) -> NewArtifact {
        NewArtifact {
            kind: ArtifactKind::Log,
            filename: name.to_string(),
            content_ref: "inline".to_string(),
            size_bytes: 10,
        }
    }

    fn empty_result(artifact_id: i64) -> NewAnalysisResult {
        NewAnalysisResult {
            artifact_id,
            analysis: LogAnalysis::from_findings(vec![], vec![], "nothing".into()),
            capture_report: None,
        }
    }

    #[tokio::test]
    async fn test_ids_increase_and_start_pending() {
        let store = InMemoryRecordStore::new();
        let a = store.create_artifact(new_log("a.log")).await.unwrap();
        let b = store.create_artifact(new_log("b.log")).await.unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.processing_status, ProcessingStatus::Pending);

        let listed = store.list_artifacts(10).await.unwrap();
        assert_eq!(listed[0].id, b.id);
    }

    #[tokio::test]
    async fn test_update_status_unknown_id() {
        let store = InMemoryRecordStore::new();
        let r = store
            .update_status(42, ProcessingStatus::Processing)
            .await
            .unwrap();
        assert!(r.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_result_rejected() {
        let store = InMemoryRecordStore::new();
        let a = store.create_artifact(new_log("a.log")).await.unwrap();
        store.create_analysis_result(empty_result(a.id)).await.unwrap();
        assert!(store.create_analysis_result(empty_result(a.id)).await.is_err());
    }

    #[tokio::test]
    async fn test_resolution_update() {
        let store = InMemoryRecordStore::new();
        let a = store.create_artifact(new_log("a.log")).await.unwrap();
        assert!(store
            .update_resolution_status(a.id, ResolutionStatus::Resolved)
            .await
            .unwrap()
            .is_none());

        store.create_analysis_result(empty_result(a.id)).await.unwrap();
        let updated = store
            .update_resolution_status(a.id, ResolutionStatus::InProgress)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.resolution_status, ResolutionStatus::InProgress);
    }

    #[tokio::test]
    async fn test_activities_newest_first_and_filtered() {
        let store = InMemoryRecordStore::new();
        for (artifact_id, kind) in [
            (Some(1), ActivityKind::Upload),
            (Some(2), ActivityKind::Upload),
            (Some(1), ActivityKind::Processing),
        ] {
            store
                .create_activity(NewActivity {
                    artifact_id,
                    kind,
                    description: "x".into(),
                    status: ActivityStatus::Success,
                })
                .await
                .unwrap();
        }
        let for_one = store.list_activities(Some(1), 10).await.unwrap();
        assert_eq!(for_one.len(), 2);
        assert_eq!(for_one[0].kind, ActivityKind::Processing);
        assert_eq!(store.list_activities(None, 1).await.unwrap().len(), 1);
    }
}
