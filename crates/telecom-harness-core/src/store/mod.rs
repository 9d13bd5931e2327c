//! Record storage abstraction.
//!
//! The [`RecordStore`] trait covers every persistence operation the
//! analysis pipeline needs: artifacts and their processing status,
//! analysis results, embedding records, and the activity audit trail.
//! Backends must be `Send + Sync` so a single store can be shared across
//! concurrent pipeline runs.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Activity, AnalysisResult, Artifact, EmbeddingRecord, NewActivity, NewAnalysisResult,
    NewArtifact, NewEmbeddingRecord, ProcessingStatus, ResolutionStatus,
};

/// Abstract storage backend for artifacts and everything derived from them.
///
/// Identity assignment is the backend's job: artifact ids are unique and
/// never decrease under concurrent creation.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_artifact`](RecordStore::create_artifact) | Persist a new artifact in `pending` |
/// | [`get_artifact`](RecordStore::get_artifact) | Look up an artifact by id |
/// | [`list_artifacts`](RecordStore::list_artifacts) | Most recent artifacts first |
/// | [`update_status`](RecordStore::update_status) | Set an artifact's processing status |
/// | [`create_analysis_result`](RecordStore::create_analysis_result) | Store the single result for an artifact |
/// | [`get_analysis_result_by_artifact`](RecordStore::get_analysis_result_by_artifact) | Fetch that result |
/// | [`update_resolution_status`](RecordStore::update_resolution_status) | Mark a result pending/in progress/resolved |
/// | [`create_embedding_record`](RecordStore::create_embedding_record) | Append a chunk's embedding record |
/// | [`list_embedding_records`](RecordStore::list_embedding_records) | Records for one artifact, by chunk index |
/// | [`create_activity`](RecordStore::create_activity) | Append an audit entry |
/// | [`list_activities`](RecordStore::list_activities) | Most recent audit entries first |
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_artifact(&self, artifact: NewArtifact) -> Result<Artifact>;

    async fn get_artifact(&self, id: i64) -> Result<Option<Artifact>>;

    async fn list_artifacts(&self, limit: usize) -> Result<Vec<Artifact>>;

    /// Returns `None` when no artifact has this id.
    async fn update_status(&self, id: i64, status: ProcessingStatus) -> Result<Option<Artifact>>;

    /// Fails if the artifact already has a result.
    async fn create_analysis_result(&self, result: NewAnalysisResult) -> Result<AnalysisResult>;

    async fn get_analysis_result_by_artifact(
        &self,
        artifact_id: i64,
    ) -> Result<Option<AnalysisResult>>;

    /// Returns `None` when the artifact has no result.
    async fn update_resolution_status(
        &self,
        artifact_id: i64,
        status: ResolutionStatus,
    ) -> Result<Option<AnalysisResult>>;

    async fn create_embedding_record(&self, record: NewEmbeddingRecord)
        -> Result<EmbeddingRecord>;

    async fn list_embedding_records(&self, artifact_id: i64) -> Result<Vec<EmbeddingRecord>>;

    async fn create_activity(&self, activity: NewActivity) -> Result<Activity>;

    /// Newest first, optionally restricted to one artifact.
    async fn list_activities(&self, artifact_id: Option<i64>, limit: usize)
        -> Result<Vec<Activity>>;
}
