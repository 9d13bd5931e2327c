//! The analysis pipeline state machine.
//!
//! One run drives a single artifact from `pending` to a terminal state:
//!
//! ```text
//! pending ──▶ processing ──▶ completed
//!                  │      └─▶ completed_without_vectors
//!                  └────────▶ error
//! ```
//!
//! Stages, in order:
//!
//! 1. **Analysis** (fatal). Logs go to the reasoning service as-is; captures
//!    run through the [`CaptureAnalyzer`] first and the rendered summary is
//!    analyzed. A failure or timeout here moves the artifact to `error` and
//!    no [`AnalysisResult`] is stored.
//! 2. **Embedding** (logs only, best effort). The log is segmented and every
//!    chunk embedded concurrently. A failed chunk is recorded with an empty
//!    vector and `success = false`.
//! 3. **Indexing** (logs only, best effort). Embedded chunks are upserted
//!    in one batch once every embedding attempt has resolved. If that fails
//!    the chunks are recorded under `local-<index>` ids instead.
//!
//! Any degradation in stages 2–3 ends the run in
//! `completed_without_vectors`. A storage failure after the run has
//! started moves the artifact to `error` before the failure is returned.
//! Every status change is checked with
//! [`ProcessingStatus::can_transition_to`] against the stored status and
//! writes an [`Activity`].
//!
//! [`Activity`]: telecom_harness_core::models::Activity

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use thiserror::Error;

use telecom_harness_core::capture::{
    render_summary, AnomalyThresholds, CaptureAnalyzer, PacketRecord,
};
use telecom_harness_core::models::{
    local_vector_id, ActivityKind, ActivityStatus, AnalysisResult, Artifact, ArtifactKind,
    LogAnalysis, NewActivity, NewAnalysisResult, NewArtifact, NewEmbeddingRecord,
    ProcessingStatus, ResolutionStatus, TextChunk,
};
use telecom_harness_core::segment::{segment, DEFAULT_MAX_CHUNK_BYTES};
use telecom_harness_core::service::{ServiceClient, ServiceError};
use telecom_harness_core::store::RecordStore;
use telecom_harness_core::validate::is_valid_log;
use telecom_harness_core::vector::{VectorItem, VectorStore};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The upload failed validation; no artifact was created.
    #[error("input rejected: {0}")]
    InputRejected(String),
    /// The analysis stage failed; the artifact is in `error`.
    #[error("analysis of artifact {artifact_id} failed: {reason}")]
    StageFatal { artifact_id: i64, reason: String },
    #[error("artifact {artifact_id} cannot move from {from} to {to}")]
    InvalidTransition {
        artifact_id: i64,
        from: ProcessingStatus,
        to: ProcessingStatus,
    },
    #[error("artifact {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Decoded artifact content handed to the pipeline.
#[derive(Debug, Clone)]
pub enum Payload {
    Log(String),
    Capture(Vec<PacketRecord>),
}

impl Payload {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Payload::Log(_) => ArtifactKind::Log,
            Payload::Capture(_) => ArtifactKind::Capture,
        }
    }
}

/// A recovered, non-fatal failure observed during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Degradation {
    EmbeddingFailed { failed: usize, total: usize },
    IndexingFailed { reason: String },
    ExtractorFailed { extractor: String, message: String },
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Degradation::EmbeddingFailed { failed, total } => {
                write!(f, "embedding failed for {} of {} chunk(s)", failed, total)
            }
            Degradation::IndexingFailed { reason } => write!(f, "indexing failed: {}", reason),
            Degradation::ExtractorFailed { extractor, message } => {
                write!(f, "{} extractor failed: {}", extractor, message)
            }
        }
    }
}

/// Terminal result of [`AnalysisPipeline::run`].
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub artifact_id: i64,
    pub status: ProcessingStatus,
    pub degradations: Vec<Degradation>,
}

/// Chunking, timeout and concurrency knobs.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_chunk_bytes: usize,
    pub embed_timeout: Duration,
    pub completion_timeout: Duration,
    pub upsert_timeout: Duration,
    /// Chunk embeddings in flight at once per artifact.
    pub embed_concurrency: usize,
    pub anomaly: AnomalyThresholds,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            embed_timeout: Duration::from_secs(10),
            completion_timeout: Duration::from_secs(30),
            upsert_timeout: Duration::from_secs(10),
            embed_concurrency: 4,
            anomaly: AnomalyThresholds::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_chunk_bytes: config.segmenting.max_chunk_bytes,
            embed_timeout: Duration::from_secs(config.services.embed_timeout_secs),
            completion_timeout: Duration::from_secs(config.services.completion_timeout_secs),
            upsert_timeout: Duration::from_secs(config.vector_store.upsert_timeout_secs),
            embed_concurrency: config.pipeline.embed_concurrency.max(1),
            anomaly: config.anomaly.clone(),
        }
    }
}

pub struct AnalysisPipeline {
    store: Arc<dyn RecordStore>,
    services: Arc<dyn ServiceClient>,
    vectors: Arc<dyn VectorStore>,
    analyzer: CaptureAnalyzer,
    settings: PipelineSettings,
}

fn activity(
    artifact_id: i64,
    kind: ActivityKind,
    status: ActivityStatus,
    description: impl Into<String>,
) -> NewActivity {
    NewActivity {
        artifact_id: Some(artifact_id),
        kind,
        description: description.into(),
        status,
    }
}

impl AnalysisPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        services: Arc<dyn ServiceClient>,
        vectors: Arc<dyn VectorStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            services,
            vectors,
            analyzer: CaptureAnalyzer::new(settings.anomaly.clone()),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Validate an upload and create its artifact in `pending`.
    ///
    /// Log payloads must pass [`is_valid_log`]; a rejected upload creates
    /// nothing.
    pub async fn submit(
        &self,
        artifact: NewArtifact,
        payload: &Payload,
    ) -> Result<Artifact, PipelineError> {
        if artifact.kind != payload.kind() {
            return Err(PipelineError::InputRejected(format!(
                "{} declared as {} but content is {}",
                artifact.filename,
                artifact.kind.as_str(),
                payload.kind().as_str()
            )));
        }
        if let Payload::Log(text) = payload {
            if !is_valid_log(text) {
                return Err(PipelineError::InputRejected(format!(
                    "{} is not a recognizable telecom log",
                    artifact.filename
                )));
            }
        }

        let artifact = self.store.create_artifact(artifact).await?;
        self.store
            .create_activity(activity(
                artifact.id,
                ActivityKind::Upload,
                ActivityStatus::Success,
                format!(
                    "Uploaded {} {} ({} bytes)",
                    artifact.kind.as_str(),
                    artifact.filename,
                    artifact.size_bytes
                ),
            ))
            .await?;
        tracing::info!(artifact_id = artifact.id, filename = %artifact.filename, "Artifact created");
        Ok(artifact)
    }

    /// Drive a `pending` artifact to a terminal state.
    ///
    /// # Errors
    ///
    /// [`PipelineError::StageFatal`] when analysis fails,
    /// [`PipelineError::InvalidTransition`] when the artifact is not
    /// `pending`. Any other failure after the run started is returned once
    /// the artifact has been moved to `error`.
    pub async fn run(
        &self,
        artifact_id: i64,
        payload: Payload,
    ) -> Result<PipelineOutcome, PipelineError> {
        let artifact = self
            .store
            .get_artifact(artifact_id)
            .await?
            .ok_or(PipelineError::NotFound(artifact_id))?;

        self.transition(
            artifact_id,
            ProcessingStatus::Processing,
            activity(
                artifact_id,
                ActivityKind::Processing,
                ActivityStatus::Success,
                format!("Processing started for {}", artifact.filename),
            ),
        )
        .await?;

        match self.process(&artifact, payload).await {
            Ok(outcome) => Ok(outcome),
            Err(e @ PipelineError::StageFatal { .. }) => Err(e),
            Err(e) => {
                self.abort(artifact_id, &e).await;
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        artifact: &Artifact,
        payload: Payload,
    ) -> Result<PipelineOutcome, PipelineError> {
        let artifact_id = artifact.id;
        let mut degradations = Vec::new();

        let (input, capture_report) = match &payload {
            Payload::Log(text) => (text.clone(), None),
            Payload::Capture(packets) => {
                let report = self.analyzer.analyze(&artifact.filename, packets);
                for failure in &report.errors {
                    degradations.push(Degradation::ExtractorFailed {
                        extractor: failure.extractor.clone(),
                        message: failure.message.clone(),
                    });
                }
                (render_summary(&report), Some(report))
            }
        };

        let analysis = match self.analyze(&input).await {
            Ok(analysis) => analysis,
            Err(e) => return Err(self.fail(artifact_id, e).await),
        };
        let issue_count = analysis.issues.len();
        let severity = analysis.severity;
        self.store
            .create_analysis_result(NewAnalysisResult {
                artifact_id,
                analysis,
                capture_report,
            })
            .await?;
        self.store
            .create_activity(activity(
                artifact_id,
                ActivityKind::Analysis,
                ActivityStatus::Success,
                format!(
                    "Analysis complete: {} issue(s), severity {}",
                    issue_count, severity
                ),
            ))
            .await?;
        tracing::info!(artifact_id, issues = issue_count, severity = %severity, "Analysis stored");

        if let Payload::Log(text) = &payload {
            self.embed_and_index(artifact_id, text, &mut degradations)
                .await?;
        }

        let vectors_degraded = degradations.iter().any(|d| {
            matches!(
                d,
                Degradation::EmbeddingFailed { .. } | Degradation::IndexingFailed { .. }
            )
        });
        let (status, description, activity_status) = if vectors_degraded {
            (
                ProcessingStatus::CompletedWithoutVectors,
                "Processing completed without vectors",
                ActivityStatus::Warning,
            )
        } else {
            (
                ProcessingStatus::Completed,
                "Processing completed",
                ActivityStatus::Success,
            )
        };
        self.transition(
            artifact_id,
            status,
            activity(artifact_id, ActivityKind::Completed, activity_status, description),
        )
        .await?;

        Ok(PipelineOutcome {
            artifact_id,
            status,
            degradations,
        })
    }

    /// Set the resolution status of an artifact's analysis result.
    pub async fn update_resolution_status(
        &self,
        artifact_id: i64,
        status: ResolutionStatus,
    ) -> Result<AnalysisResult, PipelineError> {
        let result = self
            .store
            .update_resolution_status(artifact_id, status)
            .await?
            .ok_or(PipelineError::NotFound(artifact_id))?;
        self.store
            .create_activity(activity(
                artifact_id,
                ActivityKind::Status,
                ActivityStatus::Success,
                format!("Resolution status set to {}", status.as_str()),
            ))
            .await?;
        tracing::info!(artifact_id, status = status.as_str(), "Resolution status updated");
        Ok(result)
    }

    /// Move an artifact from its stored status to `to`.
    async fn transition(
        &self,
        artifact_id: i64,
        to: ProcessingStatus,
        record: NewActivity,
    ) -> Result<(), PipelineError> {
        let from = self
            .store
            .get_artifact(artifact_id)
            .await?
            .ok_or(PipelineError::NotFound(artifact_id))?
            .processing_status;
        if !from.can_transition_to(to) {
            return Err(PipelineError::InvalidTransition {
                artifact_id,
                from,
                to,
            });
        }
        self.store
            .update_status(artifact_id, to)
            .await?
            .ok_or(PipelineError::NotFound(artifact_id))?;
        self.store.create_activity(record).await?;
        tracing::info!(artifact_id, from = %from, to = %to, "Status changed");
        Ok(())
    }

    async fn analyze(&self, input: &str) -> Result<LogAnalysis, ServiceError> {
        let limit = self.settings.completion_timeout;
        tokio::time::timeout(limit, self.services.analyze(input))
            .await
            .map_err(|_| ServiceError::Timeout(limit))?
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let limit = self.settings.embed_timeout;
        tokio::time::timeout(limit, self.services.embed(text))
            .await
            .map_err(|_| ServiceError::Timeout(limit))?
    }

    async fn fail(&self, artifact_id: i64, error: ServiceError) -> PipelineError {
        let reason = error.to_string();
        tracing::error!(artifact_id, error = %reason, "Analysis failed");
        let record = activity(
            artifact_id,
            ActivityKind::Error,
            ActivityStatus::Failed,
            format!("Analysis failed: {}", reason),
        );
        match self
            .transition(artifact_id, ProcessingStatus::Error, record)
            .await
        {
            Ok(()) => PipelineError::StageFatal {
                artifact_id,
                reason,
            },
            Err(e) => e,
        }
    }

    /// Best-effort move to `error` after a non-analysis failure.
    async fn abort(&self, artifact_id: i64, error: &PipelineError) {
        tracing::error!(artifact_id, error = %error, "Run aborted");
        let record = activity(
            artifact_id,
            ActivityKind::Error,
            ActivityStatus::Failed,
            format!("Processing aborted: {}", error),
        );
        if let Err(e) = self
            .transition(artifact_id, ProcessingStatus::Error, record)
            .await
        {
            tracing::error!(artifact_id, error = %e, "Could not record aborted run");
        }
    }

    async fn embed_and_index(
        &self,
        artifact_id: i64,
        text: &str,
        degradations: &mut Vec<Degradation>,
    ) -> Result<(), PipelineError> {
        let chunks = segment(text, self.settings.max_chunk_bytes);
        let total = chunks.len();

        let calls: Vec<BoxFuture<'_, (&TextChunk, Result<Vec<f32>, ServiceError>)>> = chunks
            .iter()
            .map(|chunk| async move { (chunk, self.embed(&chunk.text).await) }.boxed())
            .collect();
        let mut attempts: Vec<(&TextChunk, Result<Vec<f32>, ServiceError>)> =
            stream::iter(calls)
                .buffer_unordered(self.settings.embed_concurrency.max(1))
                .collect()
                .await;
        attempts.sort_by_key(|(chunk, _)| chunk.index);

        let mut embedded: Vec<(&TextChunk, Vec<f32>)> = Vec::with_capacity(total);
        let mut failed = 0usize;
        let mut last_error = None;
        for (chunk, result) in attempts {
            match result {
                Ok(vector) => embedded.push((chunk, vector)),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(artifact_id, chunk = chunk.index, error = %e, "Chunk embedding failed");
                    self.store
                        .create_embedding_record(NewEmbeddingRecord {
                            artifact_id,
                            chunk_index: chunk.index,
                            text: chunk.text.clone(),
                            vector: Vec::new(),
                            vector_id: String::new(),
                            success: false,
                        })
                        .await?;
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            self.store
                .create_activity(activity(
                    artifact_id,
                    ActivityKind::Error,
                    ActivityStatus::Warning,
                    format!(
                        "Embedding failed for {} of {} chunk(s): {}",
                        failed, total, e
                    ),
                ))
                .await?;
            degradations.push(Degradation::EmbeddingFailed { failed, total });
        }

        if embedded.is_empty() {
            return Ok(());
        }

        let items: Vec<VectorItem> = embedded
            .iter()
            .map(|(chunk, vector)| VectorItem {
                text: chunk.text.clone(),
                vector: vector.clone(),
            })
            .collect();

        let upserted = match tokio::time::timeout(
            self.settings.upsert_timeout,
            self.vectors.upsert(artifact_id, &items),
        )
        .await
        {
            Ok(Ok(ids)) if ids.len() == items.len() => Ok(ids),
            Ok(Ok(ids)) => Err(format!(
                "vector store returned {} ids for {} items",
                ids.len(),
                items.len()
            )),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err(format!(
                "upsert timed out after {:?}",
                self.settings.upsert_timeout
            )),
        };

        let vector_ids = match upserted {
            Ok(ids) => {
                self.store
                    .create_activity(activity(
                        artifact_id,
                        ActivityKind::Indexing,
                        ActivityStatus::Success,
                        format!("Indexed {} chunk(s)", ids.len()),
                    ))
                    .await?;
                tracing::debug!(artifact_id, chunks = ids.len(), "Chunks indexed");
                ids
            }
            Err(reason) => {
                tracing::warn!(artifact_id, error = %reason, "Vector indexing failed; storing chunks locally");
                self.store
                    .create_activity(activity(
                        artifact_id,
                        ActivityKind::Error,
                        ActivityStatus::Warning,
                        format!(
                            "Vector indexing failed ({}); {} chunk(s) stored locally, search is degraded",
                            reason,
                            embedded.len()
                        ),
                    ))
                    .await?;
                degradations.push(Degradation::IndexingFailed { reason });
                embedded
                    .iter()
                    .map(|(chunk, _)| local_vector_id(chunk.index))
                    .collect()
            }
        };

        for ((chunk, vector), vector_id) in embedded.into_iter().zip(vector_ids) {
            self.store
                .create_embedding_record(NewEmbeddingRecord {
                    artifact_id,
                    chunk_index: chunk.index,
                    text: chunk.text.clone(),
                    vector,
                    vector_id,
                    success: true,
                })
                .await?;
        }

        Ok(())
    }
}
