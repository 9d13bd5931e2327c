//! Bounded background execution of pipeline runs.
//!
//! [`PipelineRunner::submit`] creates the artifact synchronously and hands
//! the run to a spawned task. At most `workers` runs execute at once; the
//! rest wait on a semaphore permit. Runs for different artifacts share
//! nothing but the stores.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use telecom_harness_core::models::{Artifact, NewArtifact};

use crate::pipeline::{AnalysisPipeline, Payload, PipelineError, PipelineOutcome};

pub type RunHandle = JoinHandle<Result<PipelineOutcome, PipelineError>>;

#[derive(Clone)]
pub struct PipelineRunner {
    pipeline: Arc<AnalysisPipeline>,
    permits: Arc<Semaphore>,
}

impl PipelineRunner {
    pub fn new(pipeline: Arc<AnalysisPipeline>, workers: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn pipeline(&self) -> &Arc<AnalysisPipeline> {
        &self.pipeline
    }

    /// Create the artifact in `pending` and schedule its run.
    ///
    /// Returns as soon as the artifact exists. Dropping the handle does not
    /// cancel the run; aborting it leaves the artifact in whatever state it
    /// last reached.
    pub async fn submit(
        &self,
        artifact: NewArtifact,
        payload: Payload,
    ) -> Result<(Artifact, RunHandle), PipelineError> {
        let artifact = self.pipeline.submit(artifact, &payload).await?;

        let pipeline = Arc::clone(&self.pipeline);
        let permits = Arc::clone(&self.permits);
        let artifact_id = artifact.id;
        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::Storage(e.into()))?;
            tracing::debug!(artifact_id, "Run started");
            pipeline.run(artifact_id, payload).await
        });

        Ok((artifact, handle))
    }
}
