//! Collaborator selection from configuration.
//!
//! The pipeline receives its [`ServiceClient`] and [`VectorStore`] as trait
//! objects chosen once here, from `[services] mode` and
//! `[vector_store] backend`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

use telecom_harness_core::service::{OfflineServiceClient, ServiceClient};
use telecom_harness_core::store::RecordStore;
use telecom_harness_core::vector::memory::InMemoryVectorStore;
use telecom_harness_core::vector::{VectorItem, VectorMatch, VectorStore};

use crate::config::Config;
use crate::db;
use crate::live_client::LiveServiceClient;
use crate::pipeline::{AnalysisPipeline, PipelineSettings};
use crate::runner::PipelineRunner;
use crate::sqlite_store::{SqliteRecordStore, SqliteVectorStore};

/// A vector store that rejects every call.
///
/// Selecting it forces every log artifact down the degraded
/// `completed_without_vectors` path.
pub struct DisabledVectorStore;

#[async_trait]
impl VectorStore for DisabledVectorStore {
    async fn upsert(&self, _artifact_id: i64, _items: &[VectorItem]) -> Result<Vec<String>> {
        bail!("Vector store is disabled")
    }

    async fn search(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<VectorMatch>> {
        bail!("Vector store is disabled")
    }
}

pub fn create_service_client(config: &Config) -> Result<Arc<dyn ServiceClient>> {
    match config.services.mode.as_str() {
        "offline" => Ok(Arc::new(OfflineServiceClient::new(config.services.dims))),
        "live" => Ok(Arc::new(LiveServiceClient::new(&config.services)?)),
        other => bail!("Unknown services mode: {}", other),
    }
}

pub fn create_vector_store(config: &Config, pool: &SqlitePool) -> Result<Arc<dyn VectorStore>> {
    match config.vector_store.backend.as_str() {
        "sqlite" => Ok(Arc::new(SqliteVectorStore::new(pool.clone()))),
        "memory" => Ok(Arc::new(InMemoryVectorStore::new())),
        "disabled" => Ok(Arc::new(DisabledVectorStore)),
        other => bail!("Unknown vector store backend: {}", other),
    }
}

/// Connect to the database and assemble a runner over the configured
/// collaborators. The caller closes the returned pool when done.
pub async fn open_runner(config: &Config) -> Result<(SqlitePool, PipelineRunner)> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(pool.clone()));
    let client = create_service_client(config)?;
    let vectors = create_vector_store(config, &pool)?;
    tracing::debug!(
        mode = client.mode().as_str(),
        backend = %config.vector_store.backend,
        "Pipeline collaborators ready"
    );

    let pipeline = AnalysisPipeline::new(
        store,
        client,
        vectors,
        PipelineSettings::from_config(config),
    );
    let runner = PipelineRunner::new(Arc::new(pipeline), config.pipeline.workers);
    Ok((pool, runner))
}
