//! Vector similarity store abstraction.
//!
//! A [`VectorStore`] indexes chunk vectors under their artifact id and
//! answers nearest-neighbour queries ranked by cosine similarity.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// One chunk submitted for indexing.
#[derive(Debug, Clone)]
pub struct VectorItem {
    pub text: String,
    pub vector: Vec<f32>,
}

/// A search hit.
#[derive(Debug, Clone, Serialize)]
pub struct VectorMatch {
    pub artifact_id: i64,
    pub text: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Index `items` for `artifact_id` in one batch.
    ///
    /// Returns one store id per item, in input order.
    async fn upsert(&self, artifact_id: i64, items: &[VectorItem]) -> Result<Vec<String>>;

    /// The `top_k` stored vectors most similar to `vector`, best first.
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>>;
}
