//! In-memory [`VectorStore`]: brute-force cosine similarity over a `Vec`.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;

use super::{VectorItem, VectorMatch, VectorStore};

struct StoredVector {
    artifact_id: i64,
    text: String,
    vector: Vec<f32>,
}

pub struct InMemoryVectorStore {
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, artifact_id: i64, items: &[VectorItem]) -> Result<Vec<String>> {
        let mut vectors = self
            .vectors
            .write()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            ids.push(format!("mem-{}-{}", artifact_id, vectors.len()));
            vectors.push(StoredVector {
                artifact_id,
                text: item.text.clone(),
                vector: item.vector.clone(),
            });
        }
        Ok(ids)
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let vectors = self
            .vectors
            .read()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        let mut matches: Vec<VectorMatch> = vectors
            .iter()
            .map(|sv| VectorMatch {
                artifact_id: sv.artifact_id,
                text: sv.text.clone(),
                score: cosine_similarity(vector, &sv.vector),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}
