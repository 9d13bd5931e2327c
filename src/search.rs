//! Semantic search over indexed log chunks.
//!
//! The query is embedded with the configured [`ServiceClient`], the vector
//! store returns the nearest chunks, and the reasoning service summarizes
//! them. Each call is bounded by its own timeout. A failed summary only
//! drops the summary; a failed or timed-out embed or search is returned to
//! the caller.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::time::Duration;

use telecom_harness_core::service::{ServiceClient, ServiceError};
use telecom_harness_core::vector::{VectorMatch, VectorStore};

use crate::config::Config;
use crate::db;
use crate::services;

/// Per-call limits for [`search_logs`].
#[derive(Debug, Clone, Copy)]
pub struct SearchTimeouts {
    pub embed: Duration,
    pub search: Duration,
    pub summarize: Duration,
}

impl SearchTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            embed: Duration::from_secs(config.services.embed_timeout_secs),
            search: Duration::from_secs(config.vector_store.search_timeout_secs),
            summarize: Duration::from_secs(config.services.completion_timeout_secs),
        }
    }

    pub fn uniform(limit: Duration) -> Self {
        Self {
            embed: limit,
            search: limit,
            summarize: limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub matches: Vec<VectorMatch>,
    pub summary: Option<String>,
}

pub async fn search_logs(
    services: &dyn ServiceClient,
    vectors: &dyn VectorStore,
    query: &str,
    top_k: usize,
    timeouts: SearchTimeouts,
) -> Result<SearchResponse> {
    let vector = tokio::time::timeout(timeouts.embed, services.embed(query))
        .await
        .map_err(|_| ServiceError::Timeout(timeouts.embed))
        .and_then(|r| r)
        .context("Failed to embed query")?;

    let matches = match tokio::time::timeout(timeouts.search, vectors.search(&vector, top_k)).await
    {
        Ok(result) => result.context("Vector search failed")?,
        Err(_) => bail!("Vector search timed out after {:?}", timeouts.search),
    };

    let summary = if matches.is_empty() {
        None
    } else {
        let contexts: Vec<String> = matches.iter().map(|m| m.text.clone()).collect();
        match tokio::time::timeout(timeouts.summarize, services.summarize(query, &contexts)).await
        {
            Ok(Ok(summary)) => Some(summary),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Search summary failed");
                None
            }
            Err(_) => {
                tracing::warn!(timeout = ?timeouts.summarize, "Search summary timed out");
                None
            }
        }
    };

    Ok(SearchResponse {
        query: query.to_string(),
        matches,
        summary,
    })
}

/// CLI entry point.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let pool = db::connect(config).await?;
    let client = services::create_service_client(config)?;
    let vectors = services::create_vector_store(config, &pool)?;

    let response = search_logs(
        client.as_ref(),
        vectors.as_ref(),
        query,
        limit.unwrap_or(config.vector_store.top_k),
        SearchTimeouts::from_config(config),
    )
    .await?;

    if response.matches.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, m) in response.matches.iter().enumerate() {
        println!("{}. [{:.2}] artifact {}", i + 1, m.score, m.artifact_id);
        println!("    excerpt: \"{}\"", m.text.replace('\n', " ").trim());
        println!();
    }
    if let Some(summary) = &response.summary {
        println!("summary: {}", summary);
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use telecom_harness_core::models::LogAnalysis;
    use telecom_harness_core::service::{OfflineServiceClient, ServiceMode};
    use telecom_harness_core::vector::memory::InMemoryVectorStore;
    use telecom_harness_core::vector::VectorItem;

    struct NoSummary(OfflineServiceClient);

    #[async_trait]
    impl ServiceClient for NoSummary {
        fn mode(&self) -> ServiceMode {
            ServiceMode::Live
        }
        fn dims(&self) -> usize {
            self.0.dims()
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
            self.0.embed(text).await
        }
        async fn analyze(&self, text: &str) -> Result<LogAnalysis, ServiceError> {
            self.0.analyze(text).await
        }
        async fn summarize(&self, _q: &str, _c: &[String]) -> Result<String, ServiceError> {
            Err(ServiceError::Unavailable("completion server down".into()))
        }
    }

    async fn seeded(client: &dyn ServiceClient) -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        let mut items = Vec::new();
        for text in ["SCTP association to MME lost", "handover to cell 7 completed"] {
            items.push(VectorItem {
                text: text.to_string(),
                vector: client.embed(text).await.unwrap(),
            });
        }
        store.upsert(1, &items).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_exact_text_ranks_first_with_summary() {
        let client = OfflineServiceClient::new(32);
        let store = seeded(&client).await;
        let response = search_logs(
            &client,
            &store,
            "SCTP association to MME lost",
            2,
            SearchTimeouts::uniform(Duration::from_secs(1)),
        )
        .await
        .unwrap();
        assert_eq!(response.matches[0].text, "SCTP association to MME lost");
        assert!((response.matches[0].score - 1.0).abs() < 1e-5);
        assert!(response.summary.is_some());
    }

    #[tokio::test]
    async fn test_summary_failure_degrades_to_none() {
        let client = NoSummary(OfflineServiceClient::new(32));
        let store = seeded(&client).await;
        let response = search_logs(
            &client,
            &store,
            "handover",
            5,
            SearchTimeouts::uniform(Duration::from_secs(1)),
        )
            .await
            .unwrap();
        assert_eq!(response.matches.len(), 2);
        assert!(response.summary.is_none());
    }

    #[tokio::test]
    async fn test_search_failure_is_an_error() {
        let client = OfflineServiceClient::new(32);
        let err = search_logs(
            &client,
            &services::DisabledVectorStore,
            "x",
            5,
            SearchTimeouts::uniform(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("Vector search failed"));
    }

    /// Vector store whose `search` never answers.
    struct HangingSearch;

    #[async_trait]
    impl VectorStore for HangingSearch {
        async fn upsert(&self, _id: i64, _items: &[VectorItem]) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn search(&self, _v: &[f32], _k: usize) -> anyhow::Result<Vec<VectorMatch>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_hanging_vector_search_times_out() {
        let client = OfflineServiceClient::new(32);
        let timeouts = SearchTimeouts {
            search: Duration::from_millis(50),
            ..SearchTimeouts::uniform(Duration::from_secs(1))
        };
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            search_logs(&client, &HangingSearch, "SCTP association lost", 5, timeouts),
        )
        .await
        .expect("search_logs did not honor its search timeout");
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("timed out"));
    }

    #[test]
    fn test_timeouts_from_config() {
        let config: Config = toml::from_str(
            "[db]\npath = \"x\"\n[services]\nembed_timeout_secs = 3\ncompletion_timeout_secs = 40\n[vector_store]\nsearch_timeout_secs = 7\n",
        )
        .unwrap();
        let timeouts = SearchTimeouts::from_config(&config);
        assert_eq!(timeouts.embed, Duration::from_secs(3));
        assert_eq!(timeouts.search, Duration::from_secs(7));
        assert_eq!(timeouts.summarize, Duration::from_secs(40));
    }
}
