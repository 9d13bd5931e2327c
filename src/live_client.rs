//! HTTP client for OpenAI-compatible model servers.
//!
//! [`LiveServiceClient`] implements [`ServiceClient`] against any server that
//! speaks the OpenAI wire format (llama.cpp server, vLLM, LocalAI, ...):
//!
//! - `POST {base_url}/embeddings` for [`embed`](ServiceClient::embed)
//! - `POST {base_url}/chat/completions` for
//!   [`analyze`](ServiceClient::analyze) and
//!   [`summarize`](ServiceClient::summarize)
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! `services.max_retries` defaults to 0: the pipeline prefers a prompt
//! degraded result over waiting on a struggling server.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use telecom_harness_core::logparse::parse_line;
use telecom_harness_core::models::{
    Issue, IssueStatus, LogAnalysis, Recommendation, Severity,
};
use telecom_harness_core::service::{ServiceClient, ServiceError, ServiceMode};

use crate::config::ServicesConfig;

/// Longest text sent to the completion endpoint, in characters.
const MAX_PROMPT_CHARS: usize = 12_000;

const ANALYZE_PROMPT: &str = "You are a telecom network operations expert. Analyze the log or \
capture summary below. Report each finding on its own line, prefixed with `critical:`, \
`error:` or `warning:`. Report each remediation on its own line prefixed with \
`recommendation:`. End with one line prefixed with `summary:`.";

const SUMMARIZE_PROMPT: &str = "You answer questions about telecom network logs using only the \
log excerpts provided. Be concise.";

pub struct LiveServiceClient {
    http: reqwest::Client,
    base_url: String,
    embedding_model: String,
    completion_model: String,
    dims: usize,
    max_retries: u32,
    timeout: Duration,
    api_key: Option<String>,
}

impl LiveServiceClient {
    /// # Errors
    ///
    /// Fails if `api_key_env` names an unset variable or the HTTP client
    /// cannot be built.
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => match std::env::var(var) {
                Ok(key) => Some(key),
                Err(_) => bail!("{} environment variable not set", var),
            },
            None => None,
        };

        let timeout = Duration::from_secs(
            config
                .embed_timeout_secs
                .max(config.completion_timeout_secs),
        );
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
            completion_model: config.completion_model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
            timeout,
            api_key,
        })
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.http.post(&url).json(body);
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json()
                            .await
                            .map_err(|e| ServiceError::InvalidResponse(e.to_string()));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = ServiceError::Unavailable(format!(
                        "{} returned {}: {}",
                        url, status, body_text
                    ));
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(ServiceError::Timeout(self.timeout));
                }
                Err(e) => {
                    last_err = Some(ServiceError::Unavailable(e.to_string()));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ServiceError::Unavailable(format!("{} failed after retries", url))))
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, ServiceError> {
        let body = serde_json::json!({
            "model": self.completion_model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 0.2,
        });
        let json = self.post_json("/chat/completions", &body).await?;
        parse_chat_content(&json)
    }
}

#[async_trait]
impl ServiceClient for LiveServiceClient {
    fn mode(&self) -> ServiceMode {
        ServiceMode::Live
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": [text],
        });
        let json = self.post_json("/embeddings", &body).await?;
        let vector = parse_embedding_response(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::InvalidResponse("empty embedding response".into()))?;
        if vector.len() != self.dims {
            return Err(ServiceError::InvalidResponse(format!(
                "expected {} dimensions, got {}",
                self.dims,
                vector.len()
            )));
        }
        Ok(vector)
    }

    async fn analyze(&self, text: &str) -> Result<LogAnalysis, ServiceError> {
        let prompt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
        let content = self.chat(ANALYZE_PROMPT, &prompt).await?;
        Ok(parse_analysis_text(&content))
    }

    async fn summarize(&self, query: &str, contexts: &[String]) -> Result<String, ServiceError> {
        let joined: String = contexts
            .join("\n---\n")
            .chars()
            .take(MAX_PROMPT_CHARS)
            .collect();
        let user = format!("Question: {}\n\nLog excerpts:\n{}", query, joined);
        self.chat(SUMMARIZE_PROMPT, &user).await
    }
}

/// Extract `data[].embedding` arrays in order.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, ServiceError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ServiceError::InvalidResponse("missing data array".into()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| ServiceError::InvalidResponse("missing embedding".into()))?;
        embeddings.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(embeddings)
}

/// Extract `choices[0].message.content`.
fn parse_chat_content(json: &serde_json::Value) -> Result<String, ServiceError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::InvalidResponse("missing choices[0].message.content".into()))
}

/// Strip a case-insensitive `prefix` from `line`.
fn strip_tag<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| line[prefix.len()..].trim())
}

/// Turn tagged completion lines into a [`LogAnalysis`].
///
/// `critical:` and `error:` lines become high issues, `warning:` lines
/// medium issues, `recommendation:` lines recommendations. Untagged lines
/// are ignored except as a fallback summary.
fn parse_analysis_text(content: &str) -> LogAnalysis {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    let mut summary = None;

    for raw in content.lines() {
        let line = raw
            .trim()
            .trim_start_matches(['-', '*'])
            .trim_start();

        let tagged = strip_tag(line, "critical:")
            .or_else(|| strip_tag(line, "error:"))
            .map(|rest| (rest, Severity::High))
            .or_else(|| strip_tag(line, "warning:").map(|rest| (rest, Severity::Medium)));

        if let Some((rest, severity)) = tagged {
            if rest.is_empty() {
                continue;
            }
            issues.push(Issue {
                title: rest.chars().take(80).collect(),
                description: rest.to_string(),
                severity,
                first_seen: parse_line(rest).timestamp,
                status: IssueStatus::Pending,
            });
        } else if let Some(rest) = strip_tag(line, "recommendation:") {
            recommendations.push(Recommendation {
                title: rest.chars().take(80).collect(),
                description: rest.to_string(),
                category: "general".to_string(),
                auto_resolved: false,
                doc_link: None,
            });
        } else if let Some(rest) = strip_tag(line, "summary:") {
            summary = Some(rest.to_string());
        }
    }

    let summary = summary.unwrap_or_else(|| content.trim().chars().take(500).collect());
    LogAnalysis::from_findings(issues, recommendations, summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embedding_response() {
        let json = serde_json::json!({
            "data": [ { "embedding": [0.5, -0.25] } ]
        });
        assert_eq!(parse_embedding_response(&json).unwrap(), vec![vec![0.5, -0.25]]);
        assert!(parse_embedding_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_parse_chat_content() {
        let json = serde_json::json!({
            "choices": [ { "message": { "role": "assistant", "content": "hi" } } ]
        });
        assert_eq!(parse_chat_content(&json).unwrap(), "hi");
        assert!(matches!(
            parse_chat_content(&serde_json::json!({ "choices": [] })),
            Err(ServiceError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_analysis_text() {
        let content = "Findings:\n\
                       - ERROR: 2024-03-01T10:00:05Z SCTP association to MME lost\n\
                       - Warning: handover success rate below target\n\
                       Critical: HLR unreachable\n\
                       Recommendation: restart the SCTP endpoint on the eNodeB\n\
                       Summary: transport failure toward the core network";
        let analysis = parse_analysis_text(content);
        assert_eq!(analysis.issues.len(), 3);
        assert_eq!(analysis.issues[0].severity, Severity::High);
        assert_eq!(
            analysis.issues[0].first_seen.as_deref(),
            Some("2024-03-01T10:00:05Z")
        );
        assert_eq!(analysis.issues[1].severity, Severity::Medium);
        assert_eq!(analysis.recommendations.len(), 1);
        assert_eq!(analysis.summary, "transport failure toward the core network");
        assert_eq!(analysis.severity, Severity::High);
    }

    #[test]
    fn test_untagged_content_becomes_summary() {
        let analysis = parse_analysis_text("All links nominal.");
        assert!(analysis.issues.is_empty());
        assert_eq!(analysis.severity, Severity::Low);
        assert_eq!(analysis.summary, "All links nominal.");
    }

    #[test]
    fn test_strip_tag_handles_multibyte_prefix_boundary() {
        assert_eq!(strip_tag("é", "error:"), None);
        assert_eq!(strip_tag("ERROR: x", "error:"), Some("x"));
    }
}
