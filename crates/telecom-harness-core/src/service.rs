//! Embedding and reasoning service abstraction.
//!
//! The pipeline talks to models only through [`ServiceClient`]. Which
//! implementation it gets is decided once, at construction: the live HTTP
//! client in the application crate, or the deterministic
//! [`OfflineServiceClient`] defined here. There is no process-wide mock
//! switch; a failing live call fails that call only.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

use crate::embedding::hash_vector;
use crate::logparse::parse_line;
use crate::models::{Issue, IssueStatus, LogAnalysis, Recommendation, Severity};

/// Default embedding dimensionality (all-MiniLM-L6-v2).
pub const DEFAULT_DIMS: usize = 384;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("service call timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid service response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    Offline,
    Live,
}

impl ServiceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceMode::Offline => "offline",
            ServiceMode::Live => "live",
        }
    }
}

/// Narrow contract to the embedding and reasoning models.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    fn mode(&self) -> ServiceMode;

    /// Dimensionality of vectors returned by [`embed`](ServiceClient::embed).
    fn dims(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;

    /// Derive issues, recommendations, a summary and an overall severity.
    async fn analyze(&self, text: &str) -> Result<LogAnalysis, ServiceError>;

    /// Answer `query` from the retrieved `contexts`.
    async fn summarize(&self, query: &str, contexts: &[String]) -> Result<String, ServiceError>;
}

/// Header line [`render_summary`](crate::capture::render_summary) starts with.
const CAPTURE_SUMMARY_HEADER: &str = "PCAP Analysis Summary";

static ANOMALY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^- (.+?) \((low|medium|high)\): (.+)$").expect("static regex")
});

struct KeywordRule {
    keywords: &'static [&'static str],
    title: &'static str,
    description: &'static str,
    severity: Severity,
    category: &'static str,
    recommendation: (&'static str, &'static str),
}

const LOG_RULES: &[KeywordRule] = &[
    KeywordRule {
        keywords: &["error", "failed"],
        title: "Network connectivity error detected",
        description: "Error or failure messages indicate a connectivity or processing fault.",
        severity: Severity::High,
        category: "connectivity",
        recommendation: (
            "Check network connectivity",
            "Verify link state, routing and peer reachability for the affected nodes.",
        ),
    },
    KeywordRule {
        keywords: &["warning"],
        title: "Warning conditions reported",
        description: "Warning messages indicate degraded but operational components.",
        severity: Severity::Medium,
        category: "configuration",
        recommendation: (
            "Review warning conditions",
            "Inspect the reporting components' configuration and thresholds.",
        ),
    },
    KeywordRule {
        keywords: &["timeout", "timed out"],
        title: "Timeout events detected",
        description: "Operations exceeded their deadlines, pointing at congestion or unreachable peers.",
        severity: Severity::High,
        category: "performance",
        recommendation: (
            "Investigate timeout sources",
            "Check latency and load on the paths between the timing-out peers.",
        ),
    },
];

/// Deterministic stand-in for the model services.
///
/// - `embed` hashes the text into a unit vector ([`hash_vector`]).
/// - `analyze` applies keyword rules to logs, and turns the anomaly lines of
///   a capture summary into issues.
/// - `summarize` reports what was retrieved.
#[derive(Debug, Clone)]
pub struct OfflineServiceClient {
    dims: usize,
}

impl OfflineServiceClient {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for OfflineServiceClient {
    fn default() -> Self {
        Self::new(DEFAULT_DIMS)
    }
}

#[async_trait]
impl ServiceClient for OfflineServiceClient {
    fn mode(&self) -> ServiceMode {
        ServiceMode::Offline
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        Ok(hash_vector(text, self.dims))
    }

    async fn analyze(&self, text: &str) -> Result<LogAnalysis, ServiceError> {
        if text.trim_start().starts_with(CAPTURE_SUMMARY_HEADER) {
            Ok(analyze_capture_summary(text))
        } else {
            Ok(analyze_log_text(text))
        }
    }

    async fn summarize(&self, query: &str, contexts: &[String]) -> Result<String, ServiceError> {
        if contexts.is_empty() {
            return Ok(format!("No indexed log excerpts match \"{}\".", query));
        }
        let lead = contexts[0].lines().next().unwrap_or_default().trim();
        Ok(format!(
            "Found {} relevant log excerpt(s) for \"{}\". Closest match: {}",
            contexts.len(),
            query,
            lead
        ))
    }
}

fn recommendation(title: &str, description: &str, category: &str) -> Recommendation {
    Recommendation {
        title: title.to_string(),
        description: description.to_string(),
        category: category.to_string(),
        auto_resolved: false,
        doc_link: None,
    }
}

fn nothing_found(summary: String) -> LogAnalysis {
    let issue = Issue {
        title: "No significant issues detected".to_string(),
        description: "No error, warning or timeout indicators were found.".to_string(),
        severity: Severity::Low,
        first_seen: None,
        status: IssueStatus::Resolved,
    };
    let rec = Recommendation {
        auto_resolved: true,
        ..recommendation(
            "Continue monitoring",
            "Keep collecting logs; no action is required.",
            "monitoring",
        )
    };
    LogAnalysis::from_findings(vec![issue], vec![rec], summary)
}

fn analyze_log_text(text: &str) -> LogAnalysis {
    let line_count = text.lines().filter(|l| !l.trim().is_empty()).count();
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    for rule in LOG_RULES {
        let first = text.lines().find(|line| {
            let lower = line.to_lowercase();
            rule.keywords.iter().any(|k| lower.contains(k))
        });
        let Some(line) = first else { continue };
        issues.push(Issue {
            title: rule.title.to_string(),
            description: rule.description.to_string(),
            severity: rule.severity,
            first_seen: parse_line(line).timestamp,
            status: IssueStatus::Pending,
        });
        recommendations.push(recommendation(
            rule.recommendation.0,
            rule.recommendation.1,
            rule.category,
        ));
    }

    if issues.is_empty() {
        return nothing_found(format!(
            "Analyzed {} log lines; no significant issues found.",
            line_count
        ));
    }

    let summary = format!(
        "Analyzed {} log lines; found {} issue(s): {}.",
        line_count,
        issues.len(),
        issues
            .iter()
            .map(|i| format!("{} ({})", i.title, i.severity))
            .collect::<Vec<_>>()
            .join(", ")
    );
    LogAnalysis::from_findings(issues, recommendations, summary)
}

fn analyze_capture_summary(text: &str) -> LogAnalysis {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    for line in text.lines() {
        let Some(caps) = ANOMALY_LINE.captures(line.trim_end()) else {
            continue;
        };
        let Some(severity) = Severity::parse(&caps[2]) else {
            continue;
        };
        let name = caps[1].to_string();
        issues.push(Issue {
            title: name.clone(),
            description: caps[3].to_string(),
            severity,
            first_seen: None,
            status: IssueStatus::Pending,
        });
        recommendations.push(recommendation(
            &format!("Investigate {}", name),
            "Correlate the flagged traffic with device logs and apply rate limiting or filtering at the edge.",
            "security",
        ));
    }

    if text.contains("\nExtractor Errors:") {
        issues.push(Issue {
            title: "Capture analysis incomplete".to_string(),
            description: "One or more capture extractors failed; parts of the report are empty."
                .to_string(),
            severity: Severity::Medium,
            first_seen: None,
            status: IssueStatus::Pending,
        });
        recommendations.push(recommendation(
            "Re-capture traffic",
            "Check the capture file for corrupt timestamps and capture again if needed.",
            "data_quality",
        ));
    }

    if issues.is_empty() {
        return nothing_found("Capture analysis found no anomalies.".to_string());
    }
    let summary = format!("Capture analysis flagged {} issue(s).", issues.len());
    LogAnalysis::from_findings(issues, recommendations, summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_and_warning_lines() {
        let client = OfflineServiceClient::default();
        let text = "2024-03-01T10:00:00Z INFO [MSC] node up\n\
                    2024-03-01T10:00:05Z ERROR [MSC] link to HLR failed\n\
                    2024-03-01T10:00:09Z WARNING [MSC] signal quality low\n";
        let analysis = client.analyze(text).await.unwrap();
        assert_eq!(analysis.issues.len(), 2);
        assert_eq!(analysis.severity, Severity::High);
        assert_eq!(
            analysis.issues[0].first_seen.as_deref(),
            Some("2024-03-01T10:00:05Z")
        );
        assert_eq!(analysis.issues[1].severity, Severity::Medium);
        assert_eq!(analysis.recommendations.len(), 2);
    }

    #[tokio::test]
    async fn test_clean_log_yields_resolved_low_issue() {
        let client = OfflineServiceClient::default();
        let analysis = client
            .analyze("2024-03-01T10:00:00Z INFO [BTS] carrier ok\n")
            .await
            .unwrap();
        assert_eq!(analysis.issues.len(), 1);
        assert_eq!(analysis.issues[0].status, IssueStatus::Resolved);
        assert_eq!(analysis.severity, Severity::Low);
        assert!(analysis.recommendations[0].auto_resolved);
    }

    #[tokio::test]
    async fn test_capture_summary_anomalies_become_issues() {
        let client = OfflineServiceClient::default();
        let summary = "PCAP Analysis Summary\n=====================\n\
                       File: x.pcap\n\nDetected Anomalies:\n\
                       - SYN Flood (high): 150 SYN packets against 10 SYN-ACK packets (ratio 15.0)\n\
                       - Excessive Fragmentation (low): 120 fragmented IP packets\n";
        let analysis = client.analyze(summary).await.unwrap();
        assert_eq!(analysis.issues.len(), 2);
        assert_eq!(analysis.issues[0].title, "SYN Flood");
        assert_eq!(analysis.severity, Severity::High);
    }

    #[tokio::test]
    async fn test_embed_dims_and_determinism() {
        let client = OfflineServiceClient::new(8);
        let a = client.embed("cell down").await.unwrap();
        assert_eq!(a.len(), 8);
        assert_eq!(a, client.embed("cell down").await.unwrap());
    }

    #[tokio::test]
    async fn test_summarize() {
        let client = OfflineServiceClient::default();
        let s = client
            .summarize("sctp", &["SCTP association lost\nmore".to_string()])
            .await
            .unwrap();
        assert!(s.contains("1 relevant"));
        assert!(s.contains("SCTP association lost"));
    }
}
