//! Core data models used throughout Telecom Harness.
//!
//! These types represent the artifacts, parsed log lines, chunks, analysis
//! results, and audit entries that flow through the analysis pipeline.
//! Every entity is a plain struct with explicit optional fields; the
//! `New*` variants carry the caller-supplied part of a record before the
//! store assigns its identity and timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::CaptureReport;

/// What an uploaded artifact contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Log,
    Capture,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Log => "log",
            ArtifactKind::Capture => "capture",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "log" => Some(ArtifactKind::Log),
            "capture" => Some(ArtifactKind::Capture),
            _ => None,
        }
    }
}

/// Processing state of an artifact.
///
/// ```text
/// pending ─▶ processing ─┬─▶ completed
///                        ├─▶ completed_without_vectors
///                        └─▶ error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    CompletedWithoutVectors,
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::CompletedWithoutVectors => "completed_without_vectors",
            ProcessingStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcessingStatus::Pending),
            "processing" => Some(ProcessingStatus::Processing),
            "completed" => Some(ProcessingStatus::Completed),
            "completed_without_vectors" => Some(ProcessingStatus::CompletedWithoutVectors),
            "error" => Some(ProcessingStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::Completed
                | ProcessingStatus::CompletedWithoutVectors
                | ProcessingStatus::Error
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        matches!(
            (self, next),
            (ProcessingStatus::Pending, ProcessingStatus::Processing)
                | (ProcessingStatus::Processing, ProcessingStatus::Completed)
                | (ProcessingStatus::Processing, ProcessingStatus::CompletedWithoutVectors)
                | (ProcessingStatus::Processing, ProcessingStatus::Error)
        )
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded log file or packet capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: i64,
    pub kind: ArtifactKind,
    pub filename: String,
    /// Where the raw content came from (a path, or `inline`).
    pub content_ref: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
}

/// Caller-supplied part of an [`Artifact`].
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub kind: ArtifactKind,
    pub filename: String,
    pub content_ref: String,
    pub size_bytes: u64,
}

/// Parsed representation of a single log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    /// The original line, unmodified.
    pub text: String,
    pub timestamp: Option<String>,
    pub level: Option<String>,
    pub component: Option<String>,
    pub message: String,
    /// Name of the format pattern that matched, if any.
    pub format: Option<&'static str>,
}

/// A bounded slice of log text: consecutive original lines, terminators kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
}

impl TextChunk {
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }
}

/// Issue / recommendation / overall severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Pending,
    InProgress,
    #[serde(alias = "fixed")]
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    /// Timestamp of the first log line exhibiting the issue, when known.
    pub first_seen: Option<String>,
    pub status: IssueStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    pub category: String,
    pub auto_resolved: bool,
    pub doc_link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Pending,
    InProgress,
    Resolved,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Pending => "pending",
            ResolutionStatus::InProgress => "in_progress",
            ResolutionStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ResolutionStatus::Pending),
            "in_progress" => Some(ResolutionStatus::InProgress),
            "resolved" => Some(ResolutionStatus::Resolved),
            _ => None,
        }
    }
}

/// What the reasoning service returns for a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogAnalysis {
    pub issues: Vec<Issue>,
    pub recommendations: Vec<Recommendation>,
    pub summary: String,
    pub severity: Severity,
}

impl LogAnalysis {
    /// Build an analysis whose overall severity is the highest issue severity.
    pub fn from_findings(
        issues: Vec<Issue>,
        recommendations: Vec<Recommendation>,
        summary: String,
    ) -> Self {
        let severity = overall_severity(&issues);
        Self {
            issues,
            recommendations,
            summary,
            severity,
        }
    }
}

/// Highest severity among `issues`, `Low` when there are none.
pub fn overall_severity(issues: &[Issue]) -> Severity {
    issues
        .iter()
        .map(|i| i.severity)
        .max()
        .unwrap_or(Severity::Low)
}

/// The analysis product for one artifact. At most one exists per artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: i64,
    pub artifact_id: i64,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<Recommendation>,
    pub summary: String,
    pub severity: Severity,
    pub resolution_status: ResolutionStatus,
    /// Present for capture artifacts only.
    pub capture_report: Option<CaptureReport>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnalysisResult {
    pub artifact_id: i64,
    pub analysis: LogAnalysis,
    pub capture_report: Option<CaptureReport>,
}

/// A chunk's vector and where it was indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: i64,
    pub artifact_id: i64,
    pub chunk_index: usize,
    pub text: String,
    /// Empty when the embedding call failed.
    pub vector: Vec<f32>,
    /// Vector-store id, or `local-<index>` when indexing was unavailable.
    pub vector_id: String,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEmbeddingRecord {
    pub artifact_id: i64,
    pub chunk_index: usize,
    pub text: String,
    pub vector: Vec<f32>,
    pub vector_id: String,
    pub success: bool,
}

/// Placeholder vector id used when the vector store rejected a chunk.
pub fn local_vector_id(chunk_index: usize) -> String {
    format!("local-{}", chunk_index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Upload,
    Processing,
    Analysis,
    Indexing,
    Completed,
    Error,
    Status,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Upload => "upload",
            ActivityKind::Processing => "processing",
            ActivityKind::Analysis => "analysis",
            ActivityKind::Indexing => "indexing",
            ActivityKind::Completed => "completed",
            ActivityKind::Error => "error",
            ActivityKind::Status => "status",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(ActivityKind::Upload),
            "processing" => Some(ActivityKind::Processing),
            "analysis" => Some(ActivityKind::Analysis),
            "indexing" => Some(ActivityKind::Indexing),
            "completed" => Some(ActivityKind::Completed),
            "error" => Some(ActivityKind::Error),
            "status" => Some(ActivityKind::Status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Success,
    Warning,
    Failed,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Success => "success",
            ActivityStatus::Warning => "warning",
            ActivityStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(ActivityStatus::Success),
            "warning" => Some(ActivityStatus::Warning),
            "failed" => Some(ActivityStatus::Failed),
            _ => None,
        }
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub artifact_id: Option<i64>,
    pub kind: ActivityKind,
    pub description: String,
    pub status: ActivityStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub artifact_id: Option<i64>,
    pub kind: ActivityKind,
    pub description: String,
    pub status: ActivityStatus,
}
