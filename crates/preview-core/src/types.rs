use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Merge request IID, stable across pushes to the same merge request.
pub type ReviewRequestId = u64;

// ---------------------------------------------------------------------------
// CommitRef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ReviewRequest
// ---------------------------------------------------------------------------

/// One open merge request as seen by the desired-state source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub id: ReviewRequestId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    pub latest_commit: CommitRef,
}

// ---------------------------------------------------------------------------
// PipelineStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Created,
    WaitingForResource,
    Preparing,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    Scheduled,
    #[serde(other)]
    Unknown,
}

impl PipelineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStatus::Created => "created",
            PipelineStatus::WaitingForResource => "waiting_for_resource",
            PipelineStatus::Preparing => "preparing",
            PipelineStatus::Pending => "pending",
            PipelineStatus::Running => "running",
            PipelineStatus::Success => "success",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Canceled => "canceled",
            PipelineStatus::Skipped => "skipped",
            PipelineStatus::Manual => "manual",
            PipelineStatus::Scheduled => "scheduled",
            PipelineStatus::Unknown => "unknown",
        }
    }

    /// Queued or executing: the build for this commit is not settled yet.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            PipelineStatus::Created
                | PipelineStatus::WaitingForResource
                | PipelineStatus::Preparing
                | PipelineStatus::Pending
                | PipelineStatus::Running
                | PipelineStatus::Scheduled
        )
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: u64,
    pub status: PipelineStatus,
    pub sha: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Source commit with its timestamp, when the source resolved it.
    #[serde(default)]
    pub commit: Option<CommitRef>,
}

/// Pick the newest run from a pipeline list.
///
/// The remote list is documented as newest-first but that ordering is not
/// guaranteed, so runs carrying a creation timestamp are sorted descending.
/// The sort is stable: runs without timestamps keep their remote order
/// relative to each other and sink behind timestamped ones.
pub fn latest_run(mut runs: Vec<PipelineRun>) -> Option<PipelineRun> {
    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    runs.into_iter().next()
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    /// Username of the author, when the store reports one.
    #[serde(default)]
    pub author: Option<String>,
}

// ---------------------------------------------------------------------------
// EnvironmentRecord
// ---------------------------------------------------------------------------

/// A materialized overlay directory in the config tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub id: ReviewRequestId,
    pub overlay_path: PathBuf,
    /// `None` while the values file still carries the tag placeholder.
    pub image_tag: Option<String>,
}
