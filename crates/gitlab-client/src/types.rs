//! Wire types for the subset of the GitLab v4 REST API the controller uses.
//!
//! Only the fields the controller reads are declared; serde ignores the rest.

use chrono::{DateTime, Utc};
use preview_core::types::{Comment, CommitRef, PipelineRun, PipelineStatus};
use serde::{Deserialize, Serialize};

// ─── Merge requests ───────────────────────────────────────────────────────

/// `GET /projects/:id/merge_requests`
#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequest {
    /// Instance-wide id.
    pub id: u64,
    /// Project-scoped id used in URLs and every per-MR endpoint.
    pub iid: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source_branch: String,
    #[serde(default)]
    pub target_branch: String,
    /// Head commit of the source branch. `null` while GitLab is still
    /// computing the diff of a brand new merge request.
    pub sha: Option<String>,
    pub web_url: Option<String>,
}

// ─── Commits ──────────────────────────────────────────────────────────────

/// `GET /projects/:id/repository/commits/:sha`
#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub id: String,
    pub committed_date: DateTime<Utc>,
}

impl From<Commit> for CommitRef {
    fn from(c: Commit) -> Self {
        CommitRef {
            sha: c.id,
            timestamp: c.committed_date,
        }
    }
}

// ─── Pipelines ────────────────────────────────────────────────────────────

/// `GET /projects/:id/merge_requests/:iid/pipelines`
#[derive(Debug, Clone, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    pub sha: String,
    pub status: PipelineStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Pipeline> for PipelineRun {
    fn from(p: Pipeline) -> Self {
        PipelineRun {
            id: p.id,
            status: p.status,
            sha: p.sha,
            created_at: p.created_at,
            commit: None,
        }
    }
}

// ─── Notes ────────────────────────────────────────────────────────────────

/// `GET /projects/:id/merge_requests/:iid/notes`
#[derive(Debug, Clone, Deserialize)]
pub struct Note {
    pub id: u64,
    pub body: String,
    /// System notes ("added 1 commit", "approved") are never ours.
    #[serde(default)]
    pub system: bool,
    pub author: Option<User>,
}

impl From<Note> for Comment {
    fn from(n: Note) -> Self {
        Comment {
            id: n.id,
            body: n.body,
            author: n.author.map(|a| a.username),
        }
    }
}

// ─── Users ────────────────────────────────────────────────────────────────

/// `GET /user`, and the `author` of a note.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: String,
}

/// Payload of note create and update calls.
#[derive(Debug, Serialize)]
pub struct NoteBody<'a> {
    pub body: &'a str,
}
