//! Capabilities the reconciler consumes from its collaborators.
//!
//! The GitLab adapter and the `git` subprocess adapter implement these in
//! their own crates; [`crate::memory`] provides in-process versions.

use crate::error::Result;
use crate::types::{Comment, PipelineRun, ReviewRequest, ReviewRequestId};
use async_trait::async_trait;
use std::path::Path;

/// Lists what should be deployed.
#[async_trait]
pub trait DesiredStateSource: Send + Sync {
    /// Open merge requests of `project_id` that target `target_branch`.
    ///
    /// Transport failures are reported as [`crate::ReconcileError::Remote`].
    async fn list_open_review_requests(
        &self,
        project_id: &str,
        target_branch: &str,
    ) -> Result<Vec<ReviewRequest>>;
}

#[async_trait]
pub trait PipelineStatusSource: Send + Sync {
    /// Newest pipeline run of a merge request, or `None` if none ran.
    async fn latest_pipeline(&self, request: &ReviewRequest) -> Result<Option<PipelineRun>>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn list(&self, id: ReviewRequestId) -> Result<Vec<Comment>>;

    async fn create(&self, id: ReviewRequestId, body: &str) -> Result<()>;

    async fn update(&self, id: ReviewRequestId, comment_id: u64, body: &str) -> Result<()>;
}

/// The local clone of the config repository.
///
/// Every method fails with [`crate::ReconcileError::Vcs`] carrying the
/// captured output of the failed operation.
#[async_trait]
pub trait WorkingCopy: Send + Sync {
    /// Root directory of the checkout.
    fn root(&self) -> &Path;

    /// Bring the checkout to the remote branch head, discarding local state.
    async fn pull(&mut self) -> Result<()>;

    async fn stage_all(&mut self) -> Result<()>;

    async fn commit(&mut self, message: &str) -> Result<()>;

    async fn push(&mut self) -> Result<()>;
}
