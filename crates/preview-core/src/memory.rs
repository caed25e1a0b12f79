//! In-process collaborators.
//!
//! `InMemoryRemote` stands in for the hosting service and `LocalWorkingCopy`
//! for a git checkout. Both are used by the test suites and for dry runs
//! against a plain directory.

use crate::error::{ReconcileError, Result};
use crate::source::{CommentStore, DesiredStateSource, PipelineStatusSource, WorkingCopy};
use crate::types::{Comment, PipelineRun, ReviewRequest, ReviewRequestId};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// InMemoryRemote
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RemoteState {
    requests: Vec<ReviewRequest>,
    pipelines: BTreeMap<ReviewRequestId, PipelineRun>,
    comments: BTreeMap<ReviewRequestId, Vec<Comment>>,
    next_comment_id: u64,
    unavailable: bool,
    failing_comments: HashSet<ReviewRequestId>,
    user: Option<String>,
}

/// Hosting service double holding merge requests, pipelines and notes.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_requests(&self, requests: Vec<ReviewRequest>) {
        lock(&self.state).requests = requests;
    }

    pub fn set_pipeline(&self, id: ReviewRequestId, run: Option<PipelineRun>) {
        let mut state = lock(&self.state);
        match run {
            Some(run) => state.pipelines.insert(id, run),
            None => state.pipelines.remove(&id),
        };
    }

    /// Make merge request listing fail as if the API were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    /// Make every comment operation on `id` fail.
    pub fn fail_comments_for(&self, id: ReviewRequestId) {
        lock(&self.state).failing_comments.insert(id);
    }

    /// Author recorded on comments created through [`CommentStore::create`].
    pub fn set_user(&self, username: &str) {
        lock(&self.state).user = Some(username.to_string());
    }

    /// Add a comment written by someone else.
    pub fn add_comment(&self, id: ReviewRequestId, author: &str, body: &str) {
        let mut state = lock(&self.state);
        state.next_comment_id += 1;
        let comment = Comment {
            id: state.next_comment_id,
            body: body.to_string(),
            author: Some(author.to_string()),
        };
        state.comments.entry(id).or_default().push(comment);
    }

    pub fn comments(&self, id: ReviewRequestId) -> Vec<Comment> {
        lock(&self.state)
            .comments
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    fn check_comments(state: &RemoteState, id: ReviewRequestId) -> Result<()> {
        if state.failing_comments.contains(&id) {
            return Err(ReconcileError::Remote(format!(
                "notes endpoint failed for merge request {id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DesiredStateSource for InMemoryRemote {
    async fn list_open_review_requests(
        &self,
        _project_id: &str,
        _target_branch: &str,
    ) -> Result<Vec<ReviewRequest>> {
        let state = lock(&self.state);
        if state.unavailable {
            return Err(ReconcileError::Remote("service unavailable".into()));
        }
        Ok(state.requests.clone())
    }
}

#[async_trait]
impl PipelineStatusSource for InMemoryRemote {
    async fn latest_pipeline(&self, request: &ReviewRequest) -> Result<Option<PipelineRun>> {
        Ok(lock(&self.state).pipelines.get(&request.id).cloned())
    }
}

#[async_trait]
impl CommentStore for InMemoryRemote {
    async fn list(&self, id: ReviewRequestId) -> Result<Vec<Comment>> {
        let state = lock(&self.state);
        Self::check_comments(&state, id)?;
        Ok(state.comments.get(&id).cloned().unwrap_or_default())
    }

    async fn create(&self, id: ReviewRequestId, body: &str) -> Result<()> {
        let mut state = lock(&self.state);
        Self::check_comments(&state, id)?;
        state.next_comment_id += 1;
        let comment = Comment {
            id: state.next_comment_id,
            body: body.to_string(),
            author: state.user.clone(),
        };
        state.comments.entry(id).or_default().push(comment);
        Ok(())
    }

    async fn update(&self, id: ReviewRequestId, comment_id: u64, body: &str) -> Result<()> {
        let mut state = lock(&self.state);
        Self::check_comments(&state, id)?;
        let comment = state
            .comments
            .get_mut(&id)
            .and_then(|list| list.iter_mut().find(|c| c.id == comment_id))
            .ok_or_else(|| ReconcileError::Remote(format!("note {comment_id} not found")))?;
        comment.body = body.to_string();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LocalWorkingCopy
// ---------------------------------------------------------------------------

/// A working copy over a plain directory that records the git operations it
/// was asked to perform instead of running them. Clones share the log.
#[derive(Debug, Clone)]
pub struct LocalWorkingCopy {
    root: PathBuf,
    log: Arc<Mutex<Vec<String>>>,
    fail_push: bool,
}

impl LocalWorkingCopy {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            log: Arc::default(),
            fail_push: false,
        }
    }

    /// Make every `push` fail with a rejected-push error.
    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    /// Operations performed so far, e.g. `["pull", "add", "commit: msg", "push"]`.
    pub fn log(&self) -> Vec<String> {
        lock(&self.log).clone()
    }

    pub fn commits(&self) -> Vec<String> {
        lock(&self.log)
            .iter()
            .filter_map(|op| op.strip_prefix("commit: "))
            .map(str::to_string)
            .collect()
    }

    fn record(&self, op: impl Into<String>) {
        lock(&self.log).push(op.into());
    }
}

#[async_trait]
impl WorkingCopy for LocalWorkingCopy {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn pull(&mut self) -> Result<()> {
        self.record("pull");
        Ok(())
    }

    async fn stage_all(&mut self) -> Result<()> {
        self.record("add");
        Ok(())
    }

    async fn commit(&mut self, message: &str) -> Result<()> {
        self.record(format!("commit: {message}"));
        Ok(())
    }

    async fn push(&mut self) -> Result<()> {
        if self.fail_push {
            return Err(ReconcileError::vcs(
                "push",
                "",
                "! [rejected] main -> main (fetch first)",
            ));
        }
        self.record("push");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::request;

    #[tokio::test]
    async fn unavailable_remote_fails_listing() {
        let remote = InMemoryRemote::new();
        remote.set_requests(vec![request(1, 10)]);
        assert_eq!(
            remote.list_open_review_requests("42", "main").await.unwrap().len(),
            1
        );

        remote.set_unavailable(true);
        let err = remote.list_open_review_requests("42", "main").await.unwrap_err();
        assert!(matches!(err, ReconcileError::Remote(_)));
    }

    #[tokio::test]
    async fn local_working_copy_records_operations() {
        let mut wc = LocalWorkingCopy::new("/tmp/tree");
        wc.pull().await.unwrap();
        wc.stage_all().await.unwrap();
        wc.commit("spawn").await.unwrap();
        wc.push().await.unwrap();
        assert_eq!(wc.log(), ["pull", "add", "commit: spawn", "push"]);
        assert_eq!(wc.commits(), vec!["spawn"]);
    }
}
