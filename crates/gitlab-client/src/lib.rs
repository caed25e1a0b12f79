//! `gitlab-client` — GitLab v4 REST adapter for the preview controller.
//!
//! Implements the remote capabilities of `preview-core` on top of a single
//! `reqwest` client bound to one project:
//!
//! ```text
//! DesiredStateSource    ← GET  /projects/:id/merge_requests?state=opened
//!                         GET  /projects/:id/repository/commits/:sha
//! PipelineStatusSource  ← GET  /projects/:id/merge_requests/:iid/pipelines
//! CommentStore          ← GET  /projects/:id/merge_requests/:iid/notes
//!                         POST /projects/:id/merge_requests/:iid/notes
//!                         PUT  /projects/:id/merge_requests/:iid/notes/:note_id
//! ```
//!
//! Merge requests are identified by their project-scoped `iid`. Every
//! failure surfaces to the reconciler as `ReconcileError::Remote`.

pub mod client;
pub mod error;
pub mod types;


pub use client::GitlabClient;
pub use error::GitlabError;
