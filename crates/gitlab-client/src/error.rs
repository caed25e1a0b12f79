use preview_core::ReconcileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitlabError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitLab API error ({status}) on {path}: {body}")]
    Api {
        status: u16,
        path: String,
        body: String,
    },

    #[error("invalid GitLab URL: {0}")]
    Url(String),
}

/// Every adapter failure is transient from the reconciler's point of view:
/// the pass is abandoned and retried on the next tick.
impl From<GitlabError> for ReconcileError {
    fn from(e: GitlabError) -> Self {
        ReconcileError::Remote(e.to_string())
    }
}
