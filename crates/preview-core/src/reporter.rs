//! Keeps exactly one status comment per merge request up to date.

use crate::config::ControllerConfig;
use crate::error::Result;
use crate::source::CommentStore;
use crate::status::DeploymentStatus;
use crate::types::ReviewRequestId;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAction {
    Created,
    Updated,
    Unchanged,
}

/// Render the comment body for `status`. Every body starts with the
/// configured prefix, which is how the controller finds its own comment.
pub fn render(cfg: &ControllerConfig, id: ReviewRequestId, status: DeploymentStatus) -> String {
    let env = cfg.env_name(id);
    let text = match status {
        DeploymentStatus::NotDeployed => format!(
            "Preview environment `{env}` is not deployed. It is created once a pipeline for this merge request has succeeded."
        ),
        DeploymentStatus::Pending => format!(
            "Preview environment `{env}` is waiting for the running pipeline to finish."
        ),
        DeploymentStatus::UpdateAvailable => format!(
            "Preview environment `{env}` is deployed, but a newer build of this merge request is available."
        ),
        DeploymentStatus::UpToDate => format!(
            "Preview environment `{env}` is deployed and up to date with the latest commit."
        ),
        DeploymentStatus::Desynchronized => format!(
            "Preview environment `{env}` is out of sync: the latest pipeline did not succeed."
        ),
    };

    let mut body = format!("{} {text}", cfg.report.comment_prefix);
    if matches!(
        status,
        DeploymentStatus::UpToDate | DeploymentStatus::UpdateAvailable
    ) {
        if let Some(url) = cfg.report.env_url(id) {
            body.push_str(&format!("\n\n{url}"));
        }
    }
    body
}

/// Create or overwrite the controller's comment on merge request `id`.
pub async fn report(
    comments: &dyn CommentStore,
    cfg: &ControllerConfig,
    id: ReviewRequestId,
    status: DeploymentStatus,
) -> Result<ReportAction> {
    let body = render(cfg, id, status);
    let existing = comments.list(id).await?;
    let mut ours = existing.iter().filter(|c| cfg.report.is_status_comment(c));

    let Some(comment) = ours.next() else {
        comments.create(id, &body).await?;
        debug!(id, %status, "created status comment");
        return Ok(ReportAction::Created);
    };

    let extra = ours.count();
    if extra > 0 {
        warn!(id, extra, "found duplicate status comments, updating the first one");
    }

    if comment.body == body {
        return Ok(ReportAction::Unchanged);
    }
    comments.update(id, comment.id, &body).await?;
    debug!(id, comment_id = comment.id, %status, "updated status comment");
    Ok(ReportAction::Updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRemote;
    use std::collections::HashSet;

    fn cfg() -> ControllerConfig {
        ControllerConfig {
            project_id: "42".into(),
            ..Default::default()
        }
    }

    #[test]
    fn every_status_renders_a_distinct_prefixed_message() {
        let cfg = cfg();
        let bodies: HashSet<String> = DeploymentStatus::all()
            .iter()
            .map(|s| render(&cfg, 3, *s))
            .collect();
        assert_eq!(bodies.len(), DeploymentStatus::all().len());
        for body in &bodies {
            assert!(body.starts_with("**[MR Controller]**"));
            assert!(body.contains("`mr-3`"));
        }
    }

    #[test]
    fn url_is_appended_for_deployed_states() {
        let mut cfg = cfg();
        cfg.report.env_url_template = Some("https://esap-mr-{id}.example.org".into());
        assert!(render(&cfg, 3, DeploymentStatus::UpToDate).ends_with("https://esap-mr-3.example.org"));
        assert!(!render(&cfg, 3, DeploymentStatus::Pending).contains("https://"));
    }

    #[tokio::test]
    async fn creates_once_then_updates() {
        let remote = InMemoryRemote::new();
        let cfg = cfg();

        let first = report(&remote, &cfg, 9, DeploymentStatus::NotDeployed).await.unwrap();
        assert_eq!(first, ReportAction::Created);
        let again = report(&remote, &cfg, 9, DeploymentStatus::NotDeployed).await.unwrap();
        assert_eq!(again, ReportAction::Unchanged);
        let changed = report(&remote, &cfg, 9, DeploymentStatus::Pending).await.unwrap();
        assert_eq!(changed, ReportAction::Updated);

        let comments = remote.comments(9);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].body, render(&cfg, 9, DeploymentStatus::Pending));
    }

    #[tokio::test]
    async fn human_comments_are_ignored() {
        let remote = InMemoryRemote::new();
        let cfg = cfg();
        remote.create(4, "LGTM").await.unwrap();

        report(&remote, &cfg, 4, DeploymentStatus::UpToDate).await.unwrap();
        report(&remote, &cfg, 4, DeploymentStatus::UpdateAvailable).await.unwrap();

        let comments = remote.comments(4);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].body, "LGTM");
    }

    #[tokio::test]
    async fn only_the_first_duplicate_is_updated() {
        let remote = InMemoryRemote::new();
        let cfg = cfg();
        remote.create(6, "**[MR Controller]** stale one").await.unwrap();
        remote.create(6, "**[MR Controller]** stale two").await.unwrap();

        let action = report(&remote, &cfg, 6, DeploymentStatus::Desynchronized).await.unwrap();

        assert_eq!(action, ReportAction::Updated);
        let comments = remote.comments(6);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].body, render(&cfg, 6, DeploymentStatus::Desynchronized));
        assert_eq!(comments[1].body, "**[MR Controller]** stale two");
    }

    #[tokio::test]
    async fn prefixed_comments_by_other_users_are_left_alone() {
        let remote = InMemoryRemote::new();
        remote.set_user("mrcontroller[bot]");
        let mut cfg = cfg();
        cfg.report.bot_username = Some("mrcontroller[bot]".into());
        let quoted = "**[MR Controller]** said it was up to date, but it is not";
        remote.add_comment(8, "alice", quoted);

        let first = report(&remote, &cfg, 8, DeploymentStatus::Pending).await.unwrap();
        assert_eq!(first, ReportAction::Created);
        let second = report(&remote, &cfg, 8, DeploymentStatus::UpToDate).await.unwrap();
        assert_eq!(second, ReportAction::Updated);

        let comments = remote.comments(8);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].body, quoted);
        assert_eq!(comments[1].author.as_deref(), Some("mrcontroller[bot]"));
        assert_eq!(comments[1].body, render(&cfg, 8, DeploymentStatus::UpToDate));
    }
}
