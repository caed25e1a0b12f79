//! Wires the GitLab adapter, the git checkout and the engine together.

use crate::git::{Author, GitWorkingCopy};
use crate::settings::RemoteArgs;
use crate::ssh::{SshIdentity, SshMaterial};
use anyhow::Context;
use gitlab_client::GitlabClient;
use preview_core::config::ControllerConfig;
use preview_core::reconciler::{Reconciler, Remote};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{info, warn};

pub struct Controller {
    pub reconciler: Arc<Reconciler>,
    /// Keeps the temporary work directory alive.
    _work_dir: Option<TempDir>,
}

/// Validate the configuration, provision SSH, clone the config repository
/// and build the reconciler.
pub async fn start(mut cfg: ControllerConfig, remote: &RemoteArgs) -> anyhow::Result<Controller> {
    cfg.ensure_valid().context("invalid configuration")?;
    let token = remote.token()?;
    let repository = remote.repository()?;
    let git = which::which("git").context("git binary not found on PATH")?;

    let (work_root, guard): (PathBuf, Option<TempDir>) = match &remote.work_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            (dir.clone(), None)
        }
        None => {
            let tmp = tempfile::Builder::new()
                .prefix("mr-controller-")
                .tempdir()
                .context("failed to create work directory")?;
            (tmp.path().to_path_buf(), Some(tmp))
        }
    };

    let ssh_command = match &remote.identity {
        Some(key) => {
            let dir = remote.ssh_dir.clone().unwrap_or_else(|| work_root.join("ssh"));
            let material = SshMaterial {
                private_key: key.clone(),
                public_key: remote.identity_pub.clone(),
                known_hosts: remote.known_hosts.clone(),
            };
            let identity = SshIdentity::provision(&dir, &material)?;
            Some(identity.git_ssh_command())
        }
        None => None,
    };

    let checkout = work_root.join("repository");
    if checkout.exists() {
        std::fs::remove_dir_all(&checkout)
            .with_context(|| format!("failed to clear {}", checkout.display()))?;
    }
    let author = Author {
        name: remote.author_name.clone(),
        email: remote.author_email.clone(),
    };
    let working_copy = GitWorkingCopy::clone(
        git,
        repository,
        &remote.branch,
        &checkout,
        &author,
        ssh_command,
    )
    .await
    .context("failed to clone config repository")?;

    let client = GitlabClient::new(
        &remote.gitlab_url,
        token,
        cfg.project_id.clone(),
        remote.timeout(),
    )
    .context("failed to create GitLab client")?;

    if cfg.report.bot_username.is_none() {
        match client.current_user().await {
            Ok(user) => {
                info!(username = %user.username, "commenting as token owner");
                cfg.report.bot_username = Some(user.username);
            }
            Err(e) => warn!(error = %e, "unable to resolve token owner, matching status comments by prefix only"),
        }
    }

    info!(
        project = %cfg.project_id,
        target_branch = %cfg.target_branch,
        gitlab = %remote.gitlab_url,
        "controller ready"
    );
    let reconciler = Reconciler::new(
        Arc::new(cfg),
        Remote::single(Arc::new(client)),
        Box::new(working_copy),
    );
    Ok(Controller {
        reconciler: Arc::new(reconciler),
        _work_dir: guard,
    })
}
