//! Command-line and environment configuration.
//!
//! The tree layout and template tokens come from an optional YAML file;
//! identity values (project, branches, credentials) come from flags with
//! environment fallbacks and override the file.

use anyhow::Context;
use clap::Args;
use preview_core::config::ControllerConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Args, Debug, Clone, Default)]
pub struct ControllerArgs {
    /// Branch merge requests must target to get an environment
    #[arg(long, global = true, env = "TARGET_BRANCH")]
    pub target_branch: Option<String>,

    /// GitLab project id or path
    #[arg(long, global = true, env = "GITLAB_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Prefix of environment directory names
    #[arg(long, global = true, env = "ENV_PREFIX")]
    pub env_prefix: Option<String>,

    /// Seconds between reconciliation passes
    #[arg(long, global = true, env = "RECONCILE_INTERVAL_SECS")]
    pub interval_secs: Option<u64>,

    /// Link added to status comments, `{id}` is replaced by the merge request id
    #[arg(long, global = true, env = "ENV_URL_TEMPLATE")]
    pub env_url_template: Option<String>,

    /// Roll environments forward when a newer build succeeded
    #[arg(long, global = true, env = "AUTO_UPDATE")]
    pub auto_update: Option<bool>,

    /// GitLab account the controller comments as (default: owner of the token)
    #[arg(long, global = true, env = "GITLAB_BOT_USERNAME")]
    pub bot_username: Option<String>,
}

impl ControllerArgs {
    pub fn apply(&self, cfg: &mut ControllerConfig) {
        if let Some(v) = &self.target_branch {
            cfg.target_branch = v.clone();
        }
        if let Some(v) = &self.project_id {
            cfg.project_id = v.clone();
        }
        if let Some(v) = &self.env_prefix {
            cfg.env_prefix = v.clone();
        }
        if let Some(v) = self.interval_secs {
            cfg.interval_secs = v;
        }
        if let Some(v) = &self.env_url_template {
            cfg.report.env_url_template = Some(v.clone());
        }
        if let Some(v) = self.auto_update {
            cfg.auto_update = v;
        }
        if let Some(v) = &self.bot_username {
            cfg.report.bot_username = Some(v.clone());
        }
    }
}

/// Defaults, then the YAML file, then flags and environment.
pub fn load_config(path: Option<&Path>, args: &ControllerArgs) -> anyhow::Result<ControllerConfig> {
    let mut cfg = match path {
        Some(p) => ControllerConfig::load(p)
            .with_context(|| format!("failed to load config from {}", p.display()))?,
        None => ControllerConfig::default(),
    };
    args.apply(&mut cfg);
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Remote access
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// GitLab instance base URL
    #[arg(long, env = "GITLAB_URL", default_value = "https://gitlab.com")]
    pub gitlab_url: String,

    /// GitLab access token with `api` scope
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
    pub gitlab_token: Option<String>,

    /// HTTP timeout for GitLab calls, in seconds
    #[arg(long, env = "GITLAB_TIMEOUT_SECS", default_value_t = 30)]
    pub gitlab_timeout_secs: u64,

    /// Clone URL of the config repository watched by Flux
    #[arg(long, env = "FLUX_REPOSITORY")]
    pub repository: Option<String>,

    /// Branch of the config repository
    #[arg(long, env = "FLUX_BRANCH", default_value = "main")]
    pub branch: String,

    /// Private SSH key for the config repository
    #[arg(long, env = "FLUX_IDENTITY", hide_env_values = true)]
    pub identity: Option<String>,

    /// Public half of the SSH key
    #[arg(long, env = "FLUX_IDENTITY_PUB", hide_env_values = true)]
    pub identity_pub: Option<String>,

    /// known_hosts entries for the git server
    #[arg(long, env = "FLUX_KNOWN_HOSTS")]
    pub known_hosts: Option<String>,

    /// Directory the SSH material is written to (default: inside the work directory)
    #[arg(long, env = "SSH_DIR")]
    pub ssh_dir: Option<PathBuf>,

    /// Directory the config repository is cloned into (default: a temporary directory)
    #[arg(long, env = "WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Commit author name
    #[arg(long, env = "GIT_AUTHOR_NAME", default_value = "mrcontroller[bot]")]
    pub author_name: String,

    /// Commit author email
    #[arg(long, env = "GIT_AUTHOR_EMAIL", default_value = "mrcontroller[bot]@epfl.ch")]
    pub author_email: String,
}

impl RemoteArgs {
    pub fn token(&self) -> anyhow::Result<&str> {
        self.gitlab_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .context("GITLAB_TOKEN is not set")
    }

    pub fn repository(&self) -> anyhow::Result<&str> {
        self.repository
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .context("FLUX_REPOSITORY is not set")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.gitlab_timeout_secs)
    }
}
