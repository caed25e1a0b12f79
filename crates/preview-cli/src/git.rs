//! `WorkingCopy` over the `git` binary.

use async_trait::async_trait;
use preview_core::source::WorkingCopy;
use preview_core::{ReconcileError, Result};
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct GitWorkingCopy {
    git: PathBuf,
    root: PathBuf,
    branch: String,
    ssh_command: Option<String>,
}

/// Author recorded on every controller commit.
#[derive(Debug, Clone)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl GitWorkingCopy {
    /// Clone `branch` of `url` into `dest` and configure the commit author
    /// for that checkout only.
    pub async fn clone(
        git: PathBuf,
        url: &str,
        branch: &str,
        dest: &Path,
        author: &Author,
        ssh_command: Option<String>,
    ) -> Result<Self> {
        let wc = Self {
            git,
            root: dest.to_path_buf(),
            branch: branch.to_string(),
            ssh_command,
        };
        let dest_arg = dest.display().to_string();
        let output = wc
            .command(None)
            .args(["clone", "--branch", branch, "--single-branch", url, &dest_arg])
            .output()
            .await?;
        check("clone", output)?;

        wc.run("config", &["config", "user.name", &author.name]).await?;
        wc.run("config", &["config", "user.email", &author.email]).await?;
        info!(url, branch, path = %dest.display(), "cloned config repository");
        Ok(wc)
    }

    fn command(&self, cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.git);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(ssh) = &self.ssh_command {
            cmd.env("GIT_SSH_COMMAND", ssh);
        }
        cmd
    }

    async fn output(&self, args: &[&str]) -> Result<Output> {
        debug!(?args, "git");
        Ok(self.command(Some(&self.root)).args(args).output().await?)
    }

    async fn run(&self, op: &str, args: &[&str]) -> Result<String> {
        let output = self.output(args).await?;
        check(op, output)
    }

    /// `true` when the index matches `HEAD`.
    async fn index_is_clean(&self) -> Result<bool> {
        let output = self.output(&["diff", "--cached", "--quiet"]).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => check("diff", output).map(|_| false),
        }
    }
}

fn check(op: &str, output: Output) -> Result<String> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    Err(ReconcileError::vcs(op, stdout.trim(), stderr.trim()))
}

#[async_trait]
impl WorkingCopy for GitWorkingCopy {
    fn root(&self) -> &Path {
        &self.root
    }

    /// Fetch and hard-reset to the remote head. Leftovers from an aborted
    /// pass are discarded.
    async fn pull(&mut self) -> Result<()> {
        let remote_ref = format!("origin/{}", self.branch);
        self.run("fetch", &["fetch", "--prune", "origin", &self.branch])
            .await?;
        self.run("reset", &["reset", "--hard", &remote_ref]).await?;
        self.run("clean", &["clean", "-fd"]).await?;
        Ok(())
    }

    async fn stage_all(&mut self) -> Result<()> {
        self.run("add", &["add", "--all"]).await?;
        Ok(())
    }

    async fn commit(&mut self, message: &str) -> Result<()> {
        if self.index_is_clean().await? {
            debug!(message, "nothing staged, skipping commit");
            return Ok(());
        }
        self.run("commit", &["commit", "--quiet", "-m", message]).await?;
        Ok(())
    }

    async fn push(&mut self) -> Result<()> {
        let refspec = format!("HEAD:{}", self.branch);
        self.run("push", &["push", "origin", &refspec]).await?;
        Ok(())
    }
}
