//! SSH material for the git transport.
//!
//! The key, known hosts and an ssh config are written into a dedicated
//! directory; git picks them up through `GIT_SSH_COMMAND`, so the user's
//! own `~/.ssh` is never touched.

use anyhow::Context;
use preview_core::io::atomic_write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const PRIVATE_KEY: &str = "id_ecdsa";
const PUBLIC_KEY: &str = "id_ecdsa.pub";
const KNOWN_HOSTS: &str = "known_hosts";
const CONFIG: &str = "config";

#[derive(Debug, Clone, Default)]
pub struct SshMaterial {
    pub private_key: String,
    pub public_key: Option<String>,
    pub known_hosts: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SshIdentity {
    config: PathBuf,
}

impl SshIdentity {
    /// Write `material` into `dir`, creating it with owner-only access.
    pub fn provision(dir: &Path, material: &SshMaterial) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        set_mode(dir, 0o700)?;

        let key = dir.join(PRIVATE_KEY);
        write(&key, &material.private_key, 0o600)?;

        if let Some(public) = &material.public_key {
            write(&dir.join(PUBLIC_KEY), public, 0o644)?;
        }

        let known_hosts = dir.join(KNOWN_HOSTS);
        let strict = match &material.known_hosts {
            Some(hosts) => {
                write(&known_hosts, hosts, 0o644)?;
                "yes"
            }
            None => {
                warn!("no known_hosts provided, host keys are accepted on first use");
                "accept-new"
            }
        };

        let config = format!(
            "Host *\n  IdentityFile {}\n  IdentitiesOnly yes\n  UserKnownHostsFile {}\n  StrictHostKeyChecking {strict}\n",
            key.display(),
            known_hosts.display(),
        );
        write(&dir.join(CONFIG), &config, 0o600)?;

        info!(dir = %dir.display(), "ssh identity provisioned");
        Ok(Self {
            config: dir.join(CONFIG),
        })
    }

    /// Value for `GIT_SSH_COMMAND`.
    pub fn git_ssh_command(&self) -> String {
        format!("ssh -F '{}'", self.config.display())
    }
}

/// ssh rejects key files without a trailing newline.
fn write(path: &Path, contents: &str, mode: u32) -> anyhow::Result<()> {
    let mut data = contents.trim_end().to_string();
    data.push('\n');
    atomic_write(path, data.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    set_mode(path, mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> anyhow::Result<()> {
    Ok(())
}
