use crate::config::ControllerConfig;
use crate::error::{ReconcileError, Result};
use crate::types::ReviewRequestId;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn overlay_root(tree: &Path, cfg: &ControllerConfig) -> PathBuf {
    tree.join(&cfg.layout.overlay_dir)
}

pub fn reference_dir(tree: &Path, cfg: &ControllerConfig) -> PathBuf {
    overlay_root(tree, cfg).join(&cfg.layout.reference_dir)
}

pub fn manifest_path(tree: &Path, cfg: &ControllerConfig) -> PathBuf {
    overlay_root(tree, cfg).join(&cfg.layout.manifest_file)
}

pub fn env_dir(tree: &Path, cfg: &ControllerConfig, id: ReviewRequestId) -> PathBuf {
    overlay_root(tree, cfg).join(cfg.env_name(id))
}

pub fn values_path(tree: &Path, cfg: &ControllerConfig, id: ReviewRequestId) -> PathBuf {
    env_dir(tree, cfg, id).join(&cfg.layout.values_file)
}

/// The line item registered in the aggregation manifest for an overlay.
pub fn manifest_entry(cfg: &ControllerConfig, id: ReviewRequestId) -> String {
    format!("{}/{}", cfg.env_name(id), cfg.layout.manifest_file)
}

// ---------------------------------------------------------------------------
// Directory name parsing
// ---------------------------------------------------------------------------

/// Parse an environment id out of an overlay directory name.
///
/// Returns `None` for names outside the naming scheme (the reference
/// overlay, unrelated folders) and a parse error for names that carry the
/// prefix but no valid id, e.g. `mr-abc`. Only the canonical spelling is
/// accepted: `mr-05` or `mr-+5` would never match the directory that
/// [`env_dir`] derives from the id.
pub fn parse_env_id(prefix: &str, name: &str) -> Option<Result<ReviewRequestId>> {
    let suffix = name.strip_prefix(prefix)?;
    let parsed = suffix
        .parse::<ReviewRequestId>()
        .map_err(|e| ReconcileError::Parse(format!("invalid environment id in '{name}': {e}")))
        .and_then(|id| {
            if id.to_string() == suffix {
                Ok(id)
            } else {
                Err(ReconcileError::Parse(format!(
                    "environment directory '{name}' is not in canonical form '{prefix}{id}'"
                )))
            }
        });
    Some(parsed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
