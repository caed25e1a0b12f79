//! Tears down overlays of merge requests that are no longer open.

use crate::config::ControllerConfig;
use crate::error::Result;
use crate::io;
use crate::manifest::Manifest;
use crate::paths;
use crate::types::ReviewRequestId;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReapOutcome {
    pub removed: Vec<ReviewRequestId>,
    /// Ids whose directory was already gone; their manifest entry is still
    /// dropped.
    pub missing: Vec<ReviewRequestId>,
}

/// Remove the overlay and manifest entry of every id.
///
/// When the last entry goes, the `resources:` header is dropped as well so
/// the manifest never carries an empty list key.
pub fn reap(tree: &Path, cfg: &ControllerConfig, ids: &[ReviewRequestId]) -> Result<ReapOutcome> {
    let mut manifest = Manifest::load(&paths::manifest_path(tree, cfg))?;
    let mut outcome = ReapOutcome::default();

    for &id in ids {
        let target = paths::env_dir(tree, cfg, id);
        if io::remove_tree(&target)? {
            info!(id, env = %cfg.env_name(id), "reaped environment");
            outcome.removed.push(id);
        } else {
            warn!(id, path = %target.display(), "overlay directory already absent");
            outcome.missing.push(id);
        }
        manifest.unregister(&paths::manifest_entry(cfg, id));
    }

    if manifest.prune_empty_section() {
        info!("no environments left, removed empty resources section");
    }
    manifest.save()?;
    Ok(outcome)
}
