//! Clones the reference overlay for new merge requests.

use crate::config::ControllerConfig;
use crate::error::Result;
use crate::io;
use crate::manifest::Manifest;
use crate::paths;
use crate::types::{ReviewRequest, ReviewRequestId};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeOutcome {
    pub created: Vec<ReviewRequestId>,
    /// Ids whose overlay directory already existed.
    pub skipped: Vec<ReviewRequestId>,
}

/// Materialize one overlay per request and register each in the manifest.
///
/// All manifest edits of the batch are applied to a single in-memory copy
/// and written once at the end. Any filesystem failure removes the partial
/// overlay of the failing id and aborts the batch without saving the
/// manifest; the caller must not commit the tree in that case.
pub fn materialize(
    tree: &Path,
    cfg: &ControllerConfig,
    requests: &[ReviewRequest],
) -> Result<MaterializeOutcome> {
    let mut manifest = Manifest::load(&paths::manifest_path(tree, cfg))?;
    let mut outcome = MaterializeOutcome::default();

    let reference_values = paths::reference_dir(tree, cfg).join(&cfg.layout.values_file);
    if reference_values.is_file()
        && !io::file_contains(&reference_values, &cfg.template.tag_placeholder)?
    {
        warn!(
            path = %reference_values.display(),
            placeholder = %cfg.template.tag_placeholder,
            "reference values file has no tag placeholder, new environments keep its tag"
        );
    }

    for request in requests {
        let target = paths::env_dir(tree, cfg, request.id);
        if target.exists() {
            info!(id = request.id, path = %target.display(), "overlay already exists, skipping");
            outcome.skipped.push(request.id);
            continue;
        }

        if let Err(e) = clone_overlay(tree, cfg, request) {
            if let Err(cleanup) = io::remove_tree(&target) {
                warn!(id = request.id, error = %cleanup, "unable to remove partial overlay");
            }
            return Err(e);
        }

        manifest.register(&paths::manifest_entry(cfg, request.id));
        info!(id = request.id, env = %cfg.env_name(request.id), "created environment");
        outcome.created.push(request.id);
    }

    // The directory guard above and the containment check in `register`
    // each keep the manifest free of duplicates on their own.
    if let Err(e) = manifest.save() {
        for &id in &outcome.created {
            if let Err(cleanup) = io::remove_tree(&paths::env_dir(tree, cfg, id)) {
                warn!(id, error = %cleanup, "unable to remove unregistered overlay");
            }
        }
        return Err(e);
    }
    Ok(outcome)
}

fn clone_overlay(tree: &Path, cfg: &ControllerConfig, request: &ReviewRequest) -> Result<()> {
    let target = paths::env_dir(tree, cfg, request.id);
    io::copy_tree(&paths::reference_dir(tree, cfg), &target)?;

    let template = &cfg.template;
    io::replace_in_tree(&target, &template.name_token, &template.name_for(request.id))?;

    let tag = template.tag_strategy.derive(&request.latest_commit);
    let values = paths::values_path(tree, cfg, request.id);
    if !io::replace_in_file(&values, &template.tag_placeholder, &tag)? {
        debug!(id = request.id, path = %values.display(), "tag placeholder not found in values file");
    }
    Ok(())
}
