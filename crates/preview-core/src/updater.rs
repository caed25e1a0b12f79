//! Rolls live environments forward to a newer image tag.

use crate::config::ControllerConfig;
use crate::paths;
use crate::types::ReviewRequestId;
use crate::values;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub updated: Vec<ReviewRequestId>,
    pub failed: Vec<ReviewRequestId>,
}

/// Rewrite the recorded tag of each `(id, tag)` pair in place.
///
/// Each values file is replaced atomically, so a failure on one id leaves
/// that overlay untouched and does not affect the others.
pub fn update_tags(
    tree: &Path,
    cfg: &ControllerConfig,
    updates: &[(ReviewRequestId, String)],
) -> UpdateOutcome {
    let mut outcome = UpdateOutcome::default();
    for (id, tag) in updates {
        let path = paths::values_path(tree, cfg, *id);
        match values::write_tag(&path, &cfg.template, tag) {
            Ok(true) => {
                info!(id, tag = %tag, "updated environment image tag");
                outcome.updated.push(*id);
            }
            Ok(false) => warn!(id, path = %path.display(), "no tag key to update"),
            Err(e) => {
                warn!(id, error = %e, "unable to update image tag");
                outcome.failed.push(*id);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EnvironmentRegistry;
    use crate::testutil::seed_tree;
    use tempfile::TempDir;

    #[test]
    fn rewrites_tags_and_isolates_failures() {
        let tree = TempDir::new().unwrap();
        let cfg = ControllerConfig::default();
        seed_tree(tree.path(), &[1, 2]);
        std::fs::remove_file(tree.path().join("apps/esap/mr/mr-2/esap-values.yaml")).unwrap();

        let outcome = update_tags(
            tree.path(),
            &cfg,
            &[(1, "101".to_string()), (2, "101".to_string())],
        );
        assert_eq!(outcome.updated, vec![1]);
        assert_eq!(outcome.failed, vec![2]);

        let reg = EnvironmentRegistry::load(tree.path(), &cfg).unwrap();
        assert_eq!(reg.get(1).unwrap().image_tag.as_deref(), Some("101"));
    }
}
