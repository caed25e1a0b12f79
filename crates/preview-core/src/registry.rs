//! Derives the set of materialized environments from the config tree.

use crate::config::ControllerConfig;
use crate::error::{ReconcileError, Result};
use crate::paths;
use crate::types::{EnvironmentRecord, ReviewRequestId};
use crate::values;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Live environments keyed by id.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentRegistry {
    records: BTreeMap<ReviewRequestId, EnvironmentRecord>,
}

impl EnvironmentRegistry {
    /// Scan the overlay directory of `tree`.
    ///
    /// Directories that carry the environment prefix but no valid id are
    /// logged and skipped. A missing overlay directory yields an empty
    /// registry.
    pub fn load(tree: &Path, cfg: &ControllerConfig) -> Result<Self> {
        let root = paths::overlay_root(tree, cfg);
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %root.display(), "overlay directory does not exist");
                return Ok(Self::default());
            }
            Err(e) => return Err(ReconcileError::filesystem(&root, e)),
        };

        let mut records = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| ReconcileError::filesystem(&root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let id = match paths::parse_env_id(&cfg.env_prefix, &name) {
                None => continue,
                Some(Ok(id)) => id,
                Some(Err(e)) => {
                    warn!(error = %e, "skipping overlay directory");
                    continue;
                }
            };

            let values_path = path.join(&cfg.layout.values_file);
            let image_tag = match values::read_tag(&values_path, &cfg.template) {
                Ok(tag) => tag,
                Err(e) => {
                    warn!(id, error = %e, "unable to read recorded image tag");
                    None
                }
            };
            records.insert(
                id,
                EnvironmentRecord {
                    id,
                    overlay_path: path,
                    image_tag,
                },
            );
        }

        debug!(count = records.len(), "loaded environments");
        Ok(Self { records })
    }

    pub fn ids(&self) -> impl Iterator<Item = ReviewRequestId> + '_ {
        self.records.keys().copied()
    }

    pub fn get(&self, id: ReviewRequestId) -> Option<&EnvironmentRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &EnvironmentRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
