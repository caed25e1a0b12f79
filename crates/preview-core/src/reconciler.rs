//! One reconciliation pass: observe, diff, act, report.

use crate::config::ControllerConfig;
use crate::diff::Diff;
use crate::error::{ReconcileError, Result};
use crate::materializer::{self, MaterializeOutcome};
use crate::reaper::{self, ReapOutcome};
use crate::registry::EnvironmentRegistry;
use crate::reporter::{self, ReportAction};
use crate::source::{CommentStore, DesiredStateSource, PipelineStatusSource, WorkingCopy};
use crate::status::{self, DeploymentStatus, StatusInput};
use crate::types::{ReviewRequest, ReviewRequestId};
use crate::updater;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Remote collaborators of a [`Reconciler`].
#[derive(Clone)]
pub struct Remote {
    pub review_requests: Arc<dyn DesiredStateSource>,
    pub pipelines: Arc<dyn PipelineStatusSource>,
    pub comments: Arc<dyn CommentStore>,
}

impl Remote {
    /// Use one value for all three capabilities.
    pub fn single<T>(source: Arc<T>) -> Self
    where
        T: DesiredStateSource + PipelineStatusSource + CommentStore + 'static,
    {
        Self {
            review_requests: source.clone(),
            pipelines: source.clone(),
            comments: source,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub status: DeploymentStatus,
    pub latest_tag: String,
    /// `None` when the comment could not be written this pass.
    pub comment: Option<ReportAction>,
}

/// What a completed pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub diff: Diff,
    pub created: Vec<ReviewRequestId>,
    pub removed: Vec<ReviewRequestId>,
    pub updated: Vec<ReviewRequestId>,
    pub commits: usize,
    pub environments: BTreeMap<ReviewRequestId, EnvironmentStatus>,
}

#[derive(Debug)]
pub enum PassOutcome {
    Completed(PassReport),
    /// Another pass held the working copy.
    Skipped,
}

/// Read-only view of what the next pass would do.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub diff: Diff,
    pub requests: Vec<ReviewRequest>,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    config: Arc<ControllerConfig>,
    remote: Remote,
    working_copy: Mutex<Box<dyn WorkingCopy>>,
}

impl Reconciler {
    pub fn new(config: Arc<ControllerConfig>, remote: Remote, working_copy: Box<dyn WorkingCopy>) -> Self {
        Self {
            config,
            remote,
            working_copy: Mutex::new(working_copy),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run one pass unless another one is still in flight.
    pub async fn run_pass(&self) -> Result<PassOutcome> {
        let Ok(mut wc) = self.working_copy.try_lock() else {
            info!("previous pass still running, skipping this one");
            return Ok(PassOutcome::Skipped);
        };
        self.pass(&mut **wc).await.map(PassOutcome::Completed)
    }

    /// Pull, list and diff without touching the tree or the comments.
    pub async fn plan(&self) -> Result<Plan> {
        let mut wc = self.working_copy.lock().await;
        wc.pull().await?;
        let registry = self.load_registry(wc.root()).await?;
        let requests = self.list_requests().await?;
        let diff = diff_against(&registry, &requests);
        Ok(Plan { diff, requests })
    }

    async fn pass(&self, wc: &mut dyn WorkingCopy) -> Result<PassReport> {
        let cfg = &self.config;
        wc.pull().await?;
        let tree = wc.root().to_path_buf();

        let registry = self.load_registry(&tree).await?;
        let requests = self.list_requests().await?;
        let diff = diff_against(&registry, &requests);
        info!(
            open = requests.len(),
            existing = registry.len(),
            create = diff.to_create.len(),
            remove = diff.to_remove.len(),
            "computed environment diff"
        );

        let mut report = PassReport {
            diff: diff.clone(),
            ..Default::default()
        };

        // -- create --------------------------------------------------------
        if !diff.to_create.is_empty() {
            let batch: Vec<ReviewRequest> = requests
                .iter()
                .filter(|r| diff.to_create.contains(&r.id))
                .cloned()
                .collect();
            let outcome: MaterializeOutcome = {
                let (tree, cfg) = (tree.clone(), self.config.clone());
                blocking(move || materializer::materialize(&tree, &cfg, &batch)).await?
            };
            if !outcome.created.is_empty() {
                self.publish(wc, "spawn new envs").await?;
                report.commits += 1;
            }
            report.created = outcome.created;
        }

        // -- remove --------------------------------------------------------
        if !diff.to_remove.is_empty() {
            let ids: Vec<ReviewRequestId> = diff.to_remove.iter().copied().collect();
            let outcome: ReapOutcome = {
                let (tree, cfg) = (tree.clone(), self.config.clone());
                blocking(move || reaper::reap(&tree, &cfg, &ids)).await?
            };
            if !outcome.removed.is_empty() || !outcome.missing.is_empty() {
                self.publish(wc, "reaped old envs").await?;
                report.commits += 1;
            }
            report.removed = outcome.removed;
        }

        // -- observe -------------------------------------------------------
        let registry = self.load_registry(&tree).await?;
        let mut resolved: BTreeMap<ReviewRequestId, (DeploymentStatus, String)> = BTreeMap::new();
        for request in &requests {
            let pipeline = match self.remote.pipelines.latest_pipeline(request).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(id = request.id, error = %e, "unable to fetch pipeline status");
                    continue;
                }
            };
            let commit = pipeline
                .as_ref()
                .and_then(|p| p.commit.as_ref())
                .unwrap_or(&request.latest_commit);
            let latest_tag = cfg.template.tag_strategy.derive(commit);
            let status = status::resolve(StatusInput {
                pipeline: pipeline.as_ref(),
                overlay: registry.get(request.id),
                latest_tag: &latest_tag,
            });
            debug!(id = request.id, %status, tag = %latest_tag, "resolved status");
            resolved.insert(request.id, (status, latest_tag));
        }

        // -- update --------------------------------------------------------
        if cfg.auto_update {
            let updates: Vec<(ReviewRequestId, String)> = resolved
                .iter()
                .filter(|(id, (s, _))| {
                    *s == DeploymentStatus::UpdateAvailable && diff.unchanged.contains(*id)
                })
                .map(|(id, (_, tag))| (*id, tag.clone()))
                .collect();
            if !updates.is_empty() {
                let outcome = {
                    let (tree, cfg) = (tree.clone(), self.config.clone());
                    blocking(move || Ok(updater::update_tags(&tree, &cfg, &updates))).await?
                };
                if !outcome.updated.is_empty() {
                    self.publish(wc, "updated envs").await?;
                    report.commits += 1;
                    for id in &outcome.updated {
                        if let Some(entry) = resolved.get_mut(id) {
                            entry.0 = DeploymentStatus::UpToDate;
                        }
                    }
                }
                report.updated = outcome.updated;
            }
        }

        // -- report --------------------------------------------------------
        for (id, (status, latest_tag)) in resolved {
            let comment = match reporter::report(self.remote.comments.as_ref(), cfg, id, status).await {
                Ok(action) => Some(action),
                Err(e) => {
                    warn!(id, error = %e, "unable to write status comment");
                    None
                }
            };
            report.environments.insert(
                id,
                EnvironmentStatus {
                    status,
                    latest_tag,
                    comment,
                },
            );
        }

        info!(
            created = report.created.len(),
            removed = report.removed.len(),
            updated = report.updated.len(),
            commits = report.commits,
            "pass complete"
        );
        Ok(report)
    }

    async fn list_requests(&self) -> Result<Vec<ReviewRequest>> {
        let cfg = &self.config;
        let mut requests = self
            .remote
            .review_requests
            .list_open_review_requests(&cfg.project_id, &cfg.target_branch)
            .await?;
        requests.sort_by_key(|r| r.id);
        requests.dedup_by_key(|r| r.id);
        Ok(requests)
    }

    async fn load_registry(&self, tree: &Path) -> Result<EnvironmentRegistry> {
        let (tree, cfg): (PathBuf, _) = (tree.to_path_buf(), self.config.clone());
        blocking(move || EnvironmentRegistry::load(&tree, &cfg)).await
    }

    async fn publish(&self, wc: &mut dyn WorkingCopy, what: &str) -> Result<()> {
        let message = format!("{} {what}", self.config.commit_prefix);
        wc.stage_all().await?;
        wc.commit(&message).await?;
        wc.push().await?;
        info!(message = %message, "pushed config repository");
        Ok(())
    }
}

fn diff_against(registry: &EnvironmentRegistry, requests: &[ReviewRequest]) -> Diff {
    let existing: BTreeSet<ReviewRequestId> = registry.ids().collect();
    let desired: BTreeSet<ReviewRequestId> = requests.iter().map(|r| r.id).collect();
    Diff::compute(&existing, &desired)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ReconcileError::Join(e.to_string()))?
}
