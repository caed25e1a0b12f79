use chrono::{TimeZone, Utc};
use preview_core::config::ControllerConfig;
use preview_core::manifest::Manifest;
use preview_core::memory::{InMemoryRemote, LocalWorkingCopy};
use preview_core::reconciler::{PassOutcome, PassReport, Reconciler, Remote};
use preview_core::registry::EnvironmentRegistry;
use preview_core::reporter::ReportAction;
use preview_core::status::DeploymentStatus;
use preview_core::types::{CommitRef, PipelineRun, PipelineStatus, ReviewRequest};
use preview_core::ReconcileError;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const SPAWN: &str = "[MR Controller] spawn new envs";
const REAP: &str = "[MR Controller] reaped old envs";
const UPDATE: &str = "[MR Controller] updated envs";

fn commit(ts: i64) -> CommitRef {
    CommitRef {
        sha: format!("{ts:040x}"),
        timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
    }
}

fn request(id: u64, ts: i64) -> ReviewRequest {
    ReviewRequest {
        id,
        title: format!("Feature {id}"),
        source_branch: format!("feature-{id}"),
        web_url: Some(format!("https://gitlab.example.org/esap/-/merge_requests/{id}")),
        latest_commit: commit(ts),
    }
}

fn pipeline(status: PipelineStatus, ts: i64) -> PipelineRun {
    PipelineRun {
        id: ts as u64,
        status,
        sha: format!("{ts:040x}"),
        created_at: None,
        commit: Some(commit(ts)),
    }
}

/// Reference overlay plus one overlay per id in `existing` recorded at tag `100`.
fn seed(tree: &Path, existing: &[u64]) {
    let base = tree.join("apps/esap/mr");
    let reference = base.join("reference");
    std::fs::create_dir_all(&reference).unwrap();
    std::fs::write(
        reference.join("kustomization.yaml"),
        "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nnamespace: esap-mr\nresources:\n  - release.yaml\n",
    )
    .unwrap();
    std::fs::write(
        reference.join("release.yaml"),
        "apiVersion: helm.toolkit.fluxcd.io/v2\nkind: HelmRelease\nmetadata:\n  name: esap-mr\n",
    )
    .unwrap();
    std::fs::write(
        reference.join("esap-values.yaml"),
        "esap:\n  host: esap-mr.preview.example.org\n  image:\n    tag: \"__IMAGE_TAG__\"\n",
    )
    .unwrap();

    let mut manifest = String::from("apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\n");
    if !existing.is_empty() {
        manifest.push_str("resources:\n");
    }
    for id in existing {
        let dir = base.join(format!("mr-{id}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("esap-values.yaml"),
            format!("esap:\n  host: esap-mr-{id}.preview.example.org\n  image:\n    tag: \"100\"\n"),
        )
        .unwrap();
        manifest.push_str(&format!("  - mr-{id}/kustomization.yaml\n"));
    }
    std::fs::write(base.join("kustomization.yaml"), manifest).unwrap();
}

struct Harness {
    tree: TempDir,
    remote: Arc<InMemoryRemote>,
    wc: LocalWorkingCopy,
    reconciler: Reconciler,
}

impl Harness {
    fn new(existing: &[u64]) -> Self {
        Self::build(existing, ControllerConfig::default(), false)
    }

    fn build(existing: &[u64], cfg: ControllerConfig, failing_push: bool) -> Self {
        let tree = TempDir::new().unwrap();
        seed(tree.path(), existing);
        let remote = Arc::new(InMemoryRemote::new());
        let mut wc = LocalWorkingCopy::new(tree.path());
        if failing_push {
            wc = wc.failing_push();
        }
        let reconciler = Reconciler::new(
            Arc::new(cfg),
            Remote::single(remote.clone()),
            Box::new(wc.clone()),
        );
        Self {
            tree,
            remote,
            wc,
            reconciler,
        }
    }

    async fn pass(&self) -> PassReport {
        match self.reconciler.run_pass().await.unwrap() {
            PassOutcome::Completed(report) => report,
            PassOutcome::Skipped => panic!("pass unexpectedly skipped"),
        }
    }

    fn manifest(&self) -> Manifest {
        Manifest::load(&self.tree.path().join("apps/esap/mr/kustomization.yaml")).unwrap()
    }

    fn overlay_dirs(&self) -> BTreeSet<String> {
        std::fs::read_dir(self.tree.path().join("apps/esap/mr"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("mr-"))
            .collect()
    }

    fn manifest_dirs(&self) -> BTreeSet<String> {
        self.manifest()
            .entries()
            .iter()
            .map(|e| e.trim_end_matches("/kustomization.yaml").to_string())
            .collect()
    }

    fn recorded_tag(&self, id: u64) -> Option<String> {
        EnvironmentRegistry::load(self.tree.path(), self.reconciler.config())
            .unwrap()
            .get(id)
            .and_then(|r| r.image_tag.clone())
    }
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Convergence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pass_converges_tree_to_open_merge_requests() {
    let h = Harness::new(&[1, 2]);
    h.remote.set_requests(vec![request(2, 100), request(3, 200)]);
    h.remote.set_pipeline(2, Some(pipeline(PipelineStatus::Success, 100)));
    h.remote.set_pipeline(3, Some(pipeline(PipelineStatus::Success, 200)));

    let report = h.pass().await;

    assert_eq!(report.diff.to_create, BTreeSet::from([3]));
    assert_eq!(report.diff.to_remove, BTreeSet::from([1]));
    assert_eq!(report.diff.unchanged, BTreeSet::from([2]));
    assert_eq!(report.created, vec![3]);
    assert_eq!(report.removed, vec![1]);
    assert_eq!(h.wc.commits(), vec![SPAWN, REAP]);

    assert_eq!(h.overlay_dirs(), names(&["mr-2", "mr-3"]));
    assert_eq!(h.manifest_dirs(), h.overlay_dirs());
    assert_eq!(h.recorded_tag(3).as_deref(), Some("200"));

    let values = std::fs::read_to_string(h.tree.path().join("apps/esap/mr/mr-3/esap-values.yaml")).unwrap();
    assert!(values.contains("esap-mr-3.preview.example.org"));
    let release = std::fs::read_to_string(h.tree.path().join("apps/esap/mr/mr-3/release.yaml")).unwrap();
    assert!(release.contains("name: esap-mr-3"));

    assert_eq!(report.environments[&2].status, DeploymentStatus::UpToDate);
    assert_eq!(report.environments[&3].status, DeploymentStatus::UpToDate);
}

#[tokio::test]
async fn second_pass_is_a_no_op() {
    let h = Harness::new(&[1]);
    h.remote.set_requests(vec![request(1, 100), request(4, 300)]);
    h.remote.set_pipeline(1, Some(pipeline(PipelineStatus::Success, 100)));
    h.remote.set_pipeline(4, Some(pipeline(PipelineStatus::Running, 300)));

    h.pass().await;
    let commits_after_first = h.wc.commits().len();
    let manifest_after_first = h.manifest().render();

    let report = h.pass().await;
    assert!(report.diff.is_converged());
    assert_eq!(report.commits, 0);
    assert_eq!(h.wc.commits().len(), commits_after_first);
    assert_eq!(h.manifest().render(), manifest_after_first);

    for id in [1, 4] {
        assert_eq!(h.remote.comments(id).len(), 1, "one comment for !{id}");
        assert_eq!(report.environments[&id].comment, Some(ReportAction::Unchanged));
    }
}

#[tokio::test]
async fn merge_request_without_pipeline_is_not_deployed() {
    let h = Harness::new(&[]);
    h.remote.set_requests(vec![request(9, 500)]);

    let report = h.pass().await;

    assert_eq!(report.environments[&9].status, DeploymentStatus::NotDeployed);
    let comments = h.remote.comments(9);
    assert_eq!(comments.len(), 1);
    assert!(comments[0].body.starts_with("**[MR Controller]**"));
    assert!(comments[0].body.contains("not deployed"));
}

#[tokio::test]
async fn closing_the_last_merge_request_drops_resources_section() {
    let h = Harness::new(&[7]);
    h.remote.set_requests(vec![]);

    let report = h.pass().await;

    assert_eq!(report.removed, vec![7]);
    assert!(h.overlay_dirs().is_empty());
    assert!(!h.manifest().has_resources_section());
    let text = std::fs::read_to_string(h.tree.path().join("apps/esap/mr/kustomization.yaml")).unwrap();
    assert!(!text.contains("resources"));
}

#[tokio::test]
async fn manifest_tracks_directories_across_passes() {
    let h = Harness::new(&[]);
    let rounds: [&[u64]; 4] = [&[1, 2], &[2, 3, 4], &[4], &[5, 1]];
    for open in rounds {
        h.remote
            .set_requests(open.iter().map(|id| request(*id, 100)).collect());
        h.pass().await;
        let expected: BTreeSet<String> = open.iter().map(|id| format!("mr-{id}")).collect();
        assert_eq!(h.overlay_dirs(), expected);
        assert_eq!(h.manifest_dirs(), expected);
    }
}

// ---------------------------------------------------------------------------
// Status and updates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn newer_build_is_reported_as_update_available() {
    let h = Harness::new(&[2]);
    h.remote.set_requests(vec![request(2, 101)]);
    h.remote.set_pipeline(2, Some(pipeline(PipelineStatus::Success, 101)));

    let report = h.pass().await;

    assert_eq!(report.environments[&2].status, DeploymentStatus::UpdateAvailable);
    assert_eq!(report.environments[&2].latest_tag, "101");
    assert_eq!(h.recorded_tag(2).as_deref(), Some("100"));
    assert!(h.wc.commits().is_empty());
}

#[tokio::test]
async fn auto_update_rolls_the_tag_forward() {
    let cfg = ControllerConfig {
        auto_update: true,
        ..Default::default()
    };
    let h = Harness::build(&[2], cfg, false);
    h.remote.set_requests(vec![request(2, 101)]);
    h.remote.set_pipeline(2, Some(pipeline(PipelineStatus::Success, 101)));

    let report = h.pass().await;

    assert_eq!(report.updated, vec![2]);
    assert_eq!(report.environments[&2].status, DeploymentStatus::UpToDate);
    assert_eq!(h.recorded_tag(2).as_deref(), Some("101"));
    assert_eq!(h.wc.commits(), vec![UPDATE]);
}

#[tokio::test]
async fn failed_pipeline_is_desynchronized() {
    let h = Harness::new(&[2]);
    h.remote.set_requests(vec![request(2, 100)]);
    h.remote.set_pipeline(2, Some(pipeline(PipelineStatus::Failed, 100)));

    let report = h.pass().await;
    assert_eq!(report.environments[&2].status, DeploymentStatus::Desynchronized);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_push_aborts_before_reporting() {
    let h = Harness::build(&[], ControllerConfig::default(), true);
    h.remote.set_requests(vec![request(3, 200)]);

    let err = h.reconciler.run_pass().await.unwrap_err();

    assert!(matches!(err, ReconcileError::Vcs { .. }));
    assert!(err.is_fatal());
    assert!(h.remote.comments(3).is_empty());
}

#[tokio::test]
async fn unavailable_remote_leaves_tree_untouched() {
    let h = Harness::new(&[1]);
    h.remote.set_unavailable(true);

    let err = h.reconciler.run_pass().await.unwrap_err();

    assert!(matches!(err, ReconcileError::Remote(_)));
    assert!(!err.is_fatal());
    assert_eq!(h.overlay_dirs(), names(&["mr-1"]));
    assert!(h.wc.commits().is_empty());
}

#[tokio::test]
async fn comment_failure_is_isolated_to_one_merge_request() {
    let h = Harness::new(&[]);
    h.remote.set_requests(vec![request(2, 100), request(3, 100)]);
    h.remote.fail_comments_for(2);

    let report = h.pass().await;

    assert_eq!(report.environments[&2].comment, None);
    assert_eq!(report.environments[&3].comment, Some(ReportAction::Created));
    assert_eq!(h.remote.comments(3).len(), 1);
}
