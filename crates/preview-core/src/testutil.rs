//! Shared fixtures for unit tests.

use crate::types::{CommitRef, ReviewRequest};
use chrono::{TimeZone, Utc};
use std::path::Path;

pub const REFERENCE_KUSTOMIZATION: &str =
    "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nnamespace: esap-mr\nresources:\n  - namespace.yaml\n";
pub const REFERENCE_NAMESPACE: &str =
    "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: esap-mr\n";
pub const REFERENCE_VALUES: &str =
    "esap:\n  host: esap-mr.preview.example.org\n  image:\n    tag: \"__IMAGE_TAG__\"\n";

pub fn commit(timestamp: i64) -> CommitRef {
    CommitRef {
        sha: format!("{timestamp:040x}"),
        timestamp: Utc.timestamp_opt(timestamp, 0).unwrap(),
    }
}

pub fn request(id: u64, timestamp: i64) -> ReviewRequest {
    ReviewRequest {
        id,
        title: format!("MR {id}"),
        source_branch: format!("feature-{id}"),
        web_url: None,
        latest_commit: commit(timestamp),
    }
}

/// Write a config tree with the reference overlay, one overlay per id in
/// `existing` (recorded tag `100`) and a manifest registering them.
pub fn seed_tree(tree: &Path, existing: &[u64]) {
    let base = tree.join("apps/esap/mr");
    let reference = base.join("reference");
    std::fs::create_dir_all(&reference).unwrap();
    std::fs::write(reference.join("kustomization.yaml"), REFERENCE_KUSTOMIZATION).unwrap();
    std::fs::write(reference.join("namespace.yaml"), REFERENCE_NAMESPACE).unwrap();
    std::fs::write(reference.join("esap-values.yaml"), REFERENCE_VALUES).unwrap();

    let mut manifest =
        String::from("apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\n");
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
