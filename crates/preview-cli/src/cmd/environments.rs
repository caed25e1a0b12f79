use crate::output::{print_json, print_table};
use anyhow::Context;
use preview_core::config::ControllerConfig;
use preview_core::manifest::Manifest;
use preview_core::paths;
use preview_core::registry::EnvironmentRegistry;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Serialize)]
struct EnvironmentRow {
    id: u64,
    name: String,
    image_tag: Option<String>,
    registered: bool,
    path: String,
}

#[derive(Debug, Serialize)]
struct Listing {
    environments: Vec<EnvironmentRow>,
    /// Manifest entries without an overlay directory.
    dangling: Vec<String>,
}

/// List the overlays of a local checkout and cross-check them against the
/// aggregation manifest.
pub fn run(cfg: &ControllerConfig, tree: &Path, json: bool) -> anyhow::Result<()> {
    let registry = EnvironmentRegistry::load(tree, cfg)
        .with_context(|| format!("failed to read environments under {}", tree.display()))?;
    let manifest_path = paths::manifest_path(tree, cfg);
    let manifest = Manifest::load(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;

    let mut entries: BTreeSet<String> = manifest.entries().into_iter().collect();
    let environments: Vec<EnvironmentRow> = registry
        .records()
        .map(|record| EnvironmentRow {
            id: record.id,
            name: cfg.env_name(record.id),
            image_tag: record.image_tag.clone(),
            registered: entries.remove(&paths::manifest_entry(cfg, record.id)),
            path: record
                .overlay_path
                .strip_prefix(tree)
                .unwrap_or(&record.overlay_path)
                .display()
                .to_string(),
        })
        .collect();
    let listing = Listing {
        environments,
        dangling: entries.into_iter().collect(),
    };

    if json {
        return print_json(&listing);
    }

    if listing.environments.is_empty() {
        println!("No environments.");
    } else {
        let rows = listing
            .environments
            .iter()
            .map(|e| {
                vec![
                    e.id.to_string(),
                    e.name.clone(),
                    e.image_tag.clone().unwrap_or_else(|| "-".to_string()),
                    if e.registered { "yes" } else { "no" }.to_string(),
                    e.path.clone(),
                ]
            })
            .collect();
        print_table(&["MR", "NAME", "TAG", "REGISTERED", "PATH"], rows);
    }
    for entry in &listing.dangling {
        println!("[warning] manifest entry '{entry}' has no overlay directory");
    }
    Ok(())
}
