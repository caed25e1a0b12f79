//! Line-level editor for the aggregation manifest.
//!
//! The manifest is a kustomization file whose `resources:` list names every
//! live overlay. Edits are applied to the raw lines so unrelated keys,
//! comments and formatting survive untouched; the result is checked to still
//! parse as YAML before it is written back.

use crate::error::{ReconcileError, Result};
use crate::io;
use std::path::{Path, PathBuf};

pub const RESOURCES_KEY: &str = "resources";

#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    lines: Vec<String>,
    dirty: bool,
}

impl Manifest {
    /// Load the manifest at `path`. A missing file yields an empty manifest
    /// that is created on [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(ReconcileError::filesystem(path, e)),
        };
        Self::parse(path, &text)
    }

    /// Split `text` into lines and bring the `resources:` key into block
    /// form. A single-line flow list is expanded into block items; any other
    /// value, a flow list spanning lines or a repeated key is a
    /// [`ReconcileError::Parse`], reported before anything touches the tree.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        let unsupported = |what: String| {
            ReconcileError::Parse(format!("manifest {}: {what}", path.display()))
        };

        let headers: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| header_value(l).is_some())
            .map(|(i, _)| i)
            .collect();
        if headers.len() > 1 {
            return Err(unsupported(format!("'{RESOURCES_KEY}' appears {} times", headers.len())));
        }

        if let Some(&header) = headers.first() {
            let value = header_value(&lines[header]).unwrap_or_default().to_string();
            if value.starts_with('[') {
                let items: Vec<String> = serde_yaml::from_str(&value)
                    .map_err(|e| unsupported(format!("unreadable '{RESOURCES_KEY}' list: {e}")))?;
                lines[header] = format!("{RESOURCES_KEY}:");
                for (n, item) in items.into_iter().enumerate() {
                    lines.insert(header + 1 + n, format!("  - {item}"));
                }
            } else if !value.is_empty() {
                return Err(unsupported(format!(
                    "'{RESOURCES_KEY}' must be a list, found '{value}'"
                )));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            lines,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Registered overlay references, in file order.
    pub fn entries(&self) -> Vec<String> {
        let Some(header) = self.header_index() else {
            return Vec::new();
        };
        self.item_indices(header)
            .into_iter()
            .filter_map(|i| item_value(&self.lines[i]))
            .collect()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|e| e == entry)
    }

    pub fn has_resources_section(&self) -> bool {
        self.header_index().is_some()
    }

    /// Ensure `entry` is listed, creating the `resources:` section if needed.
    /// Returns `false` when it was already present.
    pub fn register(&mut self, entry: &str) -> bool {
        if self.contains(entry) {
            return false;
        }
        let item = format!("  - {entry}");
        match self.header_index() {
            Some(header) => {
                let at = self
                    .item_indices(header)
                    .last()
                    .map_or(header + 1, |last| last + 1);
                self.lines.insert(at, item);
            }
            None => {
                self.lines.push(format!("{RESOURCES_KEY}:"));
                self.lines.push(item);
            }
        }
        self.dirty = true;
        true
    }

    /// Remove every item equal to `entry`. Returns `true` if any was removed.
    pub fn unregister(&mut self, entry: &str) -> bool {
        let Some(header) = self.header_index() else {
            return false;
        };
        let doomed: Vec<usize> = self
            .item_indices(header)
            .into_iter()
            .filter(|&i| item_value(&self.lines[i]).as_deref() == Some(entry))
            .collect();
        for &i in doomed.iter().rev() {
            self.lines.remove(i);
        }
        if doomed.is_empty() {
            return false;
        }
        self.dirty = true;
        true
    }

    /// Drop the `resources:` header when its list is empty. An empty block
    /// key parses as `null`, which kustomize rejects.
    pub fn prune_empty_section(&mut self) -> bool {
        let Some(header) = self.header_index() else {
            return false;
        };
        if !self.item_indices(header).is_empty() {
            return false;
        }
        self.lines.remove(header);
        self.dirty = true;
        true
    }

    pub fn render(&self) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    /// Write the manifest back if it changed. Refuses to write text that no
    /// longer parses as YAML.
    pub fn save(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        let text = self.render();
        serde_yaml::from_str::<serde_yaml::Value>(&text).map_err(|e| {
            ReconcileError::Parse(format!(
                "manifest {} would become invalid YAML: {e}",
                self.path.display()
            ))
        })?;
        io::atomic_write(&self.path, text.as_bytes())?;
        self.dirty = false;
        Ok(true)
    }

    fn header_index(&self) -> Option<usize> {
        self.lines.iter().position(|l| header_value(l).is_some())
    }

    /// Indices of the list items belonging to the section at `header`.
    /// The section ends at the next top-level key.
    fn item_indices(&self, header: usize) -> Vec<usize> {
        let mut items = Vec::new();
        for (i, line) in self.lines.iter().enumerate().skip(header + 1) {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let indented = line.starts_with(' ') || line.starts_with('\t');
            if trimmed.starts_with("- ") || trimmed == "-" {
                items.push(i);
            } else if !indented {
                break;
            }
        }
        items
    }
}

/// Value of a top-level `resources:` line with any trailing comment removed.
fn header_value(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(RESOURCES_KEY)?.strip_prefix(':')?;
    if !(rest.is_empty() || rest.starts_with([' ', '\t'])) {
        return None;
    }
    let rest = rest.trim();
    let value = match rest.find(" #") {
        _ if rest.starts_with('#') => "",
        Some(at) => &rest[..at],
        None => rest,
    };
    Some(value.trim_end())
}

fn item_value(line: &str) -> Option<String> {
    let value = line.trim_start().strip_prefix('-')?.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BASE: &str = "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nresources:\n  - mr-1/kustomization.yaml\n  - mr-2/kustomization.yaml\n";

    fn parse(text: &str) -> Manifest {
        Manifest::parse(Path::new("kustomization.yaml"), text).unwrap()
    }

    #[test]
    fn entries_in_file_order() {
        let m = parse(BASE);
        assert_eq!(
            m.entries(),
            vec!["mr-1/kustomization.yaml", "mr-2/kustomization.yaml"]
        );
    }

    #[test]
    fn entries_stop_at_next_top_level_key() {
        let m = parse("resources:\n- a\n- 'b'\n# note\npatches:\n  - c\n");
        assert_eq!(m.entries(), vec!["a", "b"]);
    }

    #[test]
    fn register_appends_and_is_idempotent() {
        let mut m = parse(BASE);
        assert!(m.register("mr-3/kustomization.yaml"));
        assert!(!m.register("mr-3/kustomization.yaml"));
        assert_eq!(m.entries().len(), 3);
        assert!(m.render().ends_with("  - mr-3/kustomization.yaml\n"));
    }

    #[test]
    fn register_creates_missing_section() {
        let mut m = parse("apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\n");
        assert!(m.register("mr-9/kustomization.yaml"));
        assert_eq!(
            m.render(),
            "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nresources:\n  - mr-9/kustomization.yaml\n"
        );
    }

    #[test]
    fn register_expands_inline_empty_list() {
        let mut m = parse("kind: Kustomization\nresources: []\n");
        m.register("mr-1/kustomization.yaml");
        assert_eq!(
            m.render(),
            "kind: Kustomization\nresources:\n  - mr-1/kustomization.yaml\n"
        );
    }

    #[test]
    fn flow_list_is_expanded_into_block_items() {
        let mut m = parse(
            "kind: Kustomization\nresources: [mr-1/kustomization.yaml, \"mr-2/kustomization.yaml\"]\n",
        );
        assert_eq!(
            m.entries(),
            vec!["mr-1/kustomization.yaml", "mr-2/kustomization.yaml"]
        );

        assert!(m.register("mr-3/kustomization.yaml"));
        assert_eq!(
            m.render(),
            "kind: Kustomization\nresources:\n  - mr-1/kustomization.yaml\n  - mr-2/kustomization.yaml\n  - mr-3/kustomization.yaml\n"
        );
    }

    #[test]
    fn header_with_trailing_comment_is_recognized() {
        let mut m = parse("resources:  # live overlays\n  - mr-1/kustomization.yaml\n");
        assert_eq!(m.entries(), vec!["mr-1/kustomization.yaml"]);

        assert!(m.register("mr-2/kustomization.yaml"));
        let text = m.render();
        assert_eq!(text.matches("resources:").count(), 1);
        assert!(text.starts_with("resources:  # live overlays\n"));
        serde_yaml::from_str::<serde_yaml::Value>(&text).unwrap();
    }

    #[test]
    fn unsupported_resources_shapes_are_rejected() {
        for text in [
            "resources: mr-1/kustomization.yaml\n",
            "resources: [\n  mr-1/kustomization.yaml\n]\n",
            "resources:\n  - a\nresources:\n  - b\n",
        ] {
            let result = Manifest::parse(Path::new("kustomization.yaml"), text);
            assert!(
                matches!(result, Err(ReconcileError::Parse(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn similar_keys_are_not_the_header() {
        let m = parse("resourcesExtra:\n  - x\nresources:\n  - y\n");
        assert_eq!(m.entries(), vec!["y"]);
    }

    #[test]
    fn unregister_removes_only_matching_item() {
        let mut m = parse(BASE);
        assert!(m.unregister("mr-1/kustomization.yaml"));
        assert!(!m.unregister("mr-1/kustomization.yaml"));
        assert_eq!(m.entries(), vec!["mr-2/kustomization.yaml"]);
    }

    #[test]
    fn prune_removes_header_only_when_empty() {
        let mut m = parse(BASE);
        assert!(!m.prune_empty_section());
        m.unregister("mr-1/kustomization.yaml");
        m.unregister("mr-2/kustomization.yaml");
        assert!(m.prune_empty_section());
        assert!(!m.has_resources_section());
        assert_eq!(
            m.render(),
            "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\n"
        );
    }

    #[test]
    fn save_writes_only_when_dirty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kustomization.yaml");
        std::fs::write(&path, BASE).unwrap();

        let mut m = Manifest::load(&path).unwrap();
        assert!(!m.save().unwrap());

        m.register("mr-3/kustomization.yaml");
        assert!(m.is_dirty());
        assert!(m.save().unwrap());
        assert!(!m.is_dirty());
        let reloaded = Manifest::load(&path).unwrap();
        assert!(reloaded.contains("mr-3/kustomization.yaml"));

        let value: serde_yaml::Value =
            serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["resources"].as_sequence().unwrap().len(), 3);
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let m = Manifest::load(&dir.path().join("kustomization.yaml")).unwrap();
        assert!(m.entries().is_empty());
        assert!(!m.has_resources_section());
    }
}
