//! Reads and rewrites the image tag recorded in an overlay's values file.

use crate::config::TemplateConfig;
use crate::error::{ReconcileError, Result};
use crate::io;
use regex::Regex;
use std::path::Path;

fn tag_re(key: &str) -> Result<Regex> {
    Regex::new(&format!(
        r#"(?m)^([ \t]*{}:[ \t]*)(["']?)([^"'\s#]+)(["']?)"#,
        regex::escape(key)
    ))
    .map_err(|e| ReconcileError::Parse(format!("invalid tag key '{key}': {e}")))
}

/// The tag currently recorded in `path`, or `None` if the file still holds
/// the placeholder or has no tag key.
pub fn read_tag(path: &Path, template: &TemplateConfig) -> Result<Option<String>> {
    let content = io::read_text(path)?;
    let re = tag_re(&template.tag_key)?;
    Ok(re
        .captures(&content)
        .map(|c| c[3].to_string())
        .filter(|tag| *tag != template.tag_placeholder))
}

/// Replace the value of the first tag key in `path` with `tag`, keeping
/// indentation and quoting. Returns `false` when the file has no tag key or
/// already records `tag`.
pub fn write_tag(path: &Path, template: &TemplateConfig, tag: &str) -> Result<bool> {
    let content = io::read_text(path)?;
    let re = tag_re(&template.tag_key)?;
    let Some(caps) = re.captures(&content) else {
        return Ok(false);
    };
    if &caps[3] == tag {
        return Ok(false);
    }
    let updated = re.replacen(&content, 1, |c: &regex::Captures| {
        format!("{}{}{}{}", &c[1], &c[2], tag, &c[4])
    });
    io::atomic_write(path, updated.as_bytes())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALUES: &str = "esap:\n  name: esap-mr-3\n  image:\n    repository: registry.example.org/esap\n    tag: \"__IMAGE_TAG__\"\n";

    fn write(dir: &TempDir, text: &str) -> std::path::PathBuf {
        let path = dir.path().join("esap-values.yaml");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn placeholder_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, VALUES);
        assert_eq!(read_tag(&path, &TemplateConfig::default()).unwrap(), None);
    }

    #[test]
    fn write_then_read_tag() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, VALUES);
        let template = TemplateConfig::default();

        assert!(write_tag(&path, &template, "1700000000").unwrap());
        assert_eq!(
            read_tag(&path, &template).unwrap().as_deref(),
            Some("1700000000")
        );
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("    tag: \"1700000000\"\n"));
        assert!(!write_tag(&path, &template, "1700000000").unwrap());
    }

    #[test]
    fn unquoted_tag_is_read() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "image:\n  tag: 101 # pinned\n");
        assert_eq!(
            read_tag(&path, &TemplateConfig::default()).unwrap().as_deref(),
            Some("101")
        );
    }

    #[test]
    fn missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "image:\n  repository: x\n");
        let template = TemplateConfig::default();
        assert_eq!(read_tag(&path, &template).unwrap(), None);
        assert!(!write_tag(&path, &template, "5").unwrap());
    }
}
