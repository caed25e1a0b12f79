use crate::error::{ReconcileError, Result};
use crate::tag::TagStrategy;
use crate::types::Comment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// LayoutConfig
// ---------------------------------------------------------------------------

/// Where overlays live inside the config repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Directory (relative to the repository root) holding the reference
    /// overlay, every environment overlay and the aggregation manifest.
    #[serde(default = "default_overlay_dir")]
    pub overlay_dir: String,
    #[serde(default = "default_reference_dir")]
    pub reference_dir: String,
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// Values file inside each overlay that carries the image tag.
    #[serde(default = "default_values_file")]
    pub values_file: String,
}

fn default_overlay_dir() -> String {
    "apps/esap/mr".to_string()
}

fn default_reference_dir() -> String {
    "reference".to_string()
}

fn default_manifest_file() -> String {
    "kustomization.yaml".to_string()
}

fn default_values_file() -> String {
    "esap-values.yaml".to_string()
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            overlay_dir: default_overlay_dir(),
            reference_dir: default_reference_dir(),
            manifest_file: default_manifest_file(),
            values_file: default_values_file(),
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateConfig
// ---------------------------------------------------------------------------

/// Tokens rewritten when an overlay is cloned from the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Every occurrence becomes `<name_token>-<id>` in the cloned overlay.
    #[serde(default = "default_name_token")]
    pub name_token: String,
    /// Placeholder in the values file replaced by the derived image tag.
    #[serde(default = "default_tag_placeholder")]
    pub tag_placeholder: String,
    /// YAML key in the values file whose scalar value is the image tag.
    #[serde(default = "default_tag_key")]
    pub tag_key: String,
    #[serde(default)]
    pub tag_strategy: TagStrategy,
}

fn default_name_token() -> String {
    "esap-mr".to_string()
}

fn default_tag_placeholder() -> String {
    "__IMAGE_TAG__".to_string()
}

fn default_tag_key() -> String {
    "tag".to_string()
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            name_token: default_name_token(),
            tag_placeholder: default_tag_placeholder(),
            tag_key: default_tag_key(),
            tag_strategy: TagStrategy::default(),
        }
    }
}

impl TemplateConfig {
    pub fn name_for(&self, id: u64) -> String {
        format!("{}-{}", self.name_token, id)
    }
}

// ---------------------------------------------------------------------------
// ReportConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Leading marker that identifies the controller's status comment.
    #[serde(default = "default_comment_prefix")]
    pub comment_prefix: String,
    /// Optional public URL of an environment; `{id}` is substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_url_template: Option<String>,
    /// Account the controller comments as. When set, prefixed comments by
    /// anyone else are left alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_username: Option<String>,
}

fn default_comment_prefix() -> String {
    "**[MR Controller]**".to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            comment_prefix: default_comment_prefix(),
            env_url_template: None,
            bot_username: None,
        }
    }
}

impl ReportConfig {
    /// Whether `comment` is the controller's status comment. Comments without
    /// a reported author are judged by prefix alone.
    pub fn is_status_comment(&self, comment: &Comment) -> bool {
        if !comment.body.starts_with(&self.comment_prefix) {
            return false;
        }
        match (&self.bot_username, &comment.author) {
            (Some(bot), Some(author)) => bot == author,
            _ => true,
        }
    }

    pub fn env_url(&self, id: u64) -> Option<String> {
        self.env_url_template
            .as_ref()
            .map(|t| t.replace("{id}", &id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

/// Everything the reconciler needs, built once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Merge requests targeting this branch get a preview environment.
    #[serde(default = "default_target_branch")]
    pub target_branch: String,
    #[serde(default)]
    pub project_id: String,
    /// Overlay directory names are `<env_prefix><id>`.
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Rewrite the tag of live environments when a newer build succeeded.
    #[serde(default)]
    pub auto_update: bool,
    #[serde(default = "default_commit_prefix")]
    pub commit_prefix: String,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub template: TemplateConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

fn default_target_branch() -> String {
    "main".to_string()
}

fn default_env_prefix() -> String {
    "mr-".to_string()
}

fn default_interval_secs() -> u64 {
    120
}

fn default_commit_prefix() -> String {
    "[MR Controller]".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            target_branch: default_target_branch(),
            project_id: String::new(),
            env_prefix: default_env_prefix(),
            interval_secs: default_interval_secs(),
            auto_update: false,
            commit_prefix: default_commit_prefix(),
            layout: LayoutConfig::default(),
            template: TemplateConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ReconcileError::filesystem(path, e))?;
        let cfg: ControllerConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn env_name(&self, id: u64) -> String {
        format!("{}{}", self.env_prefix, id)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.project_id.trim().is_empty() {
            error("project_id is empty".to_string());
        }
        if self.target_branch.trim().is_empty() {
            error("target_branch is empty".to_string());
        }
        if self.env_prefix.is_empty() || self.env_prefix.contains('/') {
            error(format!(
                "env_prefix '{}' must be non-empty and contain no '/'",
                self.env_prefix
            ));
        }
        if self.interval_secs == 0 {
            error("interval_secs must be greater than zero".to_string());
        }
        if self.template.name_token.is_empty() || self.template.tag_placeholder.is_empty() {
            error("template tokens must be non-empty".to_string());
        }
        if self.layout.reference_dir.starts_with(&self.env_prefix)
            && self.layout.reference_dir[self.env_prefix.len()..]
                .parse::<u64>()
                .is_ok()
        {
            error(format!(
                "reference_dir '{}' collides with the environment naming scheme",
                self.layout.reference_dir
            ));
        }

        if self.interval_secs < 30 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "interval_secs={} is very short; every pass hits the GitLab API once per open merge request",
                    self.interval_secs
                ),
            });
        }
        if self.template.tag_placeholder.contains(&self.template.name_token) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "tag_placeholder contains name_token and will be rewritten by the name substitution"
                    .to_string(),
            });
        }

        warnings
    }

    /// Fail on any `Error`-level warning.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::InvalidConfig(errors.join("; ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
