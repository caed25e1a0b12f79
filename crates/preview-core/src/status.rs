use crate::types::{EnvironmentRecord, PipelineRun, PipelineStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// DeploymentStatus
// ---------------------------------------------------------------------------

/// Deployment state of one preview environment, recomputed every pass.
///
/// Transitions: `NotDeployed → Pending | UpdateAvailable | UpToDate | Desynchronized`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    NotDeployed,
    Pending,
    UpdateAvailable,
    UpToDate,
    Desynchronized,
}

impl DeploymentStatus {
    pub fn all() -> &'static [DeploymentStatus] {
        &[
            DeploymentStatus::NotDeployed,
            DeploymentStatus::Pending,
            DeploymentStatus::UpdateAvailable,
            DeploymentStatus::UpToDate,
            DeploymentStatus::Desynchronized,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::NotDeployed => "not_deployed",
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::UpdateAvailable => "update_available",
            DeploymentStatus::UpToDate => "up_to_date",
            DeploymentStatus::Desynchronized => "desynchronized",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Facts gathered for one merge request during a pass.
#[derive(Debug, Clone, Copy)]
pub struct StatusInput<'a> {
    /// Newest pipeline run, if any ran.
    pub pipeline: Option<&'a PipelineRun>,
    pub overlay: Option<&'a EnvironmentRecord>,
    /// Tag derived from the source commit of `pipeline`.
    pub latest_tag: &'a str,
}

/// Rules are checked in order; the first match wins.
pub fn resolve(input: StatusInput<'_>) -> DeploymentStatus {
    let Some(pipeline) = input.pipeline else {
        return DeploymentStatus::NotDeployed;
    };
    if pipeline.status.is_in_progress() {
        return DeploymentStatus::Pending;
    }
    let Some(overlay) = input.overlay else {
        return DeploymentStatus::NotDeployed;
    };
    match pipeline.status {
        PipelineStatus::Success if overlay.image_tag.as_deref() == Some(input.latest_tag) => {
            DeploymentStatus::UpToDate
        }
        PipelineStatus::Success => DeploymentStatus::UpdateAvailable,
        _ => DeploymentStatus::Desynchronized,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
