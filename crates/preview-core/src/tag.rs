use crate::types::CommitRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an image tag is derived from a commit.
///
/// The build pipeline publishes images under the same stamp, so this must
/// agree with whatever the CI job uses when pushing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagStrategy {
    /// Commit timestamp as unix seconds.
    #[default]
    CommitTimestamp,
    /// First eight characters of the commit sha.
    ShortSha,
}

impl TagStrategy {
    pub fn derive(self, commit: &CommitRef) -> String {
        match self {
            TagStrategy::CommitTimestamp => commit.timestamp.timestamp().to_string(),
            TagStrategy::ShortSha => commit.sha.chars().take(8).collect(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TagStrategy::CommitTimestamp => "commit-timestamp",
            TagStrategy::ShortSha => "short-sha",
        }
    }
}

impl fmt::Display for TagStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn commit() -> CommitRef {
        CommitRef {
            sha: "0123456789abcdef".into(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn commit_timestamp_is_unix_seconds() {
        assert_eq!(TagStrategy::CommitTimestamp.derive(&commit()), "1700000000");
    }

    #[test]
    fn short_sha_truncates() {
        assert_eq!(TagStrategy::ShortSha.derive(&commit()), "01234567");
    }

    #[test]
    fn parses_kebab_case() {
        let s: TagStrategy = serde_yaml::from_str("short-sha").unwrap();
        assert_eq!(s, TagStrategy::ShortSha);
    }
}
