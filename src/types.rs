use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    #[default]
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        }
    }
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeMethod::Merge => write!(f, "Merge commit"),
            MergeMethod::Squash => write!(f, "Squash and merge"),
            MergeMethod::Rebase => write!(f, "Rebase and merge"),
        }
    }
}

/// CI rollup for the head commit of a PR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksStatus {
    Pending,
    Success,
    Failure,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrState::Open => write!(f, "Open"),
            PrState::Closed => write!(f, "Closed"),
            PrState::Merged => write!(f, "Merged"),
        }
    }
}

/// Enough to address a PR on the forge for mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl fmt::Display for PrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// A pull request as returned by a search. Replaced wholesale on each refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestRecord {
    /// Forge-wide database id; the status store is keyed by this.
    pub id: u64,
    pub repo_owner: String,
    pub repo_name: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub state: PrState,
    pub updated_at: DateTime<Utc>,
    pub author: String,
    /// `Some(false)` when the PR has merge conflicts, `None` while the forge is still computing.
    pub mergeable: Option<bool>,
    pub checks: ChecksStatus,
}

impl PullRequestRecord {
    pub fn pr_ref(&self) -> PrRef {
        PrRef {
            owner: self.repo_owner.clone(),
            repo: self.repo_name.clone(),
            number: self.number,
        }
    }

    /// Text form of `updated_at` used for change detection.
    pub fn update_stamp(&self) -> String {
        self.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn has_conflicts(&self) -> bool {
        self.mergeable == Some(false)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn pr(id: u64) -> PullRequestRecord {
        pr_at(id, 0)
    }

    /// A record whose `updated_at` is offset by `minutes` from a fixed epoch.
    pub fn pr_at(id: u64, minutes: i64) -> PullRequestRecord {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        PullRequestRecord {
            id,
            repo_owner: "acme".to_string(),
            repo_name: "widgets".to_string(),
            number: id,
            title: format!("PR {}", id),
            url: format!("https://github.com/acme/widgets/pull/{}", id),
            state: PrState::Open,
            updated_at: base + chrono::Duration::minutes(minutes),
            author: "octocat".to_string(),
            mergeable: Some(true),
            checks: ChecksStatus::None,
        }
    }
}
