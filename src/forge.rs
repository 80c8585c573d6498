use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MergeMethod, PrRef, PullRequestRecord};

/// The remote side of the dashboard: where PRs come from and where
/// mutations go.
#[async_trait]
pub trait Forge: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Runs a PR search and returns at most `limit` records, in the order
    /// the forge returned them.
    async fn search_prs(&self, query: &str, limit: u32) -> Result<Vec<PullRequestRecord>>;

    async fn merge_pr(&self, pr: &PrRef, method: MergeMethod) -> Result<()>;

    /// Dispatches `workflow` in the PR's repository with a `pr_number` input.
    /// Without `git_ref` the repository's default branch is used.
    async fn trigger_workflow(&self, pr: &PrRef, workflow: &str, git_ref: Option<&str>)
        -> Result<()>;
}
