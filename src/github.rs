use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, WatchtowerError};
use crate::forge::Forge;
use crate::types::{ChecksStatus, MergeMethod, PrRef, PrState, PullRequestRecord};

const API_BASE: &str = "https://api.github.com";

/// One round trip per query: the search plus mergeability and the CI rollup
/// of the head commit.
const SEARCH_QUERY: &str = r#"
query($q: String!, $n: Int!) {
  search(query: $q, type: ISSUE, first: $n) {
    nodes {
      ... on PullRequest {
        databaseId
        number
        title
        url
        state
        updatedAt
        author { login }
        repository { name owner { login } }
        mergeable
        commits(last: 1) { nodes { commit { statusCheckRollup { state } } } }
      }
    }
  }
}
"#;

pub struct GitHub {
    client: Octocrab,
    http: reqwest::Client,
    token: String,
}

impl std::fmt::Debug for GitHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHub").finish_non_exhaustive()
    }
}

impl From<octocrab::Error> for WatchtowerError {
    fn from(err: octocrab::Error) -> Self {
        WatchtowerError::Fetch(err.to_string())
    }
}

impl GitHub {
    pub fn new(token: String) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.clone())
            .build()
            .map_err(|e| WatchtowerError::Auth(e.to_string()))?;

        Ok(Self {
            client,
            http: reqwest::Client::new(),
            token,
        })
    }

    async fn default_branch(&self, owner: &str, repo: &str) -> Result<String> {
        let repository = self
            .client
            .repos(owner, repo)
            .get()
            .await
            .map_err(|e| WatchtowerError::Action(e.to_string()))?;
        Ok(repository
            .default_branch
            .unwrap_or_else(|| "main".to_string()))
    }
}

#[async_trait]
impl Forge for GitHub {
    fn name(&self) -> &str {
        "GitHub"
    }

    async fn search_prs(&self, query: &str, limit: u32) -> Result<Vec<PullRequestRecord>> {
        let q = search_query(query);
        debug!(query = %q, limit, "searching pull requests");

        let payload = serde_json::json!({
            "query": SEARCH_QUERY,
            "variables": { "q": q, "n": limit.min(100) },
        });
        let response: serde_json::Value = self.client.graphql(&payload).await?;
        parse_search_response(response)
    }

    async fn merge_pr(&self, pr: &PrRef, method: MergeMethod) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/merge",
            API_BASE, pr.owner, pr.repo, pr.number
        );
        let body = serde_json::json!({ "merge_method": method.as_api_str() });
        let response = self
            .http
            .put(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "watchtower")
            .json(&body)
            .send()
            .await
            .map_err(|e| WatchtowerError::Action(e.to_string()))?;

        if !response.status().is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(WatchtowerError::Action(format!(
                "Merge of {} failed: {}",
                pr, text
            )));
        }
        Ok(())
    }

    async fn trigger_workflow(
        &self,
        pr: &PrRef,
        workflow: &str,
        git_ref: Option<&str>,
    ) -> Result<()> {
        let git_ref = match git_ref {
            Some(r) => r.to_string(),
            None => self.default_branch(&pr.owner, &pr.repo).await?,
        };

        let url = format!(
            "{}/repos/{}/{}/actions/workflows/{}/dispatches",
            API_BASE, pr.owner, pr.repo, workflow
        );
        let body = serde_json::json!({
            "ref": git_ref,
            "inputs": { "pr_number": pr.number.to_string() },
        });
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "watchtower")
            .json(&body)
            .send()
            .await
            .map_err(|e| WatchtowerError::Action(e.to_string()))?;

        if !response.status().is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(WatchtowerError::Action(format!(
                "Dispatch of {} for {} failed: {}",
                workflow, pr, text
            )));
        }
        Ok(())
    }
}

/// The search API needs `is:pr` to restrict results to pull requests.
fn search_query(query: &str) -> String {
    let restricted = query
        .split_whitespace()
        .any(|term| term == "is:pr" || term == "type:pr");
    if restricted {
        query.trim().to_string()
    } else {
        format!("is:pr {}", query.trim())
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    data: Option<SearchData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct SearchData {
    search: SearchConnection,
}

#[derive(Deserialize)]
struct SearchConnection {
    nodes: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct Login {
    login: String,
}

#[derive(Deserialize)]
struct RepoNode {
    name: String,
    owner: Login,
}

#[derive(Deserialize)]
struct CommitConnection {
    nodes: Vec<CommitNode>,
}

#[derive(Deserialize)]
struct CommitNode {
    commit: CommitInner,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitInner {
    status_check_rollup: Option<Rollup>,
}

#[derive(Deserialize)]
struct Rollup {
    state: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrNode {
    database_id: u64,
    number: u64,
    title: String,
    url: String,
    state: String,
    updated_at: DateTime<Utc>,
    author: Option<Login>,
    repository: RepoNode,
    mergeable: Option<String>,
    commits: Option<CommitConnection>,
}

impl From<PrNode> for PullRequestRecord {
    fn from(node: PrNode) -> Self {
        let checks = node
            .commits
            .and_then(|c| c.nodes.into_iter().next())
            .and_then(|n| n.commit.status_check_rollup)
            .map(|r| match r.state.as_str() {
                "SUCCESS" => ChecksStatus::Success,
                "FAILURE" | "ERROR" => ChecksStatus::Failure,
                "PENDING" | "EXPECTED" => ChecksStatus::Pending,
                _ => ChecksStatus::None,
            })
            .unwrap_or_default();

        PullRequestRecord {
            id: node.database_id,
            repo_owner: node.repository.owner.login,
            repo_name: node.repository.name,
            number: node.number,
            title: node.title,
            url: node.url,
            state: match node.state.as_str() {
                "MERGED" => PrState::Merged,
                "CLOSED" => PrState::Closed,
                _ => PrState::Open,
            },
            updated_at: node.updated_at,
            // Deleted accounts come back as a null author.
            author: node
                .author
                .map(|a| a.login)
                .unwrap_or_else(|| "ghost".to_string()),
            mergeable: match node.mergeable.as_deref() {
                Some("MERGEABLE") => Some(true),
                Some("CONFLICTING") => Some(false),
                _ => None,
            },
            checks,
        }
    }
}

fn parse_search_response(response: serde_json::Value) -> Result<Vec<PullRequestRecord>> {
    let response: SearchResponse = serde_json::from_value(response)
        .map_err(|e| WatchtowerError::Fetch(format!("malformed search response: {}", e)))?;

    if !response.errors.is_empty() {
        let messages: Vec<_> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(WatchtowerError::Fetch(messages.join("; ")));
    }

    let data = response
        .data
        .ok_or_else(|| WatchtowerError::Fetch("search response has no data".to_string()))?;

    let mut prs = Vec::with_capacity(data.search.nodes.len());
    for node in data.search.nodes {
        // Issues matched by a loose query come back as empty objects.
        if node.as_object().is_some_and(|o| o.is_empty()) {
            continue;
        }
        let node: PrNode = serde_json::from_value(node)
            .map_err(|e| WatchtowerError::Fetch(format!("malformed search response: {}", e)))?;
        prs.push(PullRequestRecord::from(node));
    }
    Ok(prs)
}
