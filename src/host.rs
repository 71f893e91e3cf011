//! Pull-request host operations: out of scope as a feature, so only the
//! boundary is implemented here. `GhCliHost` shells out to the `gh` CLI,
//! the same subprocess-invocation idiom the process agent transport uses,
//! rather than pulling in an HTTP client for a collaborator treated as
//! external.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::errors::PhaseError;

#[derive(Debug, Clone)]
pub struct PrInfo {
    pub url: String,
    pub number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    Open,
    MergedDirect,
    MergedViaPr,
    Closed,
}

pub trait PrHost: Send + Sync {
    /// Open a PR for `branch` against `base`, or update it if one already
    /// exists for this branch.
    fn open_or_update_pr(
        &self,
        repo_dir: &Path,
        branch: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PrInfo, PhaseError>;

    /// Observe whether a PR has merged, and how.
    fn detect_merge(&self, repo_dir: &Path, pr_number: u64) -> Result<MergeStatus, PhaseError>;
}

pub struct GhCliHost;

#[derive(Debug, Deserialize)]
struct GhPrView {
    url: String,
    number: u64,
    state: String,
    #[serde(rename = "mergeCommit")]
    merge_commit: Option<GhMergeCommit>,
}

#[derive(Debug, Deserialize)]
struct GhMergeCommit {
    oid: String,
}

impl PrHost for GhCliHost {
    fn open_or_update_pr(
        &self,
        repo_dir: &Path,
        branch: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PrInfo, PhaseError> {
        let existing = Command::new("gh")
            .args(["pr", "view", branch, "--json", "url,number,state"])
            .current_dir(repo_dir)
            .output()
            .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to invoke gh: {e}")))?;

        if existing.status.success() {
            let view: GhPrView = serde_json::from_slice(&existing.stdout)
                .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to parse gh pr view output: {e}")))?;
            return Ok(PrInfo {
                url: view.url,
                number: view.number,
            });
        }

        let created = Command::new("gh")
            .args([
                "pr", "create", "--head", branch, "--base", base, "--title", title, "--body", body,
            ])
            .current_dir(repo_dir)
            .output()
            .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to invoke gh pr create: {e}")))?;

        if !created.status.success() {
            return Err(PhaseError::Other(anyhow::anyhow!(
                "gh pr create failed: {}",
                String::from_utf8_lossy(&created.stderr)
            )));
        }

        let url = String::from_utf8_lossy(&created.stdout).trim().to_string();
        let number = url
            .rsplit('/')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Ok(PrInfo { url, number })
    }

    fn detect_merge(&self, repo_dir: &Path, pr_number: u64) -> Result<MergeStatus, PhaseError> {
        let output = Command::new("gh")
            .args([
                "pr",
                "view",
                &pr_number.to_string(),
                "--json",
                "url,number,state,mergeCommit",
            ])
            .current_dir(repo_dir)
            .output()
            .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to invoke gh: {e}")))?;

        if !output.status.success() {
            return Err(PhaseError::Other(anyhow::anyhow!(
                "gh pr view failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let view: GhPrView = serde_json::from_slice(&output.stdout)
            .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to parse gh pr view output: {e}")))?;

        Ok(match view.state.as_str() {
            "OPEN" => MergeStatus::Open,
            "MERGED" if view.merge_commit.is_some() => MergeStatus::MergedViaPr,
            "MERGED" => MergeStatus::MergedDirect,
            _ => MergeStatus::Closed,
        })
    }
}
