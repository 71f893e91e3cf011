//! Version-control operations: branch management, working-tree snapshot/diff
//! (used for scope enforcement), and the destructive rollback path.
//!
//! `snapshot` stages and commits the working tree to get a comparison
//! point; `compute_changes` diffs the working tree against that snapshot
//! via `git2::Diff`.

use std::path::{Path, PathBuf};

use git2::{DiffOptions, Repository, Signature};

use crate::errors::PhaseError;

/// Files touched since a snapshot, by how.
#[derive(Debug, Clone, Default)]
pub struct ChangeSummary {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn all_paths(&self) -> Vec<PathBuf> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
            .cloned()
            .collect()
    }
}

fn signature() -> Result<Signature<'static>, PhaseError> {
    Signature::now("wreckit", "wreckit@localhost")
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to build git signature: {e}")))
}

/// Stage the full working tree and commit it, returning the new HEAD sha.
/// Used as a comparison point before a phase runs (the `plan` phase's
/// artifact-only enforcement) or before a story (the implement loop's
/// per-story scope check).
pub fn snapshot(repo_path: &Path) -> Result<String, PhaseError> {
    let repo = Repository::open(repo_path)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to open repository: {e}")))?;

    let mut index = repo
        .index()
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to open index: {e}")))?;
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to stage working tree: {e}")))?;
    index
        .write()
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to write index: {e}")))?;
    let tree_id = index
        .write_tree()
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to write tree: {e}")))?;
    let tree = repo
        .find_tree(tree_id)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to find tree: {e}")))?;

    let sig = signature()?;
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    let commit_id = repo
        .commit(Some("HEAD"), &sig, &sig, "wreckit snapshot", &tree, &parents)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to commit snapshot: {e}")))?;

    Ok(commit_id.to_string())
}

/// Diff the current working tree against `before_sha`, classifying each
/// changed path as added/modified/deleted.
pub fn compute_changes(repo_path: &Path, before_sha: &str) -> Result<ChangeSummary, PhaseError> {
    let repo = Repository::open(repo_path)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to open repository: {e}")))?;
    let before_oid = git2::Oid::from_str(before_sha)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("invalid snapshot sha: {e}")))?;
    let before_commit = repo
        .find_commit(before_oid)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("snapshot commit not found: {e}")))?;
    let before_tree = before_commit
        .tree()
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to read snapshot tree: {e}")))?;

    let mut opts = DiffOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);

    let diff = repo
        .diff_tree_to_workdir_with_index(Some(&before_tree), Some(&mut opts))
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to diff working tree: {e}")))?;

    let mut summary = ChangeSummary::default();
    diff.foreach(
        &mut |delta, _| {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(Path::to_path_buf);
            if let Some(path) = path {
                match delta.status() {
                    git2::Delta::Added | git2::Delta::Untracked => summary.added.push(path),
                    git2::Delta::Deleted => summary.deleted.push(path),
                    _ => summary.modified.push(path),
                }
            }
            true
        },
        None,
        None,
        None,
    )
    .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to walk diff: {e}")))?;

    Ok(summary)
}

/// Lines added to the working tree since `before_sha`, newline-joined,
/// stripped of diff markup beyond the leading `+`. Used by the implement
/// loop's secret scan.
pub fn added_lines_since(repo_path: &Path, before_sha: &str) -> Result<String, PhaseError> {
    let repo = Repository::open(repo_path)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to open repository: {e}")))?;
    let before_oid = git2::Oid::from_str(before_sha)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("invalid snapshot sha: {e}")))?;
    let before_commit = repo
        .find_commit(before_oid)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("snapshot commit not found: {e}")))?;
    let before_tree = before_commit
        .tree()
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to read snapshot tree: {e}")))?;

    let mut opts = DiffOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    let diff = repo
        .diff_tree_to_workdir_with_index(Some(&before_tree), Some(&mut opts))
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to diff working tree: {e}")))?;

    let mut added = String::new();
    diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+') {
            if let Ok(content) = std::str::from_utf8(line.content()) {
                added.push_str(content);
            }
        }
        true
    })
    .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to render diff: {e}")))?;

    Ok(added)
}

/// Create and check out a new branch off `base_branch` for an item.
pub fn create_item_branch(repo_path: &Path, branch_name: &str, base_branch: &str) -> Result<(), PhaseError> {
    let repo = Repository::open(repo_path)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to open repository: {e}")))?;
    let base_ref = repo
        .find_branch(base_branch, git2::BranchType::Local)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("base branch {base_branch} not found: {e}")))?;
    let base_commit = base_ref
        .get()
        .peel_to_commit()
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to resolve base branch tip: {e}")))?;

    repo.branch(branch_name, &base_commit, false)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to create branch {branch_name}: {e}")))?;

    let obj = repo
        .revparse_single(&format!("refs/heads/{branch_name}"))
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to resolve new branch: {e}")))?;
    repo.checkout_tree(&obj, None)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to checkout {branch_name}: {e}")))?;
    repo.set_head(&format!("refs/heads/{branch_name}"))
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to set HEAD to {branch_name}: {e}")))?;
    Ok(())
}

/// Force-reset `base_branch` to `rollback_sha` (`rollback` is explicit and
/// destructive — the caller is responsible for any confirmation prompt
/// before calling this).
pub fn force_reset_branch(repo_path: &Path, base_branch: &str, rollback_sha: &str) -> Result<(), PhaseError> {
    let repo = Repository::open(repo_path)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to open repository: {e}")))?;
    let oid = git2::Oid::from_str(rollback_sha)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("invalid rollback sha: {e}")))?;
    let commit = repo
        .find_commit(oid)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("rollback commit not found: {e}")))?;

    let mut branch_ref = repo
        .find_branch(base_branch, git2::BranchType::Local)
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("base branch {base_branch} not found: {e}")))?;
    branch_ref
        .get_mut()
        .set_target(commit.id(), "wreckit rollback")
        .map_err(|e| PhaseError::Other(anyhow::anyhow!("failed to force-reset {base_branch}: {e}")))?;
    Ok(())
}
