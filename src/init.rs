//! `wreckit init`: create `.wreckit/` in a version-controlled working copy.
//!
//! Check preconditions, create the directory tree, write placeholder files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::config::{Config, CONFIG_FILE, WRECKIT_DIR};

pub struct InitResult {
    pub wreckit_dir: PathBuf,
    pub created: bool,
}

/// Initialize `.wreckit/` under `project_dir`. Fails if the directory
/// already exists unless `force`; fails if `project_dir` is not inside a
/// git working copy.
pub fn init_project(project_dir: &Path, force: bool) -> Result<InitResult> {
    git2::Repository::discover(project_dir)
        .context("not a version-controlled repository (no .git found in any parent directory)")?;

    let wreckit_dir = project_dir.join(WRECKIT_DIR);
    if wreckit_dir.exists() && !force {
        bail!(
            "{} already exists; pass --force to reinitialize",
            wreckit_dir.display()
        );
    }

    std::fs::create_dir_all(wreckit_dir.join("items"))
        .with_context(|| format!("failed to create {}/items", wreckit_dir.display()))?;
    std::fs::create_dir_all(wreckit_dir.join("prompts"))
        .with_context(|| format!("failed to create {}/prompts", wreckit_dir.display()))?;

    let config_path = wreckit_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        let default_config = serde_json::json!({
            "base_branch": "main",
            "branch_prefix": "wreckit/",
            "parallel": 1,
            "agent": {
                "kind": "process",
                "command": "claude",
            },
        });
        std::fs::write(
            &config_path,
            serde_json::to_string_pretty(&default_config)?,
        )
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    }

    let healing_log_path = wreckit_dir.join("healing-log.jsonl");
    if !healing_log_path.exists() {
        std::fs::write(&healing_log_path, b"")
            .with_context(|| format!("failed to create {}", healing_log_path.display()))?;
    }

    Ok(InitResult {
        wreckit_dir,
        created: true,
    })
}

pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(WRECKIT_DIR).join(CONFIG_FILE).exists()
}

pub fn load_or_default_config(project_dir: &Path) -> Result<Config> {
    Config::load(project_dir)
}
