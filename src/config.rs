//! Layered configuration: `.wreckit/config.json` with an optional
//! `.wreckit/config.local.json` overlay taking precedence.
//!
//! A base file plus a local overlay that wins on conflicts, narrowed to a
//! plain two-JSON-file model rather than a wider file/env/CLI cascade.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::agent::AgentKind;
use crate::phase::{PhaseKind, ToolAllowlist};

pub const WRECKIT_DIR: &str = ".wreckit";
pub const CONFIG_FILE: &str = "config.json";
pub const CONFIG_LOCAL_FILE: &str = "config.local.json";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub kind: AgentKind,
    pub command: String,
    pub completion_signal: Option<String>,
    pub env: HashMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            kind: AgentKind::Process,
            command: "claude".into(),
            completion_signal: None,
            env: HashMap::new(),
        }
    }
}

/// A named skill record: a declared tool request list checked against the
/// owning phase's allowlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSpec {
    pub name: String,
    #[serde(default)]
    pub tools: Vec<String>,
}

/// Per-phase-type wall-clock deadlines.
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimeouts {
    pub research_seconds: u64,
    pub plan_seconds: u64,
    pub implement_seconds: u64,
    pub pr_seconds: u64,
    pub complete_seconds: u64,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        PhaseTimeouts {
            research_seconds: 600,
            plan_seconds: 600,
            implement_seconds: 1800,
            pr_seconds: 300,
            complete_seconds: 300,
        }
    }
}

impl PhaseTimeouts {
    pub fn for_phase(&self, phase: PhaseKind) -> std::time::Duration {
        let secs = match phase {
            PhaseKind::Research => self.research_seconds,
            PhaseKind::Plan => self.plan_seconds,
            PhaseKind::Implement => self.implement_seconds,
            PhaseKind::Pr => self.pr_seconds,
            PhaseKind::Complete => self.complete_seconds,
        };
        std::time::Duration::from_secs(secs)
    }
}

/// Fully resolved runtime configuration, merged from `config.json` and
/// `config.local.json`.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub wreckit_dir: PathBuf,
    pub base_branch: String,
    pub branch_prefix: String,
    pub timeout_seconds: PhaseTimeouts,
    pub parallel: usize,
    pub agent: AgentConfig,
    pub skills: HashMap<String, Vec<SkillSpec>>,
    /// Optional pluggable lightweight quality gate: a
    /// subprocess run against the working tree after each story; non-zero
    /// exit fails validation. Skipped entirely when unset.
    pub quality_gate_cmd: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            project_dir: PathBuf::from("."),
            wreckit_dir: PathBuf::from(WRECKIT_DIR),
            base_branch: "main".into(),
            branch_prefix: "wreckit/".into(),
            timeout_seconds: PhaseTimeouts::default(),
            parallel: 1,
            agent: AgentConfig::default(),
            skills: HashMap::new(),
            quality_gate_cmd: None,
        }
    }
}

/// On-disk shape of `config.json`/`config.local.json`. Every field is
/// optional so either file may set a subset of keys; the local file's
/// `Some` values override the base file's.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawConfig {
    base_branch: Option<String>,
    branch_prefix: Option<String>,
    timeout_seconds: Option<RawTimeouts>,
    parallel: Option<usize>,
    agent: Option<RawAgentConfig>,
    #[serde(default)]
    skills: HashMap<String, Vec<SkillSpec>>,
    quality_gate_cmd: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawTimeouts {
    research: Option<u64>,
    plan: Option<u64>,
    implement: Option<u64>,
    pr: Option<u64>,
    complete: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawAgentConfig {
    kind: Option<String>,
    command: Option<String>,
    completion_signal: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

fn merge_option<T>(base: Option<T>, overlay: Option<T>) -> Option<T> {
    overlay.or(base)
}

fn merge_raw(base: RawConfig, overlay: RawConfig) -> RawConfig {
    let timeouts = match (base.timeout_seconds, overlay.timeout_seconds) {
        (base_t, Some(overlay_t)) => Some(RawTimeouts {
            research: merge_option(base_t.as_ref().and_then(|t| t.research), overlay_t.research),
            plan: merge_option(base_t.as_ref().and_then(|t| t.plan), overlay_t.plan),
            implement: merge_option(base_t.as_ref().and_then(|t| t.implement), overlay_t.implement),
            pr: merge_option(base_t.as_ref().and_then(|t| t.pr), overlay_t.pr),
            complete: merge_option(base_t.as_ref().and_then(|t| t.complete), overlay_t.complete),
        }),
        (base_t, None) => base_t,
    };

    let agent = match (base.agent, overlay.agent) {
        (base_a, Some(overlay_a)) => {
            let mut env = base_a.as_ref().map(|a| a.env.clone()).unwrap_or_default();
            env.extend(overlay_a.env.clone());
            Some(RawAgentConfig {
                kind: merge_option(base_a.as_ref().and_then(|a| a.kind.clone()), overlay_a.kind),
                command: merge_option(base_a.as_ref().and_then(|a| a.command.clone()), overlay_a.command),
                completion_signal: merge_option(
                    base_a.as_ref().and_then(|a| a.completion_signal.clone()),
                    overlay_a.completion_signal,
                ),
                env,
            })
        }
        (base_a, None) => base_a,
    };

    let mut skills = base.skills;
    skills.extend(overlay.skills);

    RawConfig {
        base_branch: merge_option(base.base_branch, overlay.base_branch),
        branch_prefix: merge_option(base.branch_prefix, overlay.branch_prefix),
        timeout_seconds: timeouts,
        parallel: merge_option(base.parallel, overlay.parallel),
        agent,
        skills,
        quality_gate_cmd: merge_option(base.quality_gate_cmd, overlay.quality_gate_cmd),
    }
}

impl Config {
    /// Load `.wreckit/config.json`, overlaid by `.wreckit/config.local.json`
    /// if present. Fails if the base file is missing or invalid — callers
    /// should have run `init` first.
    pub fn load(project_dir: impl Into<PathBuf>) -> Result<Self> {
        let project_dir = project_dir
            .into()
            .canonicalize()
            .context("failed to resolve project directory")?;
        let wreckit_dir = project_dir.join(WRECKIT_DIR);
        let base_path = wreckit_dir.join(CONFIG_FILE);

        let base: RawConfig = read_json_file(&base_path)
            .with_context(|| format!("failed to load {}", base_path.display()))?;

        let local_path = wreckit_dir.join(CONFIG_LOCAL_FILE);
        let merged = if local_path.exists() {
            let overlay: RawConfig = read_json_file(&local_path)
                .with_context(|| format!("failed to load {}", local_path.display()))?;
            merge_raw(base, overlay)
        } else {
            base
        };

        Ok(Config::from_raw(project_dir, wreckit_dir, merged))
    }

    fn from_raw(project_dir: PathBuf, wreckit_dir: PathBuf, raw: RawConfig) -> Self {
        let defaults = PhaseTimeouts::default();
        let timeout_seconds = raw
            .timeout_seconds
            .map(|t| PhaseTimeouts {
                research_seconds: t.research.unwrap_or(defaults.research_seconds),
                plan_seconds: t.plan.unwrap_or(defaults.plan_seconds),
                implement_seconds: t.implement.unwrap_or(defaults.implement_seconds),
                pr_seconds: t.pr.unwrap_or(defaults.pr_seconds),
                complete_seconds: t.complete.unwrap_or(defaults.complete_seconds),
            })
            .unwrap_or(defaults);

        let agent_defaults = AgentConfig::default();
        let agent = raw
            .agent
            .map(|a| AgentConfig {
                kind: a
                    .kind
                    .as_deref()
                    .and_then(|k| k.parse().ok())
                    .unwrap_or(agent_defaults.kind),
                command: a.command.unwrap_or(agent_defaults.command.clone()),
                completion_signal: a.completion_signal,
                env: a.env,
            })
            .unwrap_or(agent_defaults);

        Config {
            project_dir,
            wreckit_dir,
            base_branch: raw.base_branch.unwrap_or_else(|| "main".into()),
            branch_prefix: raw.branch_prefix.unwrap_or_else(|| "wreckit/".into()),
            timeout_seconds,
            parallel: raw.parallel.unwrap_or(1),
            agent,
            skills: raw.skills,
            quality_gate_cmd: raw.quality_gate_cmd,
        }
    }

    pub fn items_dir(&self) -> PathBuf {
        self.wreckit_dir.join("items")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.wreckit_dir.join("prompts")
    }

    /// Check a skill's requested tools against its owning phase's allowlist.
    /// Mismatches are non-fatal; callers log a warning.
    pub fn skill_tool_mismatches(&self, phase: PhaseKind, skill: &SkillSpec) -> Vec<String> {
        let allowlist = phase.def().allowlist;
        skill
            .tools
            .iter()
            .filter(|tool| !tool_permitted(allowlist, tool))
            .cloned()
            .collect()
    }
}

fn tool_permitted(allowlist: ToolAllowlist, tool: &str) -> bool {
    match allowlist {
        ToolAllowlist::ReadOnly => matches!(tool, "read" | "search" | "grep" | "glob"),
        ToolAllowlist::PlanWrite => matches!(tool, "read" | "search" | "grep" | "glob" | "write_plan"),
        ToolAllowlist::ImplementFull => true,
        ToolAllowlist::HostOnly => matches!(tool, "read" | "host"),
        ToolAllowlist::Sandboxed => false,
    }
}

fn read_json_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}
