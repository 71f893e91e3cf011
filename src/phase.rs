//! The fixed phase table and transition-validity rule.
//!
//! `ToolAllowlist` is a small closed enum attached to each phase, the same
//! shape as a permission-mode table, but carries five tool-scope
//! categories rather than interactive strict/standard/autonomous/readonly
//! modes.

use crate::item::ItemState;

/// The five phases an item moves through. `Display`/`FromStr` back the
/// `phase <phase> <id>` CLI surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    Research,
    Plan,
    Implement,
    Pr,
    Complete,
}

impl PhaseKind {
    pub const ALL: [PhaseKind; 5] = [
        PhaseKind::Research,
        PhaseKind::Plan,
        PhaseKind::Implement,
        PhaseKind::Pr,
        PhaseKind::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Research => "research",
            PhaseKind::Plan => "plan",
            PhaseKind::Implement => "implement",
            PhaseKind::Pr => "pr",
            PhaseKind::Complete => "complete",
        }
    }

    pub fn def(&self) -> &'static PhaseDef {
        PHASE_TABLE.iter().find(|d| d.kind == *self).expect("every PhaseKind has a PHASE_TABLE entry")
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized phase: {0}")]
pub struct ParsePhaseKindError(String);

impl std::str::FromStr for PhaseKind {
    type Err = ParsePhaseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "research" => Ok(PhaseKind::Research),
            "plan" => Ok(PhaseKind::Plan),
            "implement" => Ok(PhaseKind::Implement),
            "pr" => Ok(PhaseKind::Pr),
            "complete" => Ok(PhaseKind::Complete),
            other => Err(ParsePhaseKindError(other.to_string())),
        }
    }
}

/// What the agent may touch during a phase. The excluded
/// external collaborators (media/learn/genetic) get `Sandboxed`; nothing in
/// the core pipeline uses it today, but the variant documents the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolAllowlist {
    ReadOnly,
    PlanWrite,
    ImplementFull,
    HostOnly,
    Sandboxed,
}

pub struct PhaseDef {
    pub kind: PhaseKind,
    pub starting_states: &'static [ItemState],
    pub target_state: ItemState,
    pub skip_if_already_target: bool,
    pub produces: &'static str,
    pub allowlist: ToolAllowlist,
}

pub static PHASE_TABLE: &[PhaseDef] = &[
    PhaseDef {
        kind: PhaseKind::Research,
        starting_states: &[ItemState::Raw],
        target_state: ItemState::Researched,
        skip_if_already_target: true,
        produces: "research report",
        allowlist: ToolAllowlist::ReadOnly,
    },
    PhaseDef {
        kind: PhaseKind::Plan,
        starting_states: &[ItemState::Researched],
        target_state: ItemState::Planned,
        skip_if_already_target: true,
        produces: "plan markdown + plan document",
        allowlist: ToolAllowlist::PlanWrite,
    },
    PhaseDef {
        kind: PhaseKind::Implement,
        starting_states: &[ItemState::Planned, ItemState::Implementing],
        target_state: ItemState::Implementing,
        skip_if_already_target: false,
        produces: "code changes, story status flips",
        allowlist: ToolAllowlist::ImplementFull,
    },
    PhaseDef {
        kind: PhaseKind::Pr,
        starting_states: &[ItemState::Implementing],
        target_state: ItemState::InPr,
        skip_if_already_target: true,
        produces: "branch pushed, PR opened/updated",
        allowlist: ToolAllowlist::HostOnly,
    },
    PhaseDef {
        kind: PhaseKind::Complete,
        starting_states: &[ItemState::InPr],
        target_state: ItemState::Done,
        skip_if_already_target: true,
        produces: "merge observed, rollback_sha set if direct-merge",
        allowlist: ToolAllowlist::HostOnly,
    },
];

/// Outcome of checking whether `phase` may run against `current`: the
/// transition-validity rule plus the idempotence/skip policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionDecision {
    /// Already at or past the target for a skip-eligible phase: no-op.
    Skip,
    /// Starting state permits this phase; proceed.
    Run,
    /// The transition is not permitted; carries a human-readable reason.
    Invalid(String),
}

/// Decide whether `phase` may run against an item currently in `current`.
/// `force` bypasses the skip-on-artifact no-op (still subject to the
/// underlying validity rule) — the CLI's `--force` flag.
pub fn decide_transition(current: ItemState, phase: PhaseKind, force: bool) -> TransitionDecision {
    let def = phase.def();

    if current == ItemState::Done && phase != PhaseKind::Complete {
        return TransitionDecision::Invalid(format!(
            "item is done; only rollback or the complete phase may apply, not {phase}"
        ));
    }

    if current > def.target_state {
        return TransitionDecision::Invalid(format!(
            "{phase} targets {target}, which the item ({current}) has already passed",
            target = def.target_state
        ));
    }

    if current == def.target_state {
        if def.skip_if_already_target && !force {
            return TransitionDecision::Skip;
        }
        // implement's skip_if_already_target == false: resumable, falls
        // through to the starting-states check below.
        if force {
            return TransitionDecision::Run;
        }
    }

    if def.starting_states.contains(&current) {
        TransitionDecision::Run
    } else {
        TransitionDecision::Invalid(format!(
            "{phase} requires one of {:?}, item is {current}",
            def.starting_states
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn phase_kind_round_trips_through_its_string_form() {
        for kind in PhaseKind::ALL {
            assert_eq!(PhaseKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn research_runs_from_raw_and_is_skipped_once_researched() {
        assert_eq!(
            decide_transition(ItemState::Raw, PhaseKind::Research, false),
            TransitionDecision::Run
        );
        assert_eq!(
            decide_transition(ItemState::Researched, PhaseKind::Research, false),
            TransitionDecision::Skip
        );
    }

    #[test]
    fn force_bypasses_skip_on_artifact() {
        assert_eq!(
            decide_transition(ItemState::Researched, PhaseKind::Research, true),
            TransitionDecision::Run
        );
    }

    #[test]
    fn implement_is_resumable_not_skipped_when_already_implementing() {
        assert_eq!(
            decide_transition(ItemState::Implementing, PhaseKind::Implement, false),
            TransitionDecision::Run
        );
    }

    #[test]
    fn phases_are_monotone_past_states_are_invalid() {
        assert!(matches!(
            decide_transition(ItemState::Implementing, PhaseKind::Research, false),
            TransitionDecision::Invalid(_)
        ));
    }

    #[test]
    fn done_items_reject_every_phase_but_complete() {
        assert!(matches!(
            decide_transition(ItemState::Done, PhaseKind::Research, false),
            TransitionDecision::Invalid(_)
        ));
        assert_eq!(
            decide_transition(ItemState::Done, PhaseKind::Complete, false),
            TransitionDecision::Skip
        );
    }

    #[test]
    fn wrong_starting_state_is_invalid() {
        assert!(matches!(
            decide_transition(ItemState::Raw, PhaseKind::Plan, false),
            TransitionDecision::Invalid(_)
        ));
    }
}
