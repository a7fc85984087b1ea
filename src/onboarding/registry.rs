//! Stage registry — the ordered stage list of every flow kind.
//!
//! This is the only place that decides whether a stage value is legal for a
//! flow. The tables are `static` and never change at runtime.

use crate::error::OnboardingError;

use super::stage::{AgencyStage, FlowKind, IndividualStage, OrganizationStage, Stage};

static ORGANIZATION_STAGES: &[Stage] = &[
    Stage::Organization(OrganizationStage::OrganizationDetails),
    Stage::Organization(OrganizationStage::TeamInvites),
    Stage::Organization(OrganizationStage::Billing),
    Stage::Organization(OrganizationStage::Complete),
];

static INDIVIDUAL_STAGES: &[Stage] = &[
    Stage::Individual(IndividualStage::PersonalProfile),
    Stage::Individual(IndividualStage::Skills),
    Stage::Individual(IndividualStage::Preferences),
    Stage::Individual(IndividualStage::Complete),
];

static AGENCY_STAGES: &[Stage] = &[
    Stage::Agency(AgencyStage::AgencyDetails),
    Stage::Agency(AgencyStage::ClientOrganizations),
    Stage::Agency(AgencyStage::TeamInvites),
    Stage::Agency(AgencyStage::Complete),
];

/// Result of asking for the successor of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStage {
    /// The successor is an ordinary stage.
    Intermediate(Stage),
    /// The successor is the flow's terminal stage.
    Terminal(Stage),
}

impl NextStage {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Intermediate(s) | Self::Terminal(s) => *s,
        }
    }
}

/// Ordered stages of a flow, first to terminal.
pub fn stages_for(flow_kind: FlowKind) -> &'static [Stage] {
    match flow_kind {
        FlowKind::Organization => ORGANIZATION_STAGES,
        FlowKind::Individual => INDIVIDUAL_STAGES,
        FlowKind::Agency => AGENCY_STAGES,
    }
}

/// Number of stages (and therefore steps) in a flow.
pub fn total_steps(flow_kind: FlowKind) -> u32 {
    stages_for(flow_kind).len() as u32
}

pub fn first_stage(flow_kind: FlowKind) -> Stage {
    stages_for(flow_kind)[0]
}

pub fn terminal_stage(flow_kind: FlowKind) -> Stage {
    let stages = stages_for(flow_kind);
    stages[stages.len() - 1]
}

/// 1-based step index of `stage` within `flow_kind`.
pub fn index_of(flow_kind: FlowKind, stage: Stage) -> Result<u32, OnboardingError> {
    stages_for(flow_kind)
        .iter()
        .position(|s| *s == stage)
        .map(|pos| pos as u32 + 1)
        .ok_or_else(|| OnboardingError::UnknownStageValue {
            flow_kind,
            value: stage.as_str().to_string(),
        })
}

/// Successor of `stage`. Fails if `stage` is terminal or not in the flow.
pub fn next_stage(flow_kind: FlowKind, stage: Stage) -> Result<NextStage, OnboardingError> {
    let index = index_of(flow_kind, stage)? as usize;
    let stages = stages_for(flow_kind);
    match stages.get(index) {
        Some(next) if next.is_terminal() => Ok(NextStage::Terminal(*next)),
        Some(next) => Ok(NextStage::Intermediate(*next)),
        None => Err(OnboardingError::InvalidStageTransition {
            flow_kind,
            stage: stage.as_str().to_string(),
            reason: "stage is terminal".to_string(),
        }),
    }
}

/// Whether `from → to` is a single forward step inside `flow_kind`.
pub fn can_transition(flow_kind: FlowKind, from: Stage, to: Stage) -> bool {
    match next_stage(flow_kind, from) {
        Ok(next) => next.stage() == to,
        Err(_) => false,
    }
}

/// Parse a persisted or submitted stage string for `flow_kind`.
///
/// Anything outside the flow's vocabulary, including legacy spellings, is
/// rejected with `UnknownStageValue`.
pub fn parse_stage(flow_kind: FlowKind, value: &str) -> Result<Stage, OnboardingError> {
    let unknown = || OnboardingError::UnknownStageValue {
        flow_kind,
        value: value.to_string(),
    };
    match flow_kind {
        FlowKind::Organization => value
            .parse::<OrganizationStage>()
            .map(Stage::Organization)
            .map_err(|_| unknown()),
        FlowKind::Individual => value
            .parse::<IndividualStage>()
            .map(Stage::Individual)
            .map_err(|_| unknown()),
        FlowKind::Agency => value
            .parse::<AgencyStage>()
            .map(Stage::Agency)
            .map_err(|_| unknown()),
    }
}
