//! Flow router — which step UI to render for a persisted record.

use crate::error::OnboardingError;

use super::model::{OnboardingProgress, StepId};
use super::registry;
use super::stage::{AgencyStage, FlowKind, IndividualStage, OrganizationStage, Stage};

/// Step for a stage. Exhaustive over every flow's vocabulary.
pub fn step_for(stage: Stage) -> StepId {
    match stage {
        Stage::Organization(s) => match s {
            OrganizationStage::OrganizationDetails => StepId::OrganizationDetails,
            OrganizationStage::TeamInvites => StepId::TeamInvites,
            OrganizationStage::Billing => StepId::Billing,
            OrganizationStage::Complete => StepId::Complete,
        },
        Stage::Individual(s) => match s {
            IndividualStage::PersonalProfile => StepId::PersonalProfile,
            IndividualStage::Skills => StepId::Skills,
            IndividualStage::Preferences => StepId::Preferences,
            IndividualStage::Complete => StepId::Complete,
        },
        Stage::Agency(s) => match s {
            AgencyStage::AgencyDetails => StepId::AgencyDetails,
            AgencyStage::ClientOrganizations => StepId::ClientOrganizations,
            AgencyStage::TeamInvites => StepId::TeamInvites,
            AgencyStage::Complete => StepId::Complete,
        },
    }
}

/// Step to render for `progress`. Fails if its stage is not part of its flow.
pub fn route(progress: &OnboardingProgress) -> Result<StepId, OnboardingError> {
    registry::index_of(progress.flow_kind, progress.stage)?;
    Ok(step_for(progress.stage))
}

/// Route a raw (flow kind, stage string) pair, as read from an external store.
pub fn route_raw(flow_kind: FlowKind, stage: &str) -> Result<StepId, OnboardingError> {
    let stage = registry::parse_stage(flow_kind, stage)?;
    Ok(step_for(stage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn every_registered_stage_has_one_step() {
        for kind in FlowKind::ALL {
            let steps: Vec<StepId> = registry::stages_for(kind).iter().map(|s| step_for(*s)).collect();
            let mut unique = steps.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), steps.len(), "{kind} maps two stages to one step");
        }
    }

    #[test]
    fn terminal_stage_routes_to_complete() {
        for kind in FlowKind::ALL {
            assert_eq!(step_for(registry::terminal_stage(kind)), StepId::Complete);
        }
    }

    #[test]
    fn route_new_record_renders_first_step() {
        let p = OnboardingProgress::new("u1", FlowKind::Agency, Utc::now());
        assert_eq!(route(&p).unwrap(), StepId::AgencyDetails);
    }

    #[test]
    fn route_rejects_foreign_stage() {
        let mut p = OnboardingProgress::new("u1", FlowKind::Individual, Utc::now());
        p.stage = Stage::Organization(OrganizationStage::Billing);
        assert!(matches!(route(&p), Err(OnboardingError::UnknownStageValue { .. })));
    }

    #[test]
    fn route_raw_fails_fast_on_unknown_value() {
        assert_eq!(
            route_raw(FlowKind::Agency, "client_organizations").unwrap(),
            StepId::ClientOrganizations
        );
        assert!(matches!(
            route_raw(FlowKind::Agency, "CLIENT_ORG"),
            Err(OnboardingError::UnknownStageValue { .. })
        ));
    }
}
