//! Onboarding data models: progress records, step ids, and role reference data.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OnboardingError;

use super::flow_router;
use super::registry;
use super::stage::{FlowKind, Stage};

/// Current time at the precision the store keeps (microseconds), so records
/// compare equal after a round-trip.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// The UI step to render for a stage. Also recorded in `completed_steps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    OrganizationDetails,
    TeamInvites,
    Billing,
    PersonalProfile,
    Skills,
    Preferences,
    AgencyDetails,
    ClientOrganizations,
    Complete,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrganizationDetails => "organization_details",
            Self::TeamInvites => "team_invites",
            Self::Billing => "billing",
            Self::PersonalProfile => "personal_profile",
            Self::Skills => "skills",
            Self::Preferences => "preferences",
            Self::AgencyDetails => "agency_details",
            Self::ClientOrganizations => "client_organizations",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepId {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organization_details" => Ok(Self::OrganizationDetails),
            "team_invites" => Ok(Self::TeamInvites),
            "billing" => Ok(Self::Billing),
            "personal_profile" => Ok(Self::PersonalProfile),
            "skills" => Ok(Self::Skills),
            "preferences" => Ok(Self::Preferences),
            "agency_details" => Ok(Self::AgencyDetails),
            "client_organizations" => Ok(Self::ClientOrganizations),
            "complete" => Ok(Self::Complete),
            _ => Err(format!("Unknown step id: {}", s)),
        }
    }
}

/// Overall status of an onboarding record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl std::str::FromStr for ProgressStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("Unknown progress status: {}", s)),
        }
    }
}

/// A user's durable onboarding progress. At most one exists per user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnboardingProgress {
    pub user_id: String,
    pub flow_kind: FlowKind,
    pub stage: Stage,
    /// 1-based index of `stage` within the flow.
    pub current_step: u32,
    pub total_steps: u32,
    /// Append-only, in completion order.
    pub completed_steps: Vec<StepId>,
    pub status: ProgressStatus,
    pub last_activity: DateTime<Utc>,
}

impl OnboardingProgress {
    /// Fresh record at the first stage of `flow_kind`.
    pub fn new(user_id: impl Into<String>, flow_kind: FlowKind, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            flow_kind,
            stage: registry::first_stage(flow_kind),
            current_step: 1,
            total_steps: registry::total_steps(flow_kind),
            completed_steps: Vec::new(),
            status: ProgressStatus::InProgress,
            last_activity: now,
        }
    }

    pub fn has_completed(&self, step: StepId) -> bool {
        self.completed_steps.contains(&step)
    }

    pub fn is_complete(&self) -> bool {
        self.status == ProgressStatus::Completed
    }

    /// Check the record against the registry: stage membership, step index,
    /// step count, terminal/status agreement, and that completed steps belong
    /// to stages before the current one.
    pub fn validate(&self) -> Result<(), OnboardingError> {
        let index = registry::index_of(self.flow_kind, self.stage)?;
        let inconsistent = |reason: String| OnboardingError::InconsistentProgress {
            user_id: self.user_id.clone(),
            reason,
        };
        if index != self.current_step {
            return Err(inconsistent(format!(
                "stage {} is step {index}, record says {}",
                self.stage, self.current_step
            )));
        }
        let total = registry::total_steps(self.flow_kind);
        if total != self.total_steps {
            return Err(inconsistent(format!(
                "{} has {total} steps, record says {}",
                self.flow_kind, self.total_steps
            )));
        }
        if self.stage.is_terminal() != (self.status == ProgressStatus::Completed) {
            return Err(inconsistent(format!(
                "status {} does not match stage {}",
                self.status, self.stage
            )));
        }

        // Completed steps may only name stages already passed, each once.
        let passed = &registry::stages_for(self.flow_kind)[..(index - 1) as usize];
        for (i, step) in self.completed_steps.iter().enumerate() {
            if !passed.iter().any(|stage| flow_router::step_for(*stage) == *step) {
                return Err(inconsistent(format!(
                    "completed step {step} is not before stage {}",
                    self.stage
                )));
            }
            if self.completed_steps[..i].contains(step) {
                return Err(inconsistent(format!("completed step {step} is repeated")));
            }
        }
        Ok(())
    }
}

/// Store-agnostic persisted shape of a progress record.
///
/// Every field is a plain value; turning a row into an [`OnboardingProgress`]
/// goes through the stage registry and fails closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRow {
    pub user_id: String,
    pub flow_kind: String,
    pub stage: String,
    pub current_step: i64,
    pub total_steps: i64,
    pub completed_steps: Vec<String>,
    pub status: String,
    pub last_activity: DateTime<Utc>,
}

impl From<&OnboardingProgress> for ProgressRow {
    fn from(p: &OnboardingProgress) -> Self {
        Self {
            user_id: p.user_id.clone(),
            flow_kind: p.flow_kind.to_string(),
            stage: p.stage.to_string(),
            current_step: i64::from(p.current_step),
            total_steps: i64::from(p.total_steps),
            completed_steps: p.completed_steps.iter().map(|s| s.to_string()).collect(),
            status: p.status.to_string(),
            last_activity: p.last_activity,
        }
    }
}

impl TryFrom<ProgressRow> for OnboardingProgress {
    type Error = OnboardingError;

    fn try_from(row: ProgressRow) -> Result<Self, Self::Error> {
        let inconsistent = |reason: String| OnboardingError::InconsistentProgress {
            user_id: row.user_id.clone(),
            reason,
        };

        let flow_kind: FlowKind = row
            .flow_kind
            .parse()
            .map_err(|_| OnboardingError::UnknownFlowKind(row.flow_kind.clone()))?;
        let stage = registry::parse_stage(flow_kind, &row.stage)?;
        let status: ProgressStatus = row.status.parse().map_err(inconsistent)?;
        let completed_steps = row
            .completed_steps
            .iter()
            .map(|s| s.parse::<StepId>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(inconsistent)?;
        let current_step = u32::try_from(row.current_step)
            .map_err(|_| inconsistent(format!("invalid current_step {}", row.current_step)))?;
        let total_steps = u32::try_from(row.total_steps)
            .map_err(|_| inconsistent(format!("invalid total_steps {}", row.total_steps)))?;

        let progress = OnboardingProgress {
            user_id: row.user_id.clone(),
            flow_kind,
            stage,
            current_step,
            total_steps,
            completed_steps,
            status,
            last_activity: row.last_activity,
        };
        progress.validate()?;
        Ok(progress)
    }
}

/// A role from the external role catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
}

/// A category scoped to a [`Role`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCategory {
    pub id: Uuid,
    pub role_id: Uuid,
    pub name: String,
}

/// The role a user picked during role selection. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: String,
    pub role: Role,
    pub category: RoleCategory,
}

/// Explicit per-request session value; replaces any ambient "current user".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::stage::{AgencyStage, OrganizationStage};

    fn org_row() -> ProgressRow {
        ProgressRow {
            user_id: "u1".to_string(),
            flow_kind: "organization-flow".to_string(),
            stage: "team_invites".to_string(),
            current_step: 2,
            total_steps: 4,
            completed_steps: vec!["organization_details".to_string()],
            status: "in_progress".to_string(),
            last_activity: Utc::now(),
        }
    }

    #[test]
    fn new_record_starts_at_step_one() {
        let p = OnboardingProgress::new("u1", FlowKind::Organization, Utc::now());
        assert_eq!(p.stage, Stage::Organization(OrganizationStage::OrganizationDetails));
        assert_eq!(p.current_step, 1);
        assert_eq!(p.total_steps, 4);
        assert!(p.completed_steps.is_empty());
        assert_eq!(p.status, ProgressStatus::InProgress);
        p.validate().unwrap();
    }

    #[test]
    fn row_parses_into_progress() {
        let p = OnboardingProgress::try_from(org_row()).unwrap();
        assert_eq!(p.stage, Stage::Organization(OrganizationStage::TeamInvites));
        assert_eq!(p.completed_steps, vec![StepId::OrganizationDetails]);
    }

    #[test]
    fn row_roundtrip_preserves_fields() {
        let p = OnboardingProgress::try_from(org_row()).unwrap();
        let row = ProgressRow::from(&p);
        assert_eq!(row, org_row_with_time(p.last_activity));
    }

    fn org_row_with_time(t: DateTime<Utc>) -> ProgressRow {
        ProgressRow {
            last_activity: t,
            ..org_row()
        }
    }

    #[test]
    fn legacy_stage_string_fails_closed() {
        let row = ProgressRow {
            flow_kind: "agency-flow".to_string(),
            stage: "CLIENT_ORG".to_string(),
            ..org_row()
        };
        let err = OnboardingProgress::try_from(row).unwrap_err();
        assert!(matches!(
            err,
            OnboardingError::UnknownStageValue { flow_kind: FlowKind::Agency, ref value } if value == "CLIENT_ORG"
        ));
    }

    #[test]
    fn unknown_flow_kind_fails() {
        let row = ProgressRow {
            flow_kind: "client-flow".to_string(),
            ..org_row()
        };
        assert!(matches!(
            OnboardingProgress::try_from(row),
            Err(OnboardingError::UnknownFlowKind(_))
        ));
    }

    #[test]
    fn step_index_must_match_stage() {
        let row = ProgressRow {
            current_step: 3,
            ..org_row()
        };
        assert!(matches!(
            OnboardingProgress::try_from(row),
            Err(OnboardingError::InconsistentProgress { .. })
        ));
    }

    #[test]
    fn terminal_stage_requires_completed_status() {
        let row = ProgressRow {
            stage: "complete".to_string(),
            current_step: 4,
            status: "in_progress".to_string(),
            ..org_row()
        };
        assert!(OnboardingProgress::try_from(row).is_err());
    }

    #[test]
    fn unknown_completed_step_fails() {
        let row = ProgressRow {
            completed_steps: vec!["org_created".to_string()],
            ..org_row()
        };
        assert!(matches!(
            OnboardingProgress::try_from(row),
            Err(OnboardingError::InconsistentProgress { .. })
        ));
    }

    #[test]
    fn completed_step_not_yet_reached_fails() {
        let row = ProgressRow {
            completed_steps: vec![
                "organization_details".to_string(),
                "team_invites".to_string(),
            ],
            ..org_row()
        };
        assert!(matches!(
            OnboardingProgress::try_from(row),
            Err(OnboardingError::InconsistentProgress { .. })
        ));
    }

    #[test]
    fn completed_step_from_another_flow_fails() {
        let row = ProgressRow {
            completed_steps: vec!["organization_details".to_string(), "skills".to_string()],
            ..org_row()
        };
        assert!(OnboardingProgress::try_from(row).is_err());
    }

    #[test]
    fn repeated_completed_step_fails() {
        let mut p = OnboardingProgress::try_from(org_row()).unwrap();
        p.completed_steps.push(StepId::OrganizationDetails);
        assert!(matches!(
            p.validate(),
            Err(OnboardingError::InconsistentProgress { .. })
        ));
    }

    #[test]
    fn partial_completed_steps_are_accepted() {
        let row = ProgressRow {
            completed_steps: Vec::new(),
            ..org_row()
        };
        OnboardingProgress::try_from(row).unwrap();
    }

    #[test]
    fn validate_catches_stage_from_another_flow() {
        let mut p = OnboardingProgress::new("u1", FlowKind::Individual, Utc::now());
        p.stage = Stage::Agency(AgencyStage::AgencyDetails);
        assert!(matches!(
            p.validate(),
            Err(OnboardingError::UnknownStageValue { .. })
        ));
    }

    #[test]
    fn step_id_display_matches_serde() {
        let steps = [
            StepId::OrganizationDetails,
            StepId::TeamInvites,
            StepId::Billing,
            StepId::PersonalProfile,
            StepId::Skills,
            StepId::Preferences,
            StepId::AgencyDetails,
            StepId::ClientOrganizations,
            StepId::Complete,
        ];
        for step in steps {
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{step}\""), json, "Display and serde should match for {step:?}");
            assert_eq!(step.as_str().parse::<StepId>().unwrap(), step);
        }
    }

    #[test]
    fn progress_serializes_wire_shape() {
        let p = OnboardingProgress::try_from(org_row()).unwrap();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["flow_kind"], "organization-flow");
        assert_eq!(json["stage"], "team_invites");
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["completed_steps"][0], "organization_details");
    }
}
