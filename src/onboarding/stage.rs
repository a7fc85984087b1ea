//! Flow kinds and their closed stage vocabularies.
//!
//! Each flow kind has its own stage enum, and [`Stage`] is the tagged union
//! over them. A stage therefore always knows which flow it belongs to, and a
//! string can only become a `Stage` by parsing it against a specific flow
//! (see [`crate::onboarding::registry::parse_stage`]).

use serde::{Deserialize, Serialize, Serializer};

/// The role-dependent variant of the onboarding sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowKind {
    #[serde(rename = "organization-flow")]
    Organization,
    #[serde(rename = "individual-flow")]
    Individual,
    #[serde(rename = "agency-flow")]
    Agency,
}

impl FlowKind {
    pub const ALL: [FlowKind; 3] = [Self::Organization, Self::Individual, Self::Agency];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization-flow",
            Self::Individual => "individual-flow",
            Self::Agency => "agency-flow",
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlowKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organization-flow" => Ok(Self::Organization),
            "individual-flow" => Ok(Self::Individual),
            "agency-flow" => Ok(Self::Agency),
            _ => Err(format!("Unknown flow kind: {}", s)),
        }
    }
}

/// Stages of the organization-owner flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrganizationStage {
    OrganizationDetails,
    TeamInvites,
    Billing,
    Complete,
}

impl OrganizationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrganizationDetails => "organization_details",
            Self::TeamInvites => "team_invites",
            Self::Billing => "billing",
            Self::Complete => "complete",
        }
    }
}

impl std::str::FromStr for OrganizationStage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organization_details" => Ok(Self::OrganizationDetails),
            "team_invites" => Ok(Self::TeamInvites),
            "billing" => Ok(Self::Billing),
            "complete" => Ok(Self::Complete),
            _ => Err(format!("Unknown organization stage: {}", s)),
        }
    }
}

/// Stages of the individual-contributor flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndividualStage {
    PersonalProfile,
    Skills,
    Preferences,
    Complete,
}

impl IndividualStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonalProfile => "personal_profile",
            Self::Skills => "skills",
            Self::Preferences => "preferences",
            Self::Complete => "complete",
        }
    }
}

impl std::str::FromStr for IndividualStage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal_profile" => Ok(Self::PersonalProfile),
            "skills" => Ok(Self::Skills),
            "preferences" => Ok(Self::Preferences),
            "complete" => Ok(Self::Complete),
            _ => Err(format!("Unknown individual stage: {}", s)),
        }
    }
}

/// Stages of the agency flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgencyStage {
    AgencyDetails,
    ClientOrganizations,
    TeamInvites,
    Complete,
}

impl AgencyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgencyDetails => "agency_details",
            Self::ClientOrganizations => "client_organizations",
            Self::TeamInvites => "team_invites",
            Self::Complete => "complete",
        }
    }
}

impl std::str::FromStr for AgencyStage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agency_details" => Ok(Self::AgencyDetails),
            "client_organizations" => Ok(Self::ClientOrganizations),
            "team_invites" => Ok(Self::TeamInvites),
            "complete" => Ok(Self::Complete),
            _ => Err(format!("Unknown agency stage: {}", s)),
        }
    }
}

/// A stage, scoped to the flow kind it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Organization(OrganizationStage),
    Individual(IndividualStage),
    Agency(AgencyStage),
}

impl Stage {
    /// The flow this stage belongs to.
    pub fn flow_kind(&self) -> FlowKind {
        match self {
            Self::Organization(_) => FlowKind::Organization,
            Self::Individual(_) => FlowKind::Individual,
            Self::Agency(_) => FlowKind::Agency,
        }
    }

    /// Canonical persisted string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization(s) => s.as_str(),
            Self::Individual(s) => s.as_str(),
            Self::Agency(s) => s.as_str(),
        }
    }

    /// Whether this is the last stage of its flow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Organization(OrganizationStage::Complete)
                | Self::Individual(IndividualStage::Complete)
                | Self::Agency(AgencyStage::Complete)
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// No `Deserialize`: parsing a stage needs its flow kind.
impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_kind_display_matches_serde() {
        for kind in FlowKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(format!("\"{kind}\""), json);
            let parsed: FlowKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn flow_kind_rejects_unknown() {
        assert!("org-flow".parse::<FlowKind>().is_err());
        assert!("".parse::<FlowKind>().is_err());
    }

    #[test]
    fn stage_knows_its_flow() {
        let stage = Stage::Agency(AgencyStage::ClientOrganizations);
        assert_eq!(stage.flow_kind(), FlowKind::Agency);
        assert_eq!(stage.to_string(), "client_organizations");
    }

    #[test]
    fn only_complete_is_terminal() {
        assert!(Stage::Organization(OrganizationStage::Complete).is_terminal());
        assert!(Stage::Individual(IndividualStage::Complete).is_terminal());
        assert!(Stage::Agency(AgencyStage::Complete).is_terminal());
        assert!(!Stage::Organization(OrganizationStage::Billing).is_terminal());
        assert!(!Stage::Agency(AgencyStage::TeamInvites).is_terminal());
    }

    #[test]
    fn stage_strings_are_case_sensitive() {
        assert!("CLIENT_ORG".parse::<AgencyStage>().is_err());
        assert!("Client_Organizations".parse::<AgencyStage>().is_err());
        assert_eq!(
            "client_organizations".parse::<AgencyStage>().unwrap(),
            AgencyStage::ClientOrganizations
        );
    }

    #[test]
    fn stage_serializes_as_plain_string() {
        let json = serde_json::to_string(&Stage::Individual(IndividualStage::Skills)).unwrap();
        assert_eq!(json, "\"skills\"");
    }
}
