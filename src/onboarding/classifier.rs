//! Role classifier — maps a role assignment to the flow kind it onboards through.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, OnboardingError};

use super::model::RoleAssignment;
use super::stage::FlowKind;

/// One classification rule. A rule without `category` is the role's default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub flow_kind: FlowKind,
}

impl ClassificationRule {
    pub fn role(role: &str, flow_kind: FlowKind) -> Self {
        Self {
            role: role.to_string(),
            category: None,
            flow_kind,
        }
    }

    pub fn category(role: &str, category: &str, flow_kind: FlowKind) -> Self {
        Self {
            role: role.to_string(),
            category: Some(category.to_string()),
            flow_kind,
        }
    }
}

/// Built-in rule set.
pub fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::role("organization-owner", FlowKind::Organization),
        ClassificationRule::role("individual-contributor", FlowKind::Individual),
        ClassificationRule::role("agency-owner", FlowKind::Agency),
        ClassificationRule::role("service-provider", FlowKind::Individual),
        ClassificationRule::category("service-provider", "agency", FlowKind::Agency),
    ]
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Deterministic role → flow kind lookup.
#[derive(Debug, Clone)]
pub struct RoleClassifier {
    /// Role-level defaults, keyed by normalized role name.
    roles: HashMap<String, FlowKind>,
    /// Category overrides, keyed by (role, category).
    categories: HashMap<(String, String), FlowKind>,
}

impl RoleClassifier {
    /// Build from a rule list, rejecting duplicate keys and category rules
    /// whose role has no default.
    pub fn new(rules: Vec<ClassificationRule>) -> Result<Self, ConfigError> {
        let mut roles = HashMap::new();
        let mut categories = HashMap::new();

        for rule in rules {
            let role = normalize(&rule.role);
            if role.is_empty() {
                return Err(ConfigError::InvalidRules("rule with empty role".to_string()));
            }
            match rule.category.as_deref().map(normalize) {
                Some(category) => {
                    if categories
                        .insert((role.clone(), category.clone()), rule.flow_kind)
                        .is_some()
                    {
                        return Err(ConfigError::InvalidRules(format!(
                            "duplicate rule for {role}/{category}"
                        )));
                    }
                }
                None => {
                    if roles.insert(role.clone(), rule.flow_kind).is_some() {
                        return Err(ConfigError::InvalidRules(format!(
                            "duplicate rule for {role}"
                        )));
                    }
                }
            }
        }

        if let Some((role, _)) = categories.keys().find(|(role, _)| !roles.contains_key(role)) {
            return Err(ConfigError::InvalidRules(format!(
                "role {role} has category rules but no default flow"
            )));
        }

        Ok(Self { roles, categories })
    }

    /// Classifier with the built-in rules.
    pub fn with_defaults() -> Self {
        Self::new(default_rules()).expect("built-in classification rules are valid")
    }

    /// Load rules from a JSON array of [`ClassificationRule`].
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let rules: Vec<ClassificationRule> = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        Self::new(rules)
    }

    /// Flow kind for an assignment. Unrecognized roles are an error, never a
    /// default flow.
    pub fn classify(&self, assignment: &RoleAssignment) -> Result<FlowKind, OnboardingError> {
        let role = normalize(&assignment.role.name);
        let category = normalize(&assignment.category.name);

        if let Some(kind) = self.categories.get(&(role.clone(), category)) {
            return Ok(*kind);
        }
        self.roles
            .get(&role)
            .copied()
            .ok_or_else(|| OnboardingError::UnknownRole {
                role: assignment.role.name.clone(),
                category: assignment.category.name.clone(),
            })
    }
}

impl Default for RoleClassifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}
