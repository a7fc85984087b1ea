//! Error types for onboard-flow.

use crate::onboarding::stage::FlowKind;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid classifier rules: {0}")]
    InvalidRules(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    /// Whether the failure is worth retrying (the backend may come back).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::Unavailable(_))
    }
}

/// Errors raised by classification, the stage machine and the progress store.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("Unknown role '{role}' (category '{category}')")]
    UnknownRole { role: String, category: String },

    #[error("No role assignment for user {user_id}")]
    MissingRoleAssignment { user_id: String },

    #[error("Unknown stage value '{value}' for {flow_kind}")]
    UnknownStageValue { flow_kind: FlowKind, value: String },

    #[error("Unknown flow kind '{0}'")]
    UnknownFlowKind(String),

    #[error("Invalid stage transition from {stage} ({flow_kind}): {reason}")]
    InvalidStageTransition {
        flow_kind: FlowKind,
        stage: String,
        reason: String,
    },

    #[error("Inconsistent progress record for user {user_id}: {reason}")]
    InconsistentProgress { user_id: String, reason: String },

    #[error("Onboarding not started for user {user_id}")]
    NotStarted { user_id: String },

    #[error("Persistence unavailable after {attempts} attempt(s): {reason}")]
    PersistenceUnavailable { attempts: u32, reason: String },

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl OnboardingError {
    /// Only persistence unavailability is retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PersistenceUnavailable { .. })
    }

    /// Whether the caller should treat this as a missing role mapping.
    pub fn is_role_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownRole { .. } | Self::MissingRoleAssignment { .. }
        )
    }
}

impl From<DatabaseError> for OnboardingError {
    fn from(err: DatabaseError) -> Self {
        if err.is_transient() {
            Self::PersistenceUnavailable {
                attempts: 1,
                reason: err.to_string(),
            }
        } else {
            Self::Database(err)
        }
    }
}
