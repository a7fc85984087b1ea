//! Onboarding system — role-driven multi-stage flows with durable progress.
//!
//! A user's role assignment picks a flow kind; the flow's stages are walked
//! one completion event at a time by a pure state machine, and the resulting
//! record is persisted through a validating progress store. Returning users
//! resume at the step their stored stage maps to.

pub mod classifier;
pub mod flow_router;
pub mod machine;
pub mod manager;
pub mod model;
pub mod progress;
pub mod registry;
pub mod retry;
pub mod routes;
pub mod stage;

pub use classifier::{ClassificationRule, RoleClassifier};
pub use manager::{OnboardingManager, ResumePoint, spawn_abandonment_task};
pub use model::{OnboardingProgress, ProgressStatus, SessionContext, StepId};
pub use progress::ProgressStore;
pub use retry::RetryPolicy;
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use stage::{FlowKind, Stage};
