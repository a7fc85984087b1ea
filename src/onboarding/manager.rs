//! OnboardingManager — coordinates role classification, the state machine,
//! and the progress store for one session at a time.

use std::sync::Arc;

use serde::Serialize;

use crate::error::OnboardingError;
use crate::store::{Database, RoleDirectory};

use super::classifier::RoleClassifier;
use super::flow_router;
use super::machine;
use super::model::{OnboardingProgress, ProgressStatus, SessionContext, StepId, timestamp_now};
use super::progress::ProgressStore;
use super::retry::RetryPolicy;
use super::stage::FlowKind;

/// Maximum records abandoned per sweep.
const SWEEP_BATCH: usize = 500;

/// Where a returning user picks up: their record plus the step to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumePoint {
    pub progress: OnboardingProgress,
    pub step: StepId,
}

pub struct OnboardingManager {
    store: ProgressStore,
    roles: Arc<dyn RoleDirectory>,
    classifier: RoleClassifier,
    retry: RetryPolicy,
    sweep_batch: usize,
}

impl OnboardingManager {
    pub fn new(
        db: Arc<dyn Database>,
        roles: Arc<dyn RoleDirectory>,
        classifier: RoleClassifier,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store: ProgressStore::new(db),
            roles,
            classifier,
            retry,
            sweep_batch: SWEEP_BATCH,
        }
    }

    /// Override how many records one abandonment sweep handles.
    pub fn with_sweep_batch(mut self, sweep_batch: usize) -> Self {
        self.sweep_batch = sweep_batch;
        self
    }

    /// Pick the flow for the session's user from their role assignment.
    pub async fn classify(&self, session: &SessionContext) -> Result<FlowKind, OnboardingError> {
        let roles = &*self.roles;
        let user_id = session.user_id.as_str();
        let assignment = self
            .retry
            .run("role_assignment", move || async move {
                roles.role_assignment(user_id).await.map_err(OnboardingError::from)
            })
            .await?
            .ok_or_else(|| OnboardingError::MissingRoleAssignment {
                user_id: user_id.to_string(),
            })?;
        self.classifier.classify(&assignment)
    }

    /// Start onboarding, or return the record already started.
    pub async fn begin(&self, session: &SessionContext) -> Result<OnboardingProgress, OnboardingError> {
        let flow_kind = self.classify(session).await?;
        let store = &self.store;
        let user_id = session.user_id.as_str();
        self.retry
            .run("load_or_create", move || store.load_or_create(user_id, flow_kind))
            .await
    }

    /// Apply a "step completed" event and persist the result.
    ///
    /// Re-delivered steps are no-ops and skip the write. Returns the record as
    /// stored, which is ahead of the computed one when a concurrent session
    /// got further first.
    pub async fn complete_step(
        &self,
        session: &SessionContext,
        step: StepId,
    ) -> Result<OnboardingProgress, OnboardingError> {
        let current = match self.load(session).await? {
            Some(progress) => progress,
            None => self.begin(session).await?,
        };

        let next = machine::advance(&current, step, timestamp_now())?;
        if next == current {
            tracing::debug!(user_id = %session.user_id, step = %step, "Step already completed");
            return Ok(current);
        }

        let store = &self.store;
        let next = &next;
        let saved = self
            .retry
            .run("save_progress", move || store.save(next))
            .await?;

        tracing::debug!(
            user_id = %saved.user_id,
            stage = %saved.stage,
            current_step = saved.current_step,
            total_steps = saved.total_steps,
            "Onboarding step completed"
        );
        Ok(saved)
    }

    /// The existing record and the step to render for it.
    pub async fn resume(&self, session: &SessionContext) -> Result<ResumePoint, OnboardingError> {
        let progress = self
            .load(session)
            .await?
            .ok_or_else(|| OnboardingError::NotStarted {
                user_id: session.user_id.clone(),
            })?;
        let step = flow_router::route(&progress)?;
        Ok(ResumePoint { progress, step })
    }

    /// Mark in-progress records idle for longer than `idle` as abandoned.
    /// Returns how many were abandoned. Per-record failures are logged and
    /// skipped.
    pub async fn abandon_stale(&self, idle: chrono::Duration) -> Result<usize, OnboardingError> {
        let cutoff = timestamp_now() - idle;
        let store = &self.store;
        let batch = self.sweep_batch;
        let stale = self
            .retry
            .run("list_stale", move || store.stale(cutoff, batch))
            .await?;

        let mut abandoned = 0;
        for progress in stale {
            let updated = match machine::abandon(&progress) {
                Ok(updated) => updated,
                Err(e) => {
                    tracing::warn!(user_id = %progress.user_id, error = %e, "Cannot abandon record");
                    continue;
                }
            };
            let updated = &updated;
            match self.retry.run("abandon", move || store.save(updated)).await {
                Ok(saved) if saved.status == ProgressStatus::Abandoned => abandoned += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(user_id = %progress.user_id, error = %e, "Failed to abandon record");
                }
            }
        }
        Ok(abandoned)
    }

    async fn load(&self, session: &SessionContext) -> Result<Option<OnboardingProgress>, OnboardingError> {
        let store = &self.store;
        let user_id = session.user_id.as_str();
        self.retry
            .run("load_progress", move || store.load(user_id))
            .await
    }
}

/// Spawn a background task that periodically abandons idle onboarding records.
pub fn spawn_abandonment_task(
    manager: Arc<OnboardingManager>,
    interval: std::time::Duration,
    idle: chrono::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            match manager.abandon_stale(idle).await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "Abandoned idle onboarding records"),
                Err(e) => tracing::warn!(error = %e, "Abandonment sweep failed"),
            }
        }
    })
}
