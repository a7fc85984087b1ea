//! Onboarding state machine — pure transition logic over progress records.
//!
//! Progresses linearly through the stages of the record's flow, one step per
//! completion event. Nothing here touches storage; callers persist the
//! returned record through the progress store.

use chrono::{DateTime, Utc};

use crate::error::OnboardingError;

use super::flow_router;
use super::model::{OnboardingProgress, ProgressStatus, StepId};
use super::registry::{self, NextStage};

/// Apply a "step completed" event.
///
/// A step id already in `completed_steps` is a no-op and returns the record
/// unchanged. Otherwise the step must be the one rendered for the current
/// stage; the record then moves forward exactly one stage. Reaching the
/// terminal stage marks the record completed. An abandoned record resumes.
pub fn advance(
    progress: &OnboardingProgress,
    completed: StepId,
    now: DateTime<Utc>,
) -> Result<OnboardingProgress, OnboardingError> {
    progress.validate()?;

    if progress.has_completed(completed) {
        return Ok(progress.clone());
    }

    let reject = |reason: String| OnboardingError::InvalidStageTransition {
        flow_kind: progress.flow_kind,
        stage: progress.stage.to_string(),
        reason,
    };

    if progress.stage.is_terminal() {
        return Err(reject("onboarding is already complete".to_string()));
    }

    let current = flow_router::step_for(progress.stage);
    if completed != current {
        return Err(reject(format!(
            "step {completed} is not the current step {current}"
        )));
    }

    let next = registry::next_stage(progress.flow_kind, progress.stage)?;

    let mut updated = progress.clone();
    updated.completed_steps.push(completed);
    updated.stage = next.stage();
    updated.current_step = progress.current_step + 1;
    updated.status = match next {
        NextStage::Terminal(_) => ProgressStatus::Completed,
        NextStage::Intermediate(_) => ProgressStatus::InProgress,
    };
    updated.last_activity = now;
    Ok(updated)
}

/// Mark an in-progress record abandoned. Completed records cannot be abandoned;
/// an already abandoned record is returned unchanged.
pub fn abandon(progress: &OnboardingProgress) -> Result<OnboardingProgress, OnboardingError> {
    match progress.status {
        ProgressStatus::Completed => Err(OnboardingError::InvalidStageTransition {
            flow_kind: progress.flow_kind,
            stage: progress.stage.to_string(),
            reason: "completed onboarding cannot be abandoned".to_string(),
        }),
        ProgressStatus::Abandoned => Ok(progress.clone()),
        ProgressStatus::InProgress => {
            let mut updated = progress.clone();
            updated.status = ProgressStatus::Abandoned;
            Ok(updated)
        }
    }
}

/// Whether `from` can be replaced by `to` without moving backwards.
pub fn is_forward(from: &OnboardingProgress, to: &OnboardingProgress) -> bool {
    from.flow_kind == to.flow_kind && to.current_step >= from.current_step
}
