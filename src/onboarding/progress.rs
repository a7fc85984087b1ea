//! ProgressStore — validating gateway between the state machine and storage.
//!
//! Every record read is parsed through the stage registry (fail closed), every
//! record written is validated before it reaches the backend, and writes that
//! would move a user's step index backwards are dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::OnboardingError;
use crate::store::{Database, StaleCursor};

use super::machine;
use super::model::{OnboardingProgress, ProgressRow, timestamp_now};
use super::stage::FlowKind;

pub struct ProgressStore {
    db: Arc<dyn Database>,
}

impl ProgressStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Load the user's record, if any. Legacy or corrupt rows are errors.
    pub async fn load(&self, user_id: &str) -> Result<Option<OnboardingProgress>, OnboardingError> {
        match self.db.get_progress(user_id).await? {
            Some(row) => Ok(Some(OnboardingProgress::try_from(row)?)),
            None => Ok(None),
        }
    }

    /// Return the user's record, creating it at the first stage of `flow_kind`
    /// if absent. Concurrent callers converge on the same stored row.
    pub async fn load_or_create(
        &self,
        user_id: &str,
        flow_kind: FlowKind,
    ) -> Result<OnboardingProgress, OnboardingError> {
        let candidate = OnboardingProgress::new(user_id, flow_kind, timestamp_now());
        let row = self
            .db
            .insert_progress_if_absent(&ProgressRow::from(&candidate))
            .await?;
        let stored = OnboardingProgress::try_from(row)?;

        if stored == candidate {
            info!(user_id, flow_kind = %flow_kind, "Onboarding record created");
        } else if stored.flow_kind != flow_kind {
            warn!(
                user_id,
                stored_flow = %stored.flow_kind,
                requested_flow = %flow_kind,
                "Existing onboarding record uses a different flow; keeping stored record"
            );
        }
        Ok(stored)
    }

    /// Persist `progress`.
    ///
    /// Invalid records are rejected before any write. A record behind the
    /// stored step index is a stale duplicate: it is dropped and the stored
    /// record returned. Completed steps already stored are kept.
    pub async fn save(
        &self,
        progress: &OnboardingProgress,
    ) -> Result<OnboardingProgress, OnboardingError> {
        progress.validate()?;

        let stored = match self.load(&progress.user_id).await? {
            Some(stored) => stored,
            None => {
                let row = self
                    .db
                    .insert_progress_if_absent(&ProgressRow::from(progress))
                    .await?;
                let stored = OnboardingProgress::try_from(row)?;
                if stored == *progress {
                    debug!(user_id = %progress.user_id, "Progress inserted");
                    return Ok(stored);
                }
                stored
            }
        };

        if stored.flow_kind != progress.flow_kind {
            return Err(OnboardingError::InvalidStageTransition {
                flow_kind: stored.flow_kind,
                stage: stored.stage.to_string(),
                reason: format!("cannot switch to {}", progress.flow_kind),
            });
        }

        if !machine::is_forward(&stored, progress) {
            log_stale(&stored, progress);
            return Ok(stored);
        }

        let merged = merge_completed(&stored, progress);
        let applied = self
            .db
            .update_progress_if_current(&ProgressRow::from(&merged))
            .await?;

        if applied {
            if merged.is_complete() && !stored.is_complete() {
                info!(user_id = %merged.user_id, flow_kind = %merged.flow_kind, "Onboarding completed");
            }
            return Ok(merged);
        }

        // Lost a race with a writer that got further ahead.
        let current = self.load(&progress.user_id).await?.ok_or_else(|| {
            OnboardingError::NotStarted {
                user_id: progress.user_id.clone(),
            }
        })?;
        log_stale(&current, progress);
        Ok(current)
    }

    /// Validate a raw row (e.g. submitted by an external writer) and save it.
    pub async fn save_row(&self, row: ProgressRow) -> Result<OnboardingProgress, OnboardingError> {
        let progress = OnboardingProgress::try_from(row)?;
        self.save(&progress).await
    }

    /// Up to `limit` in-progress records idle since before `cutoff`, oldest
    /// first. Rows that fail to parse are logged and skipped; paging continues
    /// past them so they never hide readable records.
    pub async fn stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OnboardingProgress>, OnboardingError> {
        let mut records = Vec::with_capacity(limit);
        let mut cursor: Option<StaleCursor> = None;

        while records.len() < limit {
            let rows = self
                .db
                .list_stale_progress(cutoff, cursor.as_ref(), limit)
                .await?;
            let exhausted = rows.len() < limit;
            cursor = rows.last().map(StaleCursor::from);

            for row in rows {
                let user_id = row.user_id.clone();
                match OnboardingProgress::try_from(row) {
                    Ok(p) => records.push(p),
                    Err(e) => warn!(user_id = %user_id, error = %e, "Skipping unreadable progress record"),
                }
            }
            if exhausted {
                break;
            }
        }

        records.truncate(limit);
        Ok(records)
    }
}

fn log_stale(stored: &OnboardingProgress, incoming: &OnboardingProgress) {
    info!(
        user_id = %stored.user_id,
        stored_step = stored.current_step,
        incoming_step = incoming.current_step,
        "Dropping stale onboarding write"
    );
}

/// `incoming` with any stored completed steps it is missing, so the set never
/// shrinks.
fn merge_completed(stored: &OnboardingProgress, incoming: &OnboardingProgress) -> OnboardingProgress {
    let mut merged = incoming.clone();
    let mut steps = stored.completed_steps.clone();
    for step in &incoming.completed_steps {
        if !steps.contains(step) {
            steps.push(*step);
        }
    }
    merged.completed_steps = steps;
    merged
}
