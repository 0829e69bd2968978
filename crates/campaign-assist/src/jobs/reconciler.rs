//! Terminal reconciliation: one partial write per job.
//!
//! Content fields only ever move forward. A result value that is empty (or
//! only whitespace) never replaces what the user already has in the form.
//! Tags are never part of the write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::poller::TerminalOutcome;
use crate::db::DatabaseError;
use crate::service::JobStatus;
use crate::store::{CampaignDraft, CampaignStore, CampaignUpdate};

/// The form's content fields at the moment the job finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSnapshot {
    pub description: String,
    pub product_description: String,
    pub target_audience: String,
}

impl From<&CampaignDraft> for FormSnapshot {
    fn from(draft: &CampaignDraft) -> Self {
        Self {
            description: draft.description.clone(),
            product_description: draft.product_description.clone(),
            target_audience: draft.target_audience.clone(),
        }
    }
}

/// Picks the result value when it has content, otherwise keeps `prior`.
pub fn merge_field(result: Option<&str>, prior: &str) -> String {
    match result {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => prior.to_string(),
    }
}

/// Builds the single terminal update for `outcome`.
///
/// Every outcome clears `job_id` and records the status and completion
/// time. Only a completed job carries content fields.
pub fn merged_update(
    outcome: &TerminalOutcome,
    snapshot: &FormSnapshot,
    completed_at: DateTime<Utc>,
) -> CampaignUpdate {
    let terminal = CampaignUpdate::terminal(outcome.persisted_status(), completed_at);
    match outcome {
        TerminalOutcome::Completed(result) => CampaignUpdate {
            description: Some(merge_field(
                result.suggested_description.as_deref(),
                &snapshot.description,
            )),
            product_description: Some(merge_field(
                result.product_description.as_deref(),
                &snapshot.product_description,
            )),
            target_audience: Some(merge_field(
                result.target_audience.as_deref(),
                &snapshot.target_audience,
            )),
            ..terminal
        },
        TerminalOutcome::Failed(_) | TerminalOutcome::TimedOut { .. } => terminal,
    }
}

/// Acknowledgement of a terminal write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileAck {
    pub campaign_id: String,
    pub job_id: String,
    pub status: JobStatus,
    pub completed_at: DateTime<Utc>,
    pub fields: Vec<&'static str>,
}

pub struct ReconciliationWriter {
    store: Arc<dyn CampaignStore>,
}

impl ReconciliationWriter {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self { store }
    }

    /// Writes the terminal state of `job_id` onto `campaign_id`.
    ///
    /// Called once per job; the caller decides whether the job is still the
    /// accepted one.
    pub async fn reconcile(
        &self,
        campaign_id: &str,
        job_id: &str,
        outcome: &TerminalOutcome,
        snapshot: &FormSnapshot,
    ) -> Result<ReconcileAck, DatabaseError> {
        let completed_at = Utc::now();
        let update = merged_update(outcome, snapshot, completed_at);
        let fields = update.touched_columns();
        debug!(
            "Reconciling job {} into campaign {}: {:?}",
            job_id, campaign_id, fields
        );

        self.store.update(campaign_id, update).await?;

        let status = outcome.persisted_status();
        info!(
            "Campaign {} reconciled: job {} is {}",
            campaign_id, job_id, status
        );
        Ok(ReconcileAck {
            campaign_id: campaign_id.to_string(),
            job_id: job_id.to_string(),
            status,
            completed_at,
            fields,
        })
    }
}
