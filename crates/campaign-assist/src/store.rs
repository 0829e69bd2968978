//! Campaign draft store.
//!
//! [`CampaignStore`] is the seam between the job workflow and persistence.
//! Updates are partial: a field left as `None` in [`CampaignUpdate`] is not
//! written, so the form and the job workflow can each write their own fields
//! without clobbering the other's.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::db::campaign_repo::{self, CampaignRow};
use crate::db::{Database, DatabaseError};
use crate::service::JobStatus;

/// A persisted campaign draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDraft {
    pub id: String,
    pub name: String,
    pub url: String,
    /// User-curated tags. Analysis suggestions are never merged in here.
    pub tags: Vec<String>,
    pub description: String,
    pub product_description: String,
    pub target_audience: String,
    /// Non-null exactly while a job is in flight for this draft.
    pub job_id: Option<String>,
    pub job_status: Option<JobStatus>,
    pub job_submitted_at: Option<DateTime<Utc>>,
    pub job_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a brand-new draft. The store assigns the id.
#[derive(Debug, Clone, Default)]
pub struct NewCampaign {
    pub name: String,
    pub url: String,
    pub tags: Vec<String>,
    pub description: String,
    pub product_description: String,
    pub target_audience: String,
    pub job_id: Option<String>,
    pub job_status: Option<JobStatus>,
    pub job_submitted_at: Option<DateTime<Utc>>,
}

impl NewCampaign {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }
}

/// A partial update. Nullable columns use a nested `Option`:
/// `None` leaves the column alone, `Some(None)` sets it to NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub description: Option<String>,
    pub product_description: Option<String>,
    pub target_audience: Option<String>,
    pub job_id: Option<Option<String>>,
    pub job_status: Option<Option<JobStatus>>,
    pub job_submitted_at: Option<Option<DateTime<Utc>>>,
    pub job_completed_at: Option<Option<DateTime<Utc>>>,
}

impl CampaignUpdate {
    /// The job-owned fields written when a job reaches a terminal status.
    pub fn terminal(status: JobStatus, completed_at: DateTime<Utc>) -> Self {
        Self {
            job_id: Some(None),
            job_status: Some(Some(status)),
            job_completed_at: Some(Some(completed_at)),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether this update records a terminal job status.
    pub fn is_terminal(&self) -> bool {
        matches!(self.job_status, Some(Some(status)) if status.is_terminal())
    }

    /// Names of the columns this update writes, in column order.
    pub fn touched_columns(&self) -> Vec<&'static str> {
        self.columns()
            .map(|cols| cols.into_iter().map(|(name, _)| name).collect())
            .unwrap_or_default()
    }

    fn columns(&self) -> Result<Vec<(&'static str, Value)>, DatabaseError> {
        let mut cols = Vec::new();
        if let Some(name) = &self.name {
            cols.push(("name", Value::Text(name.clone())));
        }
        if let Some(url) = &self.url {
            cols.push(("url", Value::Text(url.clone())));
        }
        if let Some(tags) = &self.tags {
            cols.push(("tags", Value::Text(serde_json::to_string(tags)?)));
        }
        if let Some(description) = &self.description {
            cols.push(("description", Value::Text(description.clone())));
        }
        if let Some(product_description) = &self.product_description {
            cols.push((
                "product_description",
                Value::Text(product_description.clone()),
            ));
        }
        if let Some(target_audience) = &self.target_audience {
            cols.push(("target_audience", Value::Text(target_audience.clone())));
        }
        if let Some(job_id) = &self.job_id {
            cols.push(("job_id", nullable_text(job_id.clone())));
        }
        if let Some(job_status) = &self.job_status {
            cols.push((
                "job_status",
                nullable_text(job_status.map(|s| s.as_str().to_string())),
            ));
        }
        if let Some(submitted_at) = &self.job_submitted_at {
            cols.push(("job_submitted_at", nullable_text(submitted_at.map(format_timestamp))));
        }
        if let Some(completed_at) = &self.job_completed_at {
            cols.push(("job_completed_at", nullable_text(completed_at.map(format_timestamp))));
        }
        Ok(cols)
    }
}

fn nullable_text(value: Option<String>) -> Value {
    value.map(Value::Text).unwrap_or(Value::Null)
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Persists a new draft and returns it with its assigned id.
    async fn create(&self, campaign: NewCampaign) -> Result<CampaignDraft, DatabaseError>;

    /// Applies a partial update. Fails with `NotFound` for an unknown id.
    async fn update(&self, id: &str, update: CampaignUpdate) -> Result<(), DatabaseError>;

    /// Applies a partial update only while the draft's `job_id` equals `job_id`.
    /// Returns whether the draft was changed.
    async fn update_if_job(
        &self,
        id: &str,
        job_id: &str,
        update: CampaignUpdate,
    ) -> Result<bool, DatabaseError>;

    async fn get(&self, id: &str) -> Result<Option<CampaignDraft>, DatabaseError>;

    /// Drafts whose `job_id` is set.
    async fn in_flight(&self) -> Result<Vec<CampaignDraft>, DatabaseError>;
}

/// SQLite-backed [`CampaignStore`].
#[derive(Clone)]
pub struct SqliteCampaignStore {
    db: Database,
}

impl SqliteCampaignStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn write(
        &self,
        id: &str,
        expected_job_id: Option<&str>,
        update: &CampaignUpdate,
    ) -> Result<usize, DatabaseError> {
        let columns = update.columns()?;
        if columns.is_empty() {
            return Ok(0);
        }
        let now = format_timestamp(Utc::now());
        campaign_repo::update_columns(&self.db, id, expected_job_id, &columns, &now)
    }
}

#[async_trait]
impl CampaignStore for SqliteCampaignStore {
    async fn create(&self, campaign: NewCampaign) -> Result<CampaignDraft, DatabaseError> {
        let now = format_timestamp(Utc::now());
        let row = CampaignRow {
            id: uuid::Uuid::new_v4().to_string(),
            name: campaign.name,
            url: campaign.url,
            tags: serde_json::to_string(&campaign.tags)?,
            description: campaign.description,
            product_description: campaign.product_description,
            target_audience: campaign.target_audience,
            job_id: campaign.job_id,
            job_status: campaign.job_status.map(|s| s.as_str().to_string()),
            job_submitted_at: campaign.job_submitted_at.map(format_timestamp),
            job_completed_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        campaign_repo::insert(&self.db, &row)?;
        log::debug!("Created campaign draft {}", row.id);
        row_to_draft(row)
    }

    async fn update(&self, id: &str, update: CampaignUpdate) -> Result<(), DatabaseError> {
        if update.is_empty() {
            return Ok(());
        }
        match self.write(id, None, &update)? {
            0 => Err(DatabaseError::NotFound(id.to_string())),
            _ => Ok(()),
        }
    }

    async fn update_if_job(
        &self,
        id: &str,
        job_id: &str,
        update: CampaignUpdate,
    ) -> Result<bool, DatabaseError> {
        Ok(self.write(id, Some(job_id), &update)? > 0)
    }

    async fn get(&self, id: &str) -> Result<Option<CampaignDraft>, DatabaseError> {
        campaign_repo::find_by_id(&self.db, id)?
            .map(row_to_draft)
            .transpose()
    }

    async fn in_flight(&self) -> Result<Vec<CampaignDraft>, DatabaseError> {
        campaign_repo::find_in_flight(&self.db)?
            .into_iter()
            .map(row_to_draft)
            .collect()
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(s: &str, column: &'static str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corrupt {
            column,
            reason: format!("'{}': {}", s, e),
        })
}

fn parse_optional_timestamp(
    s: Option<&str>,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    s.map(|s| parse_timestamp(s, column)).transpose()
}

fn row_to_draft(row: CampaignRow) -> Result<CampaignDraft, DatabaseError> {
    let tags: Vec<String> = serde_json::from_str(&row.tags).map_err(|e| DatabaseError::Corrupt {
        column: "tags",
        reason: e.to_string(),
    })?;
    let job_status = match row.job_status.as_deref() {
        None => None,
        Some(s) => Some(JobStatus::parse(s).ok_or_else(|| DatabaseError::Corrupt {
            column: "job_status",
            reason: format!("unknown status '{}'", s),
        })?),
    };

    Ok(CampaignDraft {
        job_submitted_at: parse_optional_timestamp(row.job_submitted_at.as_deref(), "job_submitted_at")?,
        job_completed_at: parse_optional_timestamp(row.job_completed_at.as_deref(), "job_completed_at")?,
        created_at: parse_timestamp(&row.created_at, "created_at")?,
        updated_at: parse_timestamp(&row.updated_at, "updated_at")?,
        id: row.id,
        name: row.name,
        url: row.url,
        tags,
        description: row.description,
        product_description: row.product_description,
        target_audience: row.target_audience,
        job_id: row.job_id,
        job_status,
    })
}
