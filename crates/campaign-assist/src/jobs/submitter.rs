//! Job submission.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::Url;

use crate::db::DatabaseError;
use crate::error::{AssistError, Result};
use crate::service::{AnalysisService, JobStatus, ServiceError};
use crate::store::{CampaignStore, NewCampaign};

/// Which draft a job is submitted for.
#[derive(Debug, Clone)]
pub enum DraftTarget {
    /// First submission of a new campaign; the draft is created on success.
    New(NewCampaign),
    /// Edit flow. The draft's job fields are only written on reconciliation.
    Existing(String),
}

/// A job the service accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub campaign_id: String,
    pub job_id: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    /// Whether a draft was created for this submission.
    pub created: bool,
}

pub struct JobSubmitter {
    service: Arc<dyn AnalysisService>,
    store: Arc<dyn CampaignStore>,
}

impl JobSubmitter {
    pub fn new(service: Arc<dyn AnalysisService>, store: Arc<dyn CampaignStore>) -> Self {
        Self { service, store }
    }

    /// Submits `url` for analysis.
    ///
    /// Nothing is persisted unless the service accepts the job. For a new
    /// campaign the draft is created with the job fields in one insert. An
    /// edit target must already exist; otherwise the service is not called.
    pub async fn submit(&self, url: &str, target: DraftTarget) -> Result<SubmittedJob> {
        validate_url(url).map_err(AssistError::Submission)?;
        if let DraftTarget::Existing(id) = &target {
            if self.store.get(id).await?.is_none() {
                return Err(DatabaseError::NotFound(id.clone()).into());
            }
        }

        let response = self
            .service
            .submit(url)
            .await
            .map_err(AssistError::Submission)?;
        let submitted_at = Utc::now();

        // An in-flight job id is always paired with a non-terminal status.
        let status = if response.status.is_terminal() {
            warn!(
                "Service returned {} for new job {}; recording PENDING until polled",
                response.status, response.job_id
            );
            JobStatus::Pending
        } else {
            response.status
        };

        let (campaign_id, created) = match target {
            DraftTarget::New(campaign) => {
                let draft = self
                    .store
                    .create(NewCampaign {
                        url: url.to_string(),
                        job_id: Some(response.job_id.clone()),
                        job_status: Some(status),
                        job_submitted_at: Some(submitted_at),
                        ..campaign
                    })
                    .await?;
                (draft.id, true)
            }
            DraftTarget::Existing(id) => {
                debug!("Job {} tagged onto existing draft {}", response.job_id, id);
                (id, false)
            }
        };

        info!(
            "Submitted {} for analysis as job {} (campaign {})",
            url, response.job_id, campaign_id
        );

        Ok(SubmittedJob {
            campaign_id,
            job_id: response.job_id,
            status,
            submitted_at,
            created,
        })
    }
}

fn validate_url(url: &str) -> std::result::Result<(), ServiceError> {
    let parsed = Url::parse(url).map_err(|e| ServiceError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        _ => Err(ServiceError::InvalidUrl(format!(
            "{}: only http and https pages can be analyzed",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::service::{StatusResponse, SubmitResponse};
    use crate::store::SqliteCampaignStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSubmit {
        status: Option<JobStatus>,
        calls: AtomicUsize,
    }

    impl FixedSubmit {
        fn accepting(status: JobStatus) -> Arc<Self> {
            Arc::new(Self {
                status: Some(status),
                calls: AtomicUsize::new(0),
            })
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                status: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AnalysisService for FixedSubmit {
        async fn submit(&self, _url: &str) -> std::result::Result<SubmitResponse, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.status {
                Some(status) => Ok(SubmitResponse {
                    job_id: "job-1".to_string(),
                    status,
                }),
                None => Err(ServiceError::Http {
                    status: 500,
                    body: "boom".to_string(),
                }),
            }
        }

        async fn get_status(
            &self,
            _job_id: &str,
        ) -> std::result::Result<StatusResponse, ServiceError> {
            unreachable!("submitter never polls")
        }
    }

    fn store() -> Arc<SqliteCampaignStore> {
        Arc::new(SqliteCampaignStore::new(Database::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_new_campaign_creates_draft_with_job_fields() {
        let store = store();
        let submitter = JobSubmitter::new(FixedSubmit::accepting(JobStatus::Pending), store.clone());

        let job = submitter
            .submit(
                "https://acme.com",
                DraftTarget::New(NewCampaign::new("Spring launch", "")),
            )
            .await
            .unwrap();
        assert!(job.created);

        let draft = store.get(&job.campaign_id).await.unwrap().unwrap();
        assert_eq!(draft.url, "https://acme.com");
        assert_eq!(draft.job_id.as_deref(), Some("job-1"));
        assert_eq!(draft.job_status, Some(JobStatus::Pending));
        assert!(draft.job_submitted_at.is_some());
    }

    #[tokio::test]
    async fn test_existing_campaign_is_not_written() {
        let store = store();
        let existing = store
            .create(NewCampaign::new("Autumn", "https://old.example"))
            .await
            .unwrap();
        let submitter = JobSubmitter::new(FixedSubmit::accepting(JobStatus::Running), store.clone());

        let job = submitter
            .submit("https://acme.com", DraftTarget::Existing(existing.id.clone()))
            .await
            .unwrap();
        assert!(!job.created);
        assert_eq!(job.campaign_id, existing.id);

        let draft = store.get(&existing.id).await.unwrap().unwrap();
        assert_eq!(draft, existing);
    }

    #[tokio::test]
    async fn test_unknown_campaign_never_reaches_service() {
        let service = FixedSubmit::accepting(JobStatus::Pending);
        let submitter = JobSubmitter::new(service.clone(), store());

        let err = submitter
            .submit("https://acme.com", DraftTarget::Existing("missing".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AssistError::Persistence(DatabaseError::NotFound(ref id)) if id == "missing"
        ));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_submission_creates_nothing() {
        let store = store();
        let submitter = JobSubmitter::new(FixedSubmit::rejecting(), store.clone());

        let err = submitter
            .submit("https://acme.com", DraftTarget::New(NewCampaign::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, AssistError::Submission(ServiceError::Http { status: 500, .. })));
        assert!(store.in_flight().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_never_reaches_service() {
        let service = FixedSubmit::accepting(JobStatus::Pending);
        let submitter = JobSubmitter::new(service.clone(), store());

        for url in ["ftp://acme.com", "not a url", "mailto:a@b.c"] {
            let err = submitter
                .submit(url, DraftTarget::New(NewCampaign::default()))
                .await
                .unwrap_err();
            assert!(matches!(err, AssistError::Submission(ServiceError::InvalidUrl(_))));
        }
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_terminal_submit_status_recorded_as_pending() {
        let store = store();
        let submitter =
            JobSubmitter::new(FixedSubmit::accepting(JobStatus::Completed), store.clone());

        let job = submitter
            .submit("https://acme.com", DraftTarget::New(NewCampaign::default()))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }
}
