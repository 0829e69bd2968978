//! In-process stand-ins for the analysis service and the campaign store.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use campaign_assist::service::{
    AnalysisResult, AnalysisService, JobStatus, ServiceError, StatusResponse, SubmitResponse,
};
use campaign_assist::store::{
    CampaignDraft, CampaignStore, CampaignUpdate, NewCampaign, SqliteCampaignStore,
};
use campaign_assist::DatabaseError;

/// One scripted answer to a status query.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(StatusResponse),
    TransportError,
    /// Never answers; only cancellation ends the query.
    Hang,
}

pub fn pending() -> Step {
    Step::Respond(StatusResponse::new(JobStatus::Pending))
}

pub fn running(step: &str) -> Step {
    Step::Respond(StatusResponse::new(JobStatus::Running).with_progress(step, "working"))
}

pub fn completed(result: AnalysisResult) -> Step {
    Step::Respond(StatusResponse::completed(result))
}

pub fn failed() -> Step {
    Step::Respond(StatusResponse::new(JobStatus::Failed))
}

enum SubmitStep {
    Accept { job_id: String, status: JobStatus },
    Reject { status: u16 },
}

/// Replays scripted submit and status responses.
///
/// Each job's status script is consumed in order; the last step repeats once
/// the script is down to one entry. Unscripted jobs stay `PENDING`.
#[derive(Default)]
pub struct ScriptedAnalysisService {
    submits: Mutex<VecDeque<SubmitStep>>,
    statuses: Mutex<HashMap<String, VecDeque<Step>>>,
    submit_calls: AtomicUsize,
    status_calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedAnalysisService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(self, job_id: &str) -> Self {
        self.accept_with(job_id, JobStatus::Pending)
    }

    pub fn accept_with(self, job_id: &str, status: JobStatus) -> Self {
        self.submits.lock().unwrap().push_back(SubmitStep::Accept {
            job_id: job_id.to_string(),
            status,
        });
        self
    }

    pub fn reject(self, status: u16) -> Self {
        self.submits
            .lock()
            .unwrap()
            .push_back(SubmitStep::Reject { status });
        self
    }

    pub fn statuses(self, job_id: &str, steps: Vec<Step>) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id.to_string(), steps.into());
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self, job_id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_status_calls(&self) -> usize {
        self.status_calls.lock().unwrap().values().sum()
    }

    fn next_step(&self, job_id: &str) -> Step {
        let mut statuses = self.statuses.lock().unwrap();
        match statuses.get_mut(job_id) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap(),
            Some(script) => script.front().cloned().unwrap_or_else(pending),
            None => pending(),
        }
    }
}

#[async_trait]
impl AnalysisService for ScriptedAnalysisService {
    async fn submit(&self, _url: &str) -> Result<SubmitResponse, ServiceError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
        match self.submits.lock().unwrap().pop_front() {
            Some(SubmitStep::Accept { job_id, status }) => Ok(SubmitResponse { job_id, status }),
            Some(SubmitStep::Reject { status }) => Err(ServiceError::Http {
                status,
                body: "Internal Server Error".to_string(),
            }),
            None => Ok(SubmitResponse {
                job_id: format!("job-auto-{}", n + 1),
                status: JobStatus::Pending,
            }),
        }
    }

    async fn get_status(&self, job_id: &str) -> Result<StatusResponse, ServiceError> {
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default() += 1;

        match self.next_step(job_id) {
            Step::Respond(response) => Ok(response),
            Step::TransportError => Err(ServiceError::Transport("connection reset".to_string())),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// Wraps the SQLite store and records every update it is asked to apply.
pub struct RecordingStore {
    inner: SqliteCampaignStore,
    creates: AtomicUsize,
    updates: Mutex<Vec<(String, CampaignUpdate)>>,
    fail_terminal_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new(inner: SqliteCampaignStore) -> Self {
        Self {
            inner,
            creates: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
            fail_terminal_writes: AtomicBool::new(false),
        }
    }

    /// Makes every update that records a terminal status fail.
    pub fn fail_terminal_writes(&self) {
        self.fail_terminal_writes.store(true, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<(String, CampaignUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    /// Updates that carried a terminal `job_status`.
    pub fn terminal_writes(&self) -> usize {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, update)| update.is_terminal())
            .count()
    }

    /// Seeds a draft without counting it as a workflow write.
    pub async fn seed(&self, campaign: NewCampaign) -> CampaignDraft {
        self.inner.create(campaign).await.unwrap()
    }

    fn record(&self, id: &str, update: &CampaignUpdate) -> Result<(), DatabaseError> {
        self.updates
            .lock()
            .unwrap()
            .push((id.to_string(), update.clone()));
        if update.is_terminal() && self.fail_terminal_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::LockPoisoned);
        }
        Ok(())
    }
}

#[async_trait]
impl CampaignStore for RecordingStore {
    async fn create(&self, campaign: NewCampaign) -> Result<CampaignDraft, DatabaseError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(campaign).await
    }

    async fn update(&self, id: &str, update: CampaignUpdate) -> Result<(), DatabaseError> {
        self.record(id, &update)?;
        self.inner.update(id, update).await
    }

    async fn update_if_job(
        &self,
        id: &str,
        job_id: &str,
        update: CampaignUpdate,
    ) -> Result<bool, DatabaseError> {
        self.record(id, &update)?;
        self.inner.update_if_job(id, job_id, update).await
    }

    async fn get(&self, id: &str) -> Result<Option<CampaignDraft>, DatabaseError> {
        self.inner.get(id).await
    }

    async fn in_flight(&self) -> Result<Vec<CampaignDraft>, DatabaseError> {
        self.inner.in_flight().await
    }
}

pub fn acme_analysis_result() -> AnalysisResult {
    AnalysisResult {
        tags: vec!["b2b".to_string(), "saas".to_string()],
        suggested_description: Some("X".to_string()),
        product_description: Some("Y".to_string()),
        target_audience: Some("Z".to_string()),
    }
}
