//! Wires submission, polling and reconciliation into one cancellable chain
//! per job.
//!
//! Each campaign has at most one accepted job. Starting another job for the
//! same campaign cancels the previous chain, and a chain only writes while
//! its job is still the accepted one. The check and the write happen under
//! the same lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use log::{error, info, warn};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::poller::{FailureCause, JobPoller, PollOutcome, PollProgress, PollerConfig, TerminalOutcome};
use super::reconciler::{FormSnapshot, ReconcileAck, ReconciliationWriter};
use super::submitter::{DraftTarget, JobSubmitter};
use crate::broadcast::{AssistEvent, AssistEventBroadcaster, NoticeKind};
use crate::error::{AssistError, Result};
use crate::service::{AnalysisService, JobStatus, ServiceError};
use crate::store::{CampaignStore, CampaignUpdate};

/// How a job chain ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReport {
    /// The terminal write went through.
    Reconciled(ReconcileAck),
    /// A newer job for the same campaign took over; nothing was written.
    Superseded { job_id: String },
    /// Stopped by the caller or by shutdown; nothing was written.
    Cancelled { job_id: String },
    /// The terminal write failed. The draft keeps its stale `job_id`.
    WriteFailed { job_id: String, reason: String },
}

#[derive(Clone)]
struct AcceptedJob {
    job_id: String,
    cancel: CancellationToken,
}

type AcceptedJobs = Arc<Mutex<HashMap<String, AcceptedJob>>>;

pub struct AnalysisWorkflow {
    submitter: JobSubmitter,
    poller: Arc<JobPoller>,
    writer: Arc<ReconciliationWriter>,
    store: Arc<dyn CampaignStore>,
    events: AssistEventBroadcaster,
    accepted: AcceptedJobs,
    lifetime: CancellationToken,
}

impl AnalysisWorkflow {
    pub fn new(
        service: Arc<dyn AnalysisService>,
        store: Arc<dyn CampaignStore>,
        config: PollerConfig,
        events: AssistEventBroadcaster,
    ) -> Self {
        Self {
            submitter: JobSubmitter::new(Arc::clone(&service), Arc::clone(&store)),
            poller: Arc::new(JobPoller::new(service, config)),
            writer: Arc::new(ReconciliationWriter::new(Arc::clone(&store))),
            store,
            events,
            accepted: Arc::new(Mutex::new(HashMap::new())),
            lifetime: CancellationToken::new(),
        }
    }

    pub fn events(&self) -> &AssistEventBroadcaster {
        &self.events
    }

    /// The job currently accepted for `campaign_id`, if any.
    pub async fn accepted_job(&self, campaign_id: &str) -> Option<String> {
        self.accepted
            .lock()
            .await
            .get(campaign_id)
            .map(|job| job.job_id.clone())
    }

    /// Submits `url` and spawns the poll chain for the new job.
    ///
    /// `form` is read once, when the job reaches a terminal state. Dropping
    /// the returned handle cancels the chain.
    pub async fn start(
        &self,
        url: &str,
        target: DraftTarget,
        form: watch::Receiver<FormSnapshot>,
    ) -> Result<AnalysisHandle> {
        if self.lifetime.is_cancelled() {
            return Err(AssistError::ShutDown);
        }

        let submitted = match self.submitter.submit(url, target).await {
            Ok(job) => job,
            Err(e) => {
                warn!("Analysis submission for {} failed: {}", url, e);
                let kind = match &e {
                    AssistError::Persistence(_) => NoticeKind::Persistence,
                    _ => NoticeKind::Submission,
                };
                self.events
                    .send(AssistEvent::notice(kind, None, None, e.to_string()));
                return Err(e);
            }
        };
        let campaign_id = submitted.campaign_id;
        let job_id = submitted.job_id;

        self.events.send(AssistEvent::Submitted {
            campaign_id: campaign_id.clone(),
            job_id: job_id.clone(),
        });
        self.events.send(AssistEvent::CreditsChanged);

        let cancel = self.lifetime.child_token();
        {
            let mut accepted = self.accepted.lock().await;
            let replaced = accepted.insert(
                campaign_id.clone(),
                AcceptedJob {
                    job_id: job_id.clone(),
                    cancel: cancel.clone(),
                },
            );
            if let Some(previous) = replaced {
                info!(
                    "Job {} supersedes job {} for campaign {}",
                    job_id, previous.job_id, campaign_id
                );
                previous.cancel.cancel();
                self.events.send(AssistEvent::Superseded {
                    campaign_id: campaign_id.clone(),
                    job_id: previous.job_id,
                });
            }
        }

        let (progress_tx, progress_rx) = watch::channel(PollProgress::submitting());
        let chain = JobChain {
            campaign_id: campaign_id.clone(),
            job_id: job_id.clone(),
            cancel: cancel.clone(),
            form,
            progress: progress_tx,
            poller: Arc::clone(&self.poller),
            writer: Arc::clone(&self.writer),
            events: self.events.clone(),
            accepted: Arc::clone(&self.accepted),
        };
        let task = tokio::spawn(chain.run());

        Ok(AnalysisHandle {
            campaign_id,
            job_id,
            created: submitted.created,
            progress: progress_rx,
            cancel: cancel.clone(),
            task,
            guard: cancel.drop_guard(),
        })
    }

    /// Cancels every in-flight chain. No write follows a cancellation.
    pub fn shutdown(&self) {
        info!("Shutting down analysis workflow");
        self.lifetime.cancel();
    }

    /// Marks drafts left with an in-flight job by an earlier process as
    /// `FAILED` once their submission is older than `max_age`.
    ///
    /// Jobs tracked by this workflow are left alone. Returns the number of
    /// drafts cleared.
    pub async fn clear_stale_jobs(&self, max_age: Duration) -> Result<usize> {
        let now = Utc::now();
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        let Some(cutoff) = now.checked_sub_signed(max_age) else {
            return Ok(0);
        };

        let tracked: HashSet<String> = self
            .accepted
            .lock()
            .await
            .values()
            .map(|job| job.job_id.clone())
            .collect();

        let mut cleared = 0;
        for draft in self.store.in_flight().await? {
            let Some(job_id) = draft.job_id.as_deref() else {
                continue;
            };
            if tracked.contains(job_id) {
                continue;
            }
            if draft.job_submitted_at.is_some_and(|at| at > cutoff) {
                continue;
            }

            let update = CampaignUpdate::terminal(JobStatus::Failed, now);
            if self.store.update_if_job(&draft.id, job_id, update).await? {
                warn!(
                    "Cleared stale job {} on campaign {} (submitted {:?})",
                    job_id, draft.id, draft.job_submitted_at
                );
                cleared += 1;
            }
        }

        if cleared > 0 {
            info!("Stale job sweep cleared {} draft(s)", cleared);
        }
        Ok(cleared)
    }
}

/// Caller-side view of one job chain.
pub struct AnalysisHandle {
    campaign_id: String,
    job_id: String,
    created: bool,
    progress: watch::Receiver<PollProgress>,
    cancel: CancellationToken,
    task: JoinHandle<JobReport>,
    guard: DropGuard,
}

impl AnalysisHandle {
    pub fn campaign_id(&self) -> &str {
        &self.campaign_id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Whether the submission created the draft.
    pub fn created(&self) -> bool {
        self.created
    }

    pub fn progress(&self) -> watch::Receiver<PollProgress> {
        self.progress.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the chain to finish.
    pub async fn wait(self) -> Result<JobReport> {
        let AnalysisHandle {
            job_id, task, guard, ..
        } = self;
        let report = task.await.map_err(|e| AssistError::TaskAborted {
            job_id,
            reason: e.to_string(),
        });
        drop(guard);
        report
    }
}

struct JobChain {
    campaign_id: String,
    job_id: String,
    cancel: CancellationToken,
    form: watch::Receiver<FormSnapshot>,
    progress: watch::Sender<PollProgress>,
    poller: Arc<JobPoller>,
    writer: Arc<ReconciliationWriter>,
    events: AssistEventBroadcaster,
    accepted: AcceptedJobs,
}

impl JobChain {
    async fn run(self) -> JobReport {
        let outcome = match self.poller.poll(&self.job_id, &self.cancel, &self.progress).await {
            PollOutcome::Terminal(outcome) => outcome,
            PollOutcome::Cancelled => return self.release_cancelled().await,
        };

        let mut accepted = self.accepted.lock().await;
        if !self.is_accepted(&accepted) {
            info!(
                "Discarding result of superseded job {} for campaign {}",
                self.job_id, self.campaign_id
            );
            return JobReport::Superseded {
                job_id: self.job_id.clone(),
            };
        }
        if self.cancel.is_cancelled() {
            accepted.remove(&self.campaign_id);
            drop(accepted);
            return self.cancelled();
        }

        let snapshot = self.form.borrow().clone();
        let written = self
            .writer
            .reconcile(&self.campaign_id, &self.job_id, &outcome, &snapshot)
            .await;
        accepted.remove(&self.campaign_id);
        drop(accepted);

        match written {
            Ok(ack) => {
                self.announce(&outcome);
                JobReport::Reconciled(ack)
            }
            Err(e) => {
                error!(
                    "Failed to record result of job {} on campaign {}: {}",
                    self.job_id, self.campaign_id, e
                );
                let e = AssistError::Persistence(e);
                self.notice(NoticeKind::Persistence, &e);
                JobReport::WriteFailed {
                    job_id: self.job_id.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }

    fn is_accepted(&self, accepted: &HashMap<String, AcceptedJob>) -> bool {
        accepted
            .get(&self.campaign_id)
            .is_some_and(|job| job.job_id == self.job_id)
    }

    async fn release_cancelled(&self) -> JobReport {
        let mut accepted = self.accepted.lock().await;
        if !self.is_accepted(&accepted) {
            return JobReport::Superseded {
                job_id: self.job_id.clone(),
            };
        }
        accepted.remove(&self.campaign_id);
        drop(accepted);
        self.cancelled()
    }

    fn cancelled(&self) -> JobReport {
        info!(
            "Job {} for campaign {} cancelled; nothing written",
            self.job_id, self.campaign_id
        );
        self.events.send(AssistEvent::Cancelled {
            campaign_id: self.campaign_id.clone(),
            job_id: self.job_id.clone(),
        });
        JobReport::Cancelled {
            job_id: self.job_id.clone(),
        }
    }

    fn announce(&self, outcome: &TerminalOutcome) {
        let job_id = self.job_id.clone();
        match outcome {
            TerminalOutcome::Completed(result) => self.events.send(AssistEvent::Completed {
                campaign_id: self.campaign_id.clone(),
                job_id,
                suggested_tags: result.tags.clone(),
            }),
            TerminalOutcome::Failed(FailureCause::Transport(message)) => self.notice(
                NoticeKind::PollTransport,
                &AssistError::PollTransport {
                    job_id,
                    source: ServiceError::Transport(message.clone()),
                },
            ),
            TerminalOutcome::Failed(FailureCause::Reported | FailureCause::Protocol(_)) => {
                self.notice(NoticeKind::JobFailed, &AssistError::JobFailed { job_id })
            }
            TerminalOutcome::TimedOut { attempts } => self.notice(
                NoticeKind::JobTimeout,
                &AssistError::JobTimeout {
                    job_id,
                    attempts: *attempts,
                },
            ),
        }
    }

    fn notice(&self, kind: NoticeKind, error: &AssistError) {
        self.events.send(AssistEvent::notice(
            kind,
            Some(&self.campaign_id),
            Some(&self.job_id),
            error.to_string(),
        ));
    }
}
