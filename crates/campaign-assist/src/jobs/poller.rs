//! Serial status polling for one analysis job.
//!
//! The next status query is only scheduled once the previous one has
//! resolved, so polls for a job never overlap. Both the interval wait and
//! the in-flight query race against the cancellation token and against a
//! deadline of [`PollerConfig::ceiling`] from the start of the loop, so slow
//! responses cannot stretch the loop past that bound.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::state::{PollEvent, PollState};
use crate::config::PollingConfig;
use crate::service::{AnalysisResult, AnalysisService, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollerConfig {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            max_attempts: config.max_attempts,
        }
    }
}

impl PollerConfig {
    /// Upper bound on how long a poll loop runs before it must be terminal.
    pub fn ceiling(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// Live view of a job for the UI. Progress fields are advisory only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollProgress {
    pub job_id: Option<String>,
    pub state: PollState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    /// Tags the analysis suggested. The user opts into these; they are
    /// never written to the draft automatically.
    pub suggested_tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl PollProgress {
    pub fn submitting() -> Self {
        Self {
            job_id: None,
            state: PollState::Submitting,
            current_step: None,
            progress_message: None,
            suggested_tags: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Why a job ended up `FAILED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The service reported `FAILED`.
    Reported,
    /// A status query failed; not retried.
    Transport(String),
    /// The state machine rejected an event.
    Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed(AnalysisResult),
    Failed(FailureCause),
    TimedOut { attempts: u32 },
}

impl TerminalOutcome {
    /// The status recorded on the draft. A timeout is stored as `FAILED`.
    pub fn persisted_status(&self) -> JobStatus {
        match self {
            TerminalOutcome::Completed(_) => JobStatus::Completed,
            TerminalOutcome::Failed(_) | TerminalOutcome::TimedOut { .. } => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Terminal(TerminalOutcome),
    Cancelled,
}

pub struct JobPoller {
    service: Arc<dyn AnalysisService>,
    config: PollerConfig,
}

impl JobPoller {
    pub fn new(service: Arc<dyn AnalysisService>, config: PollerConfig) -> Self {
        Self { service, config }
    }

    /// Polls `job_id` until a terminal status, the attempt budget or the
    /// deadline runs out, or `cancel` fires. Every state change is published on `progress`.
    pub async fn poll(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
        progress: &watch::Sender<PollProgress>,
    ) -> PollOutcome {
        let max_attempts = self.config.max_attempts;
        let mut state = match PollState::Submitting.apply(PollEvent::Submitted, max_attempts) {
            Ok(state) => state,
            Err(e) => return PollOutcome::Terminal(protocol_failure(job_id, e)),
        };
        publish(progress, |p| {
            p.job_id = Some(job_id.to_string());
            p.state = state;
        });

        info!(
            "Polling job {} every {:?} (max {} attempts)",
            job_id, self.config.interval, max_attempts
        );

        let deadline = tokio::time::sleep(self.config.ceiling());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(job_id, state, progress),
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = &mut deadline => return deadline_reached(job_id, state, max_attempts, progress),
            }

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(job_id, state, progress),
                response = self.service.get_status(job_id) => response,
                _ = &mut deadline => return deadline_reached(job_id, state, max_attempts, progress),
            };

            let mut transport_error = None;
            let mut result = None;
            let event = match response {
                Ok(status) => {
                    debug!(
                        "Job {} is {} (step: {})",
                        job_id,
                        status.status,
                        status.current_step.as_deref().unwrap_or("-")
                    );
                    publish(progress, |p| {
                        p.current_step = status.current_step.clone();
                        p.progress_message = status.progress_message.clone();
                    });
                    result = status.result;
                    PollEvent::StatusReceived(status.status)
                }
                Err(e) => {
                    warn!("Status poll for job {} failed: {}", job_id, e);
                    transport_error = Some(e.to_string());
                    PollEvent::TransportError
                }
            };

            state = match state.apply(event, max_attempts) {
                Ok(next) => next,
                Err(e) => return PollOutcome::Terminal(protocol_failure(job_id, e)),
            };
            publish(progress, |p| p.state = state);

            let outcome = match state {
                PollState::Polling { .. } => continue,
                PollState::Completed => {
                    let result = result.unwrap_or_else(|| {
                        warn!("Job {} completed without a result", job_id);
                        AnalysisResult::default()
                    });
                    publish(progress, |p| p.suggested_tags = result.tags.clone());
                    info!("Job {} completed", job_id);
                    TerminalOutcome::Completed(result)
                }
                PollState::Failed => {
                    let cause = transport_error
                        .map(FailureCause::Transport)
                        .unwrap_or(FailureCause::Reported);
                    warn!("Job {} failed: {:?}", job_id, cause);
                    TerminalOutcome::Failed(cause)
                }
                PollState::TimedOut => {
                    warn!("Job {} timed out after {} polls", job_id, max_attempts);
                    TerminalOutcome::TimedOut {
                        attempts: max_attempts,
                    }
                }
                PollState::Submitting | PollState::Cancelled => {
                    let reason = format!("poll loop reached unexpected state {}", state);
                    error!("Job {}: {}", job_id, reason);
                    TerminalOutcome::Failed(FailureCause::Protocol(reason))
                }
            };
            return PollOutcome::Terminal(outcome);
        }
    }
}

fn publish(progress: &watch::Sender<PollProgress>, update: impl FnOnce(&mut PollProgress)) {
    progress.send_modify(|p| {
        update(p);
        p.updated_at = Utc::now();
    });
}

fn cancelled(job_id: &str, state: PollState, progress: &watch::Sender<PollProgress>) -> PollOutcome {
    let next = state
        .apply(PollEvent::Cancelled, u32::MAX)
        .unwrap_or(PollState::Cancelled);
    publish(progress, |p| p.state = next);
    info!("Polling for job {} cancelled", job_id);
    PollOutcome::Cancelled
}

fn deadline_reached(
    job_id: &str,
    state: PollState,
    max_attempts: u32,
    progress: &watch::Sender<PollProgress>,
) -> PollOutcome {
    let attempts = state.attempts().unwrap_or(0);
    let next = match state.apply(PollEvent::DeadlineReached, max_attempts) {
        Ok(next) => next,
        Err(e) => return PollOutcome::Terminal(protocol_failure(job_id, e)),
    };
    publish(progress, |p| p.state = next);
    warn!(
        "Job {} timed out after {} answered polls (deadline reached)",
        job_id, attempts
    );
    PollOutcome::Terminal(TerminalOutcome::TimedOut { attempts })
}

fn protocol_failure(job_id: &str, e: super::state::IllegalTransition) -> TerminalOutcome {
    error!("Job {}: {}", job_id, e);
    TerminalOutcome::Failed(FailureCause::Protocol(e.to_string()))
}
