//! Application event bus for the analysis assist.
//!
//! Components that need to react to job lifecycle changes (the form, a
//! credit counter, a toast area) subscribe here instead of being called
//! through a global hook.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Category of a user-facing notice. Notices never block the form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Submission,
    PollTransport,
    JobFailed,
    JobTimeout,
    Persistence,
}

impl std::fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoticeKind::Submission => write!(f, "Could not start analysis"),
            NoticeKind::PollTransport => write!(f, "Lost contact with analysis"),
            NoticeKind::JobFailed => write!(f, "Analysis failed"),
            NoticeKind::JobTimeout => write!(f, "Analysis timed out"),
            NoticeKind::Persistence => write!(f, "Could not save analysis result"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AssistEvent {
    Submitted {
        campaign_id: String,
        job_id: String,
    },
    /// The result was written. Suggested tags are advisory only.
    Completed {
        campaign_id: String,
        job_id: String,
        suggested_tags: Vec<String>,
    },
    Notice {
        campaign_id: Option<String>,
        job_id: Option<String>,
        kind: NoticeKind,
        message: String,
    },
    /// A newer submission for the same campaign replaced this job.
    Superseded {
        campaign_id: String,
        job_id: String,
    },
    Cancelled {
        campaign_id: String,
        job_id: String,
    },
    /// A submission consumed service credits.
    CreditsChanged,
}

impl AssistEvent {
    pub fn notice(
        kind: NoticeKind,
        campaign_id: Option<&str>,
        job_id: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        AssistEvent::Notice {
            campaign_id: campaign_id.map(str::to_string),
            job_id: job_id.map(str::to_string),
            kind,
            message: message.into(),
        }
    }
}

/// Broadcasts [`AssistEvent`]s to every subscriber.
#[derive(Clone)]
pub struct AssistEventBroadcaster {
    sender: Arc<broadcast::Sender<AssistEvent>>,
}

impl AssistEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: AssistEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AssistEvent> {
        self.sender.subscribe()
    }
}

impl Default for AssistEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
