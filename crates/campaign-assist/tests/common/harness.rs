//! Test harness wiring a workflow to scripted fakes and an on-disk database.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::{broadcast, watch};

use campaign_assist::jobs::{AnalysisWorkflow, FormSnapshot, PollerConfig};
use campaign_assist::store::{CampaignDraft, CampaignStore, SqliteCampaignStore};
use campaign_assist::{AssistEvent, AssistEventBroadcaster, Database};

use super::fakes::{RecordingStore, ScriptedAnalysisService};

pub struct TestHarness {
    _temp_dir: TempDir,
    pub service: Arc<ScriptedAnalysisService>,
    pub store: Arc<RecordingStore>,
    pub workflow: AnalysisWorkflow,
    events: broadcast::Receiver<AssistEvent>,
}

impl TestHarness {
    pub fn new(service: ScriptedAnalysisService) -> Self {
        Self::with_config(service, PollerConfig::default())
    }

    pub fn with_config(service: ScriptedAnalysisService, config: PollerConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("data").join("campaigns.db"))
            .expect("Failed to open test database");
        let store = Arc::new(RecordingStore::new(SqliteCampaignStore::new(db)));
        let service = Arc::new(service);

        let broadcaster = AssistEventBroadcaster::new(256);
        let events = broadcaster.subscribe();
        let workflow = AnalysisWorkflow::new(
            service.clone(),
            store.clone(),
            config,
            broadcaster,
        );

        Self {
            _temp_dir: temp_dir,
            service,
            store,
            workflow,
            events,
        }
    }

    pub async fn draft(&self, id: &str) -> CampaignDraft {
        self.store
            .get(id)
            .await
            .expect("store read failed")
            .expect("draft missing")
    }

    /// Every event broadcast so far that has not been drained yet.
    pub fn drain_events(&mut self) -> Vec<AssistEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// A form channel; keep the sender alive to edit the form mid-job.
pub fn form(snapshot: FormSnapshot) -> (watch::Sender<FormSnapshot>, watch::Receiver<FormSnapshot>) {
    watch::channel(snapshot)
}
