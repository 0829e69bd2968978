pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod secrets;
pub mod service;
pub mod store;

pub use broadcast::{AssistEvent, AssistEventBroadcaster, NoticeKind};
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{AssistError, ConfigError, Result};
pub use jobs::{
    AnalysisHandle, AnalysisWorkflow, DraftTarget, FormSnapshot, JobReport, PollProgress,
    PollState, PollerConfig,
};
pub use secrets::{resolve_credential, resolve_secret, SecretError};
pub use service::{AnalysisService, HttpAnalysisService, JobStatus, ServiceError};
pub use store::{CampaignDraft, CampaignStore, CampaignUpdate, NewCampaign, SqliteCampaignStore};
