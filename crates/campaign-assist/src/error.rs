use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::jobs::state::IllegalTransition;
use crate::secrets::SecretError;
use crate::service::ServiceError;

#[derive(Error, Debug)]
pub enum AssistError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Secret(#[from] SecretError),

    #[error("Failed to set up analysis service client: {0}")]
    ServiceClient(#[source] ServiceError),

    #[error("Submission failed: {0}")]
    Submission(#[source] ServiceError),

    #[error("Status poll for job '{job_id}' failed: {source}")]
    PollTransport {
        job_id: String,
        #[source]
        source: ServiceError,
    },

    #[error("Analysis job '{job_id}' reported failure")]
    JobFailed { job_id: String },

    #[error("Analysis job '{job_id}' did not finish after {attempts} polls")]
    JobTimeout { job_id: String, attempts: u32 },

    #[error("Persistence error: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Poll state machine error: {0}")]
    StateMachine(#[from] IllegalTransition),

    #[error("Workflow task for job '{job_id}' aborted: {reason}")]
    TaskAborted { job_id: String, reason: String },

    #[error("Analysis workflow has been shut down")]
    ShutDown,

    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("No config file given and no home directory to look in")]
    NoConfigPath,
}

pub type Result<T> = std::result::Result<T, AssistError>;
