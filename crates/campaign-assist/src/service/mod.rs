//! The remote analysis service.
//!
//! Orchestration code depends on the [`AnalysisService`] trait only; the
//! reqwest-backed [`HttpAnalysisService`] is the production implementation.

use async_trait::async_trait;

pub mod error;
pub mod http;
pub mod types;

pub use error::ServiceError;
pub use http::HttpAnalysisService;
pub use types::{AnalysisResult, JobStatus, StatusResponse, SubmitRequest, SubmitResponse};

#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Starts an analysis job for `url`.
    async fn submit(&self, url: &str) -> Result<SubmitResponse, ServiceError>;

    /// Fetches the current status of a job.
    async fn get_status(&self, job_id: &str) -> Result<StatusResponse, ServiceError>;
}
