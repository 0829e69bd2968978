//! reqwest-backed client for the analysis service.

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, RequestBuilder, Response, Url};
use secrecy::{ExposeSecret, SecretString};

use super::error::ServiceError;
use super::types::{StatusResponse, SubmitRequest, SubmitResponse};
use super::AnalysisService;
use crate::config::ServiceConfig;

/// Maximum length of an error body kept in errors and logs.
const MAX_ERROR_BODY_LENGTH: usize = 200;

fn truncate_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}

/// Talks to `POST /analyze` and `GET /analyze/status/{jobId}` under a base URL.
pub struct HttpAnalysisService {
    client: Client,
    base_url: Url,
    credential: Option<SecretString>,
    credential_header: String,
}

impl HttpAnalysisService {
    pub fn new(config: &ServiceConfig, credential: Option<SecretString>) -> Result<Self, ServiceError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ServiceError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::InvalidUrl(format!(
                "{} cannot be used as a base URL",
                config.base_url
            )));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ServiceError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            credential,
            credential_header: config.credential_header.clone(),
        })
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credential {
            Some(secret) => request.header(self.credential_header.as_str(), secret.expose_secret()),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::Http {
            status: status.as_u16(),
            body: truncate_body(&body),
        })
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn submit(&self, url: &str) -> Result<SubmitResponse, ServiceError> {
        let endpoint = self.endpoint(&["analyze"])?;
        info!("Submitting {} for analysis", url);

        let request = self.client.post(endpoint).json(&SubmitRequest {
            url: url.to_string(),
        });
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let response = Self::check(response).await?;

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;

        info!(
            "Analysis job {} accepted with status {}",
            submitted.job_id, submitted.status
        );
        Ok(submitted)
    }

    async fn get_status(&self, job_id: &str) -> Result<StatusResponse, ServiceError> {
        let endpoint = self.endpoint(&["analyze", "status", job_id])?;

        let response = self
            .authorize(self.client.get(endpoint))
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let response = Self::check(response).await?;

        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;

        debug!("Job {} status: {}", job_id, status.status);
        Ok(status)
    }
}
