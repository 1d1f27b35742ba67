// HTTP CrawlerGateway Implementation

use crate::error::{check_status, endpoint, map_reqwest_error, read_json};
use async_trait::async_trait;
use auditdesk_core::domain::{AuditResult, RemoteState, RemoteStatus};
use auditdesk_core::error::{AppError, Result};
use auditdesk_core::port::{
    CrawlerGateway, CrawlerHealth, GatewayError, TimeProvider, DEFAULT_CALL_TIMEOUT,
    HEALTH_CHECK_TIMEOUT,
};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Crawler connection settings
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub base_url: String,
    pub health_timeout: Duration,
    /// Default for calls made without an explicit timeout
    pub request_timeout: Duration,
}

impl CrawlerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            health_timeout: HEALTH_CHECK_TIMEOUT,
            request_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartAuditBody<'a> {
    project_id: &'a str,
    options: &'a serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartAuditResponse {
    #[serde(alias = "job_id")]
    job_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    state: String,
    #[serde(default)]
    progress: Option<f64>,
}

#[derive(Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
}

/// reqwest client for the crawler service.
///
/// Every request carries its own timeout; nothing is retried here.
pub struct HttpCrawlerGateway {
    client: Client,
    base_url: Url,
    health_timeout: Duration,
    request_timeout: Duration,
    time_provider: Arc<dyn TimeProvider>,
}

impl HttpCrawlerGateway {
    pub fn new(config: CrawlerConfig, time_provider: Arc<dyn TimeProvider>) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AppError::Config(format!("Invalid crawler url '{}': {}", config.base_url, e))
        })?;
        let client = Client::builder()
            .connect_timeout(config.health_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            health_timeout: config.health_timeout,
            request_timeout: config.request_timeout,
            time_provider,
        })
    }

    async fn ping_health(&self) -> std::result::Result<(), GatewayError> {
        let url = endpoint(&self.base_url, &["health"])?;
        let response = self
            .client
            .get(url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let health: HealthResponse = read_json(check_status(response).await?).await?;

        if health.status.eq_ignore_ascii_case("ok") {
            Ok(())
        } else {
            Err(GatewayError::InvalidResponse(format!(
                "health status '{}'",
                health.status
            )))
        }
    }
}

#[async_trait]
impl CrawlerGateway for HttpCrawlerGateway {
    async fn health_check(&self) -> CrawlerHealth {
        let started = Instant::now();
        let outcome = self.ping_health().await;
        let latency_ms = started.elapsed().as_millis() as i64;

        if let Err(e) = &outcome {
            warn!(error = %e, latency_ms = latency_ms, "Crawler health check failed");
        }
        CrawlerHealth {
            available: outcome.is_ok(),
            checked_at: self.time_provider.now_millis(),
            latency_ms,
        }
    }

    async fn start_audit(
        &self,
        project_id: &str,
        options: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> std::result::Result<String, GatewayError> {
        let url = endpoint(&self.base_url, &["api", "audit", "start"])?;
        let response = self
            .client
            .post(url)
            .timeout(timeout.unwrap_or(self.request_timeout))
            .json(&StartAuditBody {
                project_id,
                options,
            })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body: StartAuditResponse = read_json(check_status(response).await?).await?;

        if body.job_id.trim().is_empty() {
            return Err(GatewayError::InvalidResponse("empty jobId".to_string()));
        }
        debug!(project_id = %project_id, remote_job_id = %body.job_id, "Crawler accepted audit");
        Ok(body.job_id)
    }

    async fn poll_status(
        &self,
        remote_job_id: &str,
        timeout: Option<Duration>,
    ) -> std::result::Result<RemoteStatus, GatewayError> {
        let url = endpoint(&self.base_url, &["api", "audit", "status", remote_job_id])?;
        let response = self
            .client
            .get(url)
            .timeout(timeout.unwrap_or(self.request_timeout))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body: StatusResponse = read_json(check_status(response).await?).await?;

        Ok(RemoteStatus {
            state: RemoteState::from_wire(&body.state),
            progress: body.progress,
        })
    }

    async fn fetch_results(
        &self,
        remote_job_id: &str,
        timeout: Option<Duration>,
    ) -> std::result::Result<AuditResult, GatewayError> {
        let url = endpoint(&self.base_url, &["api", "audit", "results", remote_job_id])?;
        let response = self
            .client
            .get(url)
            .timeout(timeout.unwrap_or(self.request_timeout))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let payload: serde_json::Value = read_json(check_status(response).await?).await?;

        Ok(AuditResult::new(payload))
    }
}
