// HTTP RenderDispatcher Implementation

use crate::error::{check_status, endpoint, map_reqwest_error};
use async_trait::async_trait;
use auditdesk_core::error::{AppError, Result};
use auditdesk_core::port::{GatewayError, RenderDispatcher, RenderRequest, DEFAULT_CALL_TIMEOUT};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

/// Identity header sent with every render request
pub const CALLER_ID_HEADER: &str = "X-Caller-Id";

/// Render worker connection settings
#[derive(Debug, Clone)]
pub struct RenderWorkerConfig {
    pub base_url: String,
    /// Bearer token presented to the worker
    pub token: String,
    /// Value of the `X-Caller-Id` header
    pub caller_id: String,
    pub timeout: Duration,
}

impl RenderWorkerConfig {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        caller_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            caller_id: caller_id.into(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Posts render requests to `{worker}/render`
pub struct HttpRenderDispatcher {
    client: Client,
    render_url: Url,
    token: String,
    caller_id: String,
    timeout: Duration,
}

impl HttpRenderDispatcher {
    pub fn new(config: RenderWorkerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AppError::Config(format!("Invalid worker url '{}': {}", config.base_url, e))
        })?;
        let render_url = endpoint(&base_url, &["render"])
            .map_err(|e| AppError::Config(e.to_string()))?;
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            render_url,
            token: config.token,
            caller_id: config.caller_id,
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl RenderDispatcher for HttpRenderDispatcher {
    async fn dispatch(&self, request: &RenderRequest) -> std::result::Result<(), GatewayError> {
        let response = self
            .client
            .post(self.render_url.clone())
            .timeout(self.timeout)
            .bearer_auth(&self.token)
            .header(CALLER_ID_HEADER, &self.caller_id)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(response).await?;

        debug!(job_id = %request.job_id, "Render request accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> RenderRequest {
        RenderRequest {
            job_id: "pdf-1".to_string(),
            project_id: "project-1".to_string(),
            template_id: "executive".to_string(),
            theme: "dark".to_string(),
        }
    }

    fn dispatcher(base_url: &str) -> HttpRenderDispatcher {
        HttpRenderDispatcher::new(RenderWorkerConfig::new(base_url, "s3cret", "auditdesk"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_sends_identity_and_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/render"))
            .and(header("authorization", "Bearer s3cret"))
            .and(header("x-caller-id", "auditdesk"))
            .and(body_json(json!({
                "jobId": "pdf-1",
                "projectId": "project-1",
                "templateId": "executive",
                "theme": "dark"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        dispatcher(&server.uri()).dispatch(&request()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/render"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let err = dispatcher(&server.uri())
            .dispatch(&request())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Rejected {
                status: 401,
                body: "bad token".to_string()
            }
        );
    }
}
