// Render Dispatcher Port
// Hands PDF jobs to the external render worker

use crate::port::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Payload sent to the render worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub job_id: String,
    pub project_id: String,
    pub template_id: String,
    pub theme: String,
}

/// Render worker client. Worker selection is the worker's concern.
#[async_trait]
pub trait RenderDispatcher: Send + Sync {
    /// Submit a render; the worker reports progress via callbacks
    async fn dispatch(&self, request: &RenderRequest) -> Result<(), GatewayError>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records dispatched requests; optionally fails every call
    pub struct RecordingRenderDispatcher {
        sent: Mutex<Vec<RenderRequest>>,
        fail_with: Mutex<Option<GatewayError>>,
    }

    impl RecordingRenderDispatcher {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_with: Mutex::new(None),
            }
        }

        pub fn failing(error: GatewayError) -> Self {
            let dispatcher = Self::new();
            dispatcher.set_failure(Some(error));
            dispatcher
        }

        pub fn set_failure(&self, error: Option<GatewayError>) {
            *self.fail_with.lock().unwrap() = error;
        }

        pub fn sent(&self) -> Vec<RenderRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Default for RecordingRenderDispatcher {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RenderDispatcher for RecordingRenderDispatcher {
        async fn dispatch(&self, request: &RenderRequest) -> Result<(), GatewayError> {
            if let Some(err) = self.fail_with.lock().unwrap().clone() {
                return Err(err);
            }
            self.sent.lock().unwrap().push(request.clone());
            Ok(())
        }
    }
}
