// Enqueue PDF Job Use Case

use crate::domain::{PdfJob, PdfTheme};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, PdfJobRepository, TimeProvider};
use serde::{Deserialize, Serialize};

const MAX_ID_LEN: usize = 128;

/// PDF render request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfRequest {
    pub requested_by: String,
    pub project_id: String,
    pub template_id: String,

    /// light | dark | brand (default light)
    #[serde(default)]
    pub theme: Option<String>,
}

fn check_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", field)));
    }
    if value.len() > MAX_ID_LEN {
        return Err(AppError::Validation(format!(
            "{} too long (max {} chars)",
            field, MAX_ID_LEN
        )));
    }
    Ok(())
}

/// Validate request fields and resolve the theme
pub fn validate_request(req: &PdfRequest) -> Result<PdfTheme> {
    check_id("requested_by", &req.requested_by)?;
    check_id("project_id", &req.project_id)?;
    check_id("template_id", &req.template_id)?;
    Ok(PdfTheme::parse(req.theme.as_deref().unwrap_or_default())?)
}

/// Execute enqueue use case
///
/// Persists the Queued row; dispatching to the worker is the caller's next step.
pub async fn execute(
    repo: &dyn PdfJobRepository,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    max_attempts: i32,
    req: PdfRequest,
) -> Result<PdfJob> {
    let theme = validate_request(&req)?;

    let job = PdfJob::new(
        id_provider.generate_id(),
        time_provider.now_millis(),
        req.requested_by,
        req.project_id,
        req.template_id,
        theme,
        max_attempts,
    );

    repo.insert(&job).await?;
    Ok(job)
}
