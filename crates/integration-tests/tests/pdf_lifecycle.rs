//! PDF jobs against SQLite and a mocked render worker

use std::sync::Arc;

use auditdesk_core::application::{PdfConfig, PdfJobManager, PdfRequest};
use auditdesk_core::domain::{PdfJobFilter, PdfStatus, ABANDONED_ERROR};
use auditdesk_core::error::AppError;
use auditdesk_core::port::id_provider::mocks::SequentialIdProvider;
use auditdesk_core::port::render_dispatcher::mocks::RecordingRenderDispatcher;
use auditdesk_core::port::time_provider::mocks::ManualClock;
use auditdesk_core::port::time_provider::SystemTimeProvider;
use auditdesk_infra_http::{HttpRenderDispatcher, RenderWorkerConfig};
use auditdesk_infra_sqlite::{create_pool, run_migrations, SqlitePdfJobRepository};
use tokio::task::JoinSet;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// 2026-03-15T12:00:00Z
const NOW: i64 = 1_773_576_000_000;

async fn manager(worker_url: &str, dir: &tempfile::TempDir) -> (PdfJobManager, Arc<ManualClock>) {
    let url = format!("sqlite://{}", dir.path().join("pdf.db").display());
    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let clock = Arc::new(ManualClock::new(NOW));
    let render =
        HttpRenderDispatcher::new(RenderWorkerConfig::new(worker_url, "render-token", "auditdesk"))
            .unwrap();
    let manager = PdfJobManager::new(
        Arc::new(SqlitePdfJobRepository::new(pool)),
        Arc::new(render),
        Arc::new(SequentialIdProvider::new("pdf")),
        clock.clone(),
        PdfConfig::default(),
    );
    (manager, clock)
}

fn request() -> PdfRequest {
    PdfRequest {
        requested_by: "user-1".to_string(),
        project_id: "project-1".to_string(),
        template_id: "executive".to_string(),
        theme: Some("light".to_string()),
    }
}

#[tokio::test]
async fn test_silent_worker_job_is_abandoned() {
    let worker = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/render"))
        .and(header("authorization", "Bearer render-token"))
        .and(header("x-caller-id", "auditdesk"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&worker)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (manager, clock) = manager(&worker.uri(), &dir).await;

    let job_id = manager.enqueue(request()).await.unwrap();
    manager.mark_processing(&job_id).await.unwrap();

    clock.advance_minutes(5);
    manager.heartbeat(&job_id).await.unwrap();

    // Ten minutes after the heartbeat is still within bounds
    clock.advance_minutes(10);
    assert_eq!(manager.reconcile().await.unwrap().abandoned, 0);

    clock.advance_minutes(1);
    let report = manager.reconcile().await.unwrap();
    assert_eq!(report.abandoned, 1);

    let job = manager.get_status(&job_id).await.unwrap();
    assert_eq!(job.status, PdfStatus::Failed);
    assert_eq!(job.last_error.as_deref(), Some(ABANDONED_ERROR));
    assert!(job.artifact_ref.is_none());

    // Late callbacks from the worker are refused
    assert!(manager.mark_completed(&job_id, "s3://late.pdf").await.is_err());
}

#[tokio::test]
async fn test_worker_outage_then_recovery() {
    let worker = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/render"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&worker)
        .await;
    Mock::given(method("POST"))
        .and(path("/render"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&worker)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (manager, clock) = manager(&worker.uri(), &dir).await;

    // Dispatch fails but the job is kept
    let job_id = manager.enqueue(request()).await.unwrap();
    assert_eq!(
        manager.get_status(&job_id).await.unwrap().status,
        PdfStatus::Queued
    );

    clock.advance_minutes(11);
    let report = manager.reconcile().await.unwrap();
    assert_eq!(report.redispatched, 1);
    assert_eq!(manager.get_status(&job_id).await.unwrap().attempts, 1);

    manager.mark_processing(&job_id).await.unwrap();
    let done = manager
        .mark_completed(&job_id, "s3://reports/pdf-1.pdf")
        .await
        .unwrap();
    assert_eq!(done.status, PdfStatus::Completed);
    assert_eq!(done.artifact_ref.as_deref(), Some("s3://reports/pdf-1.pdf"));

    let completed = manager
        .list_jobs(PdfJobFilter {
            status: Some(PdfStatus::Completed),
            ..PdfJobFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(manager.summary().await.unwrap().completed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failure_reports_respect_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("pdf.db").display());
    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let manager = Arc::new(PdfJobManager::new(
        Arc::new(SqlitePdfJobRepository::new(pool)),
        Arc::new(RecordingRenderDispatcher::new()),
        Arc::new(SequentialIdProvider::new("pdf")),
        Arc::new(SystemTimeProvider),
        PdfConfig::default(),
    ));
    let job_id = manager.enqueue(request()).await.unwrap();
    manager.mark_processing(&job_id).await.unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..8 {
        let manager = manager.clone();
        let job_id = job_id.clone();
        tasks.spawn(async move {
            manager
                .mark_failed(&job_id, &format!("renderer {} crashed", i), true)
                .await
        });
    }

    let mut requeued = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(job) if job.status == PdfStatus::Queued => requeued += 1,
            Ok(job) => assert_eq!(job.status, PdfStatus::Failed),
            Err(AppError::Conflict(_)) | Err(AppError::InvalidState(_)) => {}
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    // Every reported requeue is persisted, and none goes past the budget
    let job = manager.get_status(&job_id).await.unwrap();
    assert!(job.attempts <= job.max_attempts);
    assert_eq!(job.attempts, requeued);
}
