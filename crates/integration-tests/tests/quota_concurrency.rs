//! Quota admission against a real SQLite file shared by two pools
//!
//! Two pools stand in for two daemon instances: the conditional update in the
//! database is the only thing serialising them.

use std::sync::Arc;

use auditdesk_core::application::QuotaLedger;
use auditdesk_core::domain::{Admission, DenialReason, QuotaPeriod, Tier};
use auditdesk_core::port::time_provider::SystemTimeProvider;
use auditdesk_infra_sqlite::{create_pool, run_migrations, SqliteQuotaRepository};
use tokio::task::JoinSet;

async fn ledgers(dir: &tempfile::TempDir) -> (Arc<QuotaLedger>, Arc<QuotaLedger>) {
    let url = format!("sqlite://{}", dir.path().join("quota.db").display());

    let pool_a = create_pool(&url).await.unwrap();
    run_migrations(&pool_a).await.unwrap();
    let pool_b = create_pool(&url).await.unwrap();

    let ledger = |pool| {
        Arc::new(QuotaLedger::new(
            Arc::new(SqliteQuotaRepository::new(pool)),
            Arc::new(SystemTimeProvider),
            QuotaPeriod::CalendarMonth,
        ))
    };
    (ledger(pool_a), ledger(pool_b))
}

#[tokio::test]
async fn test_concurrent_reservations_never_exceed_limit() {
    let dir = tempfile::tempdir().unwrap();
    let (ledger_a, ledger_b) = ledgers(&dir).await;

    let mut tasks = JoinSet::new();
    for i in 0..12 {
        let ledger = if i % 2 == 0 {
            ledger_a.clone()
        } else {
            ledger_b.clone()
        };
        tasks.spawn(async move { ledger.check_and_reserve("user-1").await });
    }

    let mut allowed = 0;
    let mut denied = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap().unwrap() {
            Admission::Allowed { audits_limit, .. } => {
                assert_eq!(audits_limit, 3);
                allowed += 1;
            }
            Admission::Denied {
                reason: DenialReason::LimitReached,
            } => denied += 1,
        }
    }

    assert_eq!(allowed, 3);
    assert_eq!(denied, 9);
    assert_eq!(ledger_b.usage("user-1").await.unwrap().audits_used, 3);
}

#[tokio::test]
async fn test_upgrade_visible_to_other_instance() {
    let dir = tempfile::tempdir().unwrap();
    let (ledger_a, ledger_b) = ledgers(&dir).await;

    for _ in 0..3 {
        assert!(ledger_a.check_and_reserve("user-1").await.unwrap().is_allowed());
    }
    assert!(!ledger_b.check_and_reserve("user-1").await.unwrap().is_allowed());

    ledger_a.set_tier("user-1", Tier::Pro).await.unwrap();

    let admission = ledger_b.check_and_reserve("user-1").await.unwrap();
    assert_eq!(
        admission,
        Admission::Allowed {
            audits_used: 4,
            audits_limit: 10
        }
    );

    // A released reservation is returned once, never below zero
    assert!(ledger_b.release("user-1").await.unwrap());
    assert_eq!(ledger_a.usage("user-1").await.unwrap().audits_used, 3);
}
