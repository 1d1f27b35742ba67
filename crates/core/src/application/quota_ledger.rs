// Quota Ledger - admission control over per-user audit counters
use crate::domain::{Admission, DenialReason, QuotaPeriod, QuotaRecord, Tier};
use crate::error::AppError;
use crate::port::{QuotaRepository, TimeProvider};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A concurrent rollover can invalidate one increment attempt; one retry covers it
const MAX_RESERVE_ROUNDS: usize = 2;

/// Ledger failures. Never treated as admission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuotaError {
    #[error("Quota store unavailable: {0}")]
    Unavailable(String),
}

impl From<AppError> for QuotaError {
    fn from(err: AppError) -> Self {
        QuotaError::Unavailable(err.to_string())
    }
}

pub type QuotaResult<T> = std::result::Result<T, QuotaError>;

/// Quota Ledger
///
/// Decision logic only; atomicity comes from the repository's conditional updates,
/// so several service instances can share one datastore.
pub struct QuotaLedger {
    repo: Arc<dyn QuotaRepository>,
    time_provider: Arc<dyn TimeProvider>,
    period: QuotaPeriod,
}

impl QuotaLedger {
    pub fn new(
        repo: Arc<dyn QuotaRepository>,
        time_provider: Arc<dyn TimeProvider>,
        period: QuotaPeriod,
    ) -> Self {
        Self {
            repo,
            time_provider,
            period,
        }
    }

    /// Reserve one audit for `user_id` if the tier limit allows it.
    ///
    /// On `Allowed`, `audits_used` has been incremented by exactly one.
    pub async fn check_and_reserve(&self, user_id: &str) -> QuotaResult<Admission> {
        let mut record = self.current_record(user_id).await?;

        for _ in 0..MAX_RESERVE_ROUNDS {
            if let Some(updated) = self.repo.try_increment(user_id, record.period_start).await? {
                info!(
                    user_id = %user_id,
                    tier = %updated.tier,
                    audits_used = updated.audits_used,
                    audits_limit = updated.audits_limit,
                    "Audit quota reserved"
                );
                return Ok(Admission::Allowed {
                    audits_used: updated.audits_used,
                    audits_limit: updated.audits_limit,
                });
            }

            // Either the limit is reached or the period moved underneath us
            let latest = self.current_record(user_id).await?;
            if latest.period_start == record.period_start {
                break;
            }
            debug!(user_id = %user_id, "Quota period rolled during reservation, retrying");
            record = latest;
        }

        warn!(
            user_id = %user_id,
            tier = %record.tier,
            audits_limit = record.audits_limit,
            "Audit quota limit reached"
        );
        Ok(Admission::Denied {
            reason: DenialReason::LimitReached,
        })
    }

    /// Give back a reservation whose audit could not be started
    pub async fn release(&self, user_id: &str) -> QuotaResult<bool> {
        let Some(record) = self.repo.find(user_id).await? else {
            return Ok(false);
        };
        let released = self.repo.release(user_id, record.period_start).await?;
        if released {
            info!(user_id = %user_id, "Audit quota reservation released");
        }
        Ok(released)
    }

    /// Change tier; the new limit applies from the next admission check
    pub async fn set_tier(&self, user_id: &str, tier: Tier) -> QuotaResult<QuotaRecord> {
        let record = self.current_record(user_id).await?;
        self.repo
            .set_tier(user_id, tier, record.period_start)
            .await?;
        info!(user_id = %user_id, from = %record.tier, to = %tier, "Tier changed");
        self.current_record(user_id).await
    }

    /// Usage for display. Read-only: a missing or expired record is
    /// projected, not written.
    pub async fn usage(&self, user_id: &str) -> QuotaResult<QuotaRecord> {
        let now = self.time_provider.now_millis();
        match self.repo.find(user_id).await? {
            None => Ok(QuotaRecord::new(
                user_id,
                Tier::Free,
                self.period.period_start(now, None),
            )),
            Some(record) => match record.rollover_to(&self.period, now) {
                Some(new_start) => {
                    let mut projected = QuotaRecord::new(user_id, record.tier, new_start);
                    projected.audits_limit = record.audits_limit;
                    Ok(projected)
                }
                None => Ok(record),
            },
        }
    }

    /// Load the record for the current period, creating or rolling it over as needed
    async fn current_record(&self, user_id: &str) -> QuotaResult<QuotaRecord> {
        let now = self.time_provider.now_millis();

        let record = match self.repo.find(user_id).await? {
            Some(record) => record,
            None => {
                let fresh =
                    QuotaRecord::new(user_id, Tier::Free, self.period.period_start(now, None));
                if self.repo.insert_if_absent(&fresh).await? {
                    debug!(user_id = %user_id, period_start = fresh.period_start, "Quota record created");
                }
                self.reload(user_id).await?
            }
        };

        match record.rollover_to(&self.period, now) {
            Some(new_start) => {
                if self
                    .repo
                    .roll_period(user_id, record.period_start, new_start)
                    .await?
                {
                    info!(
                        user_id = %user_id,
                        previous_start = record.period_start,
                        period_start = new_start,
                        "Quota period rolled over"
                    );
                }
                self.reload(user_id).await
            }
            None => Ok(record),
        }
    }

    async fn reload(&self, user_id: &str) -> QuotaResult<QuotaRecord> {
        self.repo.find(user_id).await?.ok_or_else(|| {
            QuotaError::Unavailable(format!("quota record for {} vanished", user_id))
        })
    }
}
