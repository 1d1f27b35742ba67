// Quota Repository Port (Interface)

use crate::domain::{QuotaRecord, Tier};
use crate::error::Result;
use async_trait::async_trait;

/// Persistence for per-user quota counters.
///
/// Every mutating method is a single atomic statement against the datastore.
/// No method may be implemented as read-then-write across round trips.
#[async_trait]
pub trait QuotaRepository: Send + Sync {
    /// Find the quota record for a user
    async fn find(&self, user_id: &str) -> Result<Option<QuotaRecord>>;

    /// Insert the record unless one already exists for the user
    ///
    /// Returns true if this call created the record
    async fn insert_if_absent(&self, record: &QuotaRecord) -> Result<bool>;

    /// Move the user to a new period and reset usage,
    /// only if the stored period is still `expected_start`
    async fn roll_period(&self, user_id: &str, expected_start: i64, new_start: i64) -> Result<bool>;

    /// Increment `audits_used` by one if still below `audits_limit`
    /// and the stored period equals `period_start`.
    ///
    /// Returns the updated record, or None if the condition did not hold
    async fn try_increment(&self, user_id: &str, period_start: i64) -> Result<Option<QuotaRecord>>;

    /// Decrement `audits_used` by one (never below zero) within `period_start`
    async fn release(&self, user_id: &str, period_start: i64) -> Result<bool>;

    /// Set tier and the derived limit, creating the record if needed
    async fn set_tier(&self, user_id: &str, tier: Tier, period_start: i64) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory quota store; the mutex plays the role of the datastore's
    /// row lock so conditional updates stay atomic
    #[derive(Default)]
    pub struct InMemoryQuotaRepository {
        records: Mutex<HashMap<String, QuotaRecord>>,
        offline: Mutex<bool>,
    }

    impl InMemoryQuotaRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, record: QuotaRecord) {
            self.records
                .lock()
                .unwrap()
                .insert(record.user_id.clone(), record);
        }

        /// Simulate a datastore outage
        pub fn set_offline(&self, offline: bool) {
            *self.offline.lock().unwrap() = offline;
        }

        fn check_online(&self) -> Result<()> {
            if *self.offline.lock().unwrap() {
                return Err(AppError::Database("connection refused".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl QuotaRepository for InMemoryQuotaRepository {
        async fn find(&self, user_id: &str) -> Result<Option<QuotaRecord>> {
            self.check_online()?;
            Ok(self.records.lock().unwrap().get(user_id).cloned())
        }

        async fn insert_if_absent(&self, record: &QuotaRecord) -> Result<bool> {
            self.check_online()?;
            let mut records = self.records.lock().unwrap();
            if records.contains_key(&record.user_id) {
                return Ok(false);
            }
            records.insert(record.user_id.clone(), record.clone());
            Ok(true)
        }

        async fn roll_period(&self, user_id: &str, expected_start: i64, new_start: i64) -> Result<bool> {
            self.check_online()?;
            let mut records = self.records.lock().unwrap();
            match records.get_mut(user_id) {
                Some(r) if r.period_start == expected_start => {
                    r.period_start = new_start;
                    r.audits_used = 0;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn try_increment(&self, user_id: &str, period_start: i64) -> Result<Option<QuotaRecord>> {
            self.check_online()?;
            let mut records = self.records.lock().unwrap();
            match records.get_mut(user_id) {
                Some(r) if r.period_start == period_start && r.audits_used < r.audits_limit => {
                    r.audits_used += 1;
                    Ok(Some(r.clone()))
                }
                _ => Ok(None),
            }
        }

        async fn release(&self, user_id: &str, period_start: i64) -> Result<bool> {
            self.check_online()?;
            let mut records = self.records.lock().unwrap();
            match records.get_mut(user_id) {
                Some(r) if r.period_start == period_start && r.audits_used > 0 => {
                    r.audits_used -= 1;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn set_tier(&self, user_id: &str, tier: Tier, period_start: i64) -> Result<()> {
            self.check_online()?;
            let mut records = self.records.lock().unwrap();
            let entry = records
                .entry(user_id.to_string())
                .or_insert_with(|| QuotaRecord::new(user_id, tier, period_start));
            entry.tier = tier;
            entry.audits_limit = tier.audits_limit();
            Ok(())
        }
    }
}
