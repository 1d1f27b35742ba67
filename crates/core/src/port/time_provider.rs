// Time Provider Port (for testability)

/// Time provider interface (allows mocking in tests)
pub trait TimeProvider: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock that only moves when told to
    pub struct ManualClock {
        now: AtomicI64,
    }

    impl ManualClock {
        pub fn new(start_millis: i64) -> Self {
            Self {
                now: AtomicI64::new(start_millis),
            }
        }

        pub fn advance_millis(&self, delta: i64) {
            self.now.fetch_add(delta, Ordering::SeqCst);
        }

        pub fn advance_minutes(&self, minutes: i64) {
            self.advance_millis(minutes * 60 * 1000);
        }

        pub fn set(&self, now_millis: i64) {
            self.now.store(now_millis, Ordering::SeqCst);
        }
    }

    impl TimeProvider for ManualClock {
        fn now_millis(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }
    }
}
