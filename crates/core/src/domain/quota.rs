// Quota Domain Model

use chrono::{Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::DomainError;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    /// Audits allowed per period. Static table, the only source of `audits_limit`.
    pub fn audits_limit(self) -> i64 {
        match self {
            Tier::Free => 3,
            Tier::Pro => 10,
            Tier::Enterprise => 100,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Free => write!(f, "FREE"),
            Tier::Pro => write!(f, "PRO"),
            Tier::Enterprise => write!(f, "ENTERPRISE"),
        }
    }
}

impl FromStr for Tier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FREE" => Ok(Tier::Free),
            "PRO" => Ok(Tier::Pro),
            "ENTERPRISE" => Ok(Tier::Enterprise),
            other => Err(DomainError::UnknownTier(other.to_string())),
        }
    }
}

/// How quota periods roll over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum QuotaPeriod {
    /// Fixed calendar boundary: 00:00 UTC on the first day of each month
    CalendarMonth,
    /// Window of `days` anchored at first use, advancing in whole windows
    Rolling { days: u32 },
}

impl Default for QuotaPeriod {
    fn default() -> Self {
        QuotaPeriod::CalendarMonth
    }
}

impl QuotaPeriod {
    /// Start of the period containing `now_millis`.
    ///
    /// `anchor` is the start of the last known period (None on first use).
    pub fn period_start(&self, now_millis: i64, anchor: Option<i64>) -> i64 {
        match self {
            QuotaPeriod::CalendarMonth => {
                let now = Utc
                    .timestamp_millis_opt(now_millis)
                    .single()
                    .unwrap_or_else(Utc::now);
                Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                    .single()
                    .map(|start| start.timestamp_millis())
                    .unwrap_or(now_millis)
            }
            QuotaPeriod::Rolling { days } => {
                let window = i64::from((*days).max(1)) * DAY_MS;
                match anchor {
                    None => now_millis,
                    Some(anchor) if now_millis < anchor => anchor,
                    Some(anchor) => anchor + ((now_millis - anchor) / window) * window,
                }
            }
        }
    }
}

/// Per-user audit consumption for one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub user_id: String,
    pub tier: Tier,
    pub period_start: i64, // epoch ms
    pub audits_used: i64,
    pub audits_limit: i64,
}

impl QuotaRecord {
    /// Fresh record for a new period, limit derived from tier
    pub fn new(user_id: impl Into<String>, tier: Tier, period_start: i64) -> Self {
        Self {
            user_id: user_id.into(),
            tier,
            period_start,
            audits_used: 0,
            audits_limit: tier.audits_limit(),
        }
    }

    pub fn remaining(&self) -> i64 {
        (self.audits_limit - self.audits_used).max(0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.audits_used >= self.audits_limit
    }

    /// New period start if this record belongs to an earlier period
    pub fn rollover_to(&self, policy: &QuotaPeriod, now_millis: i64) -> Option<i64> {
        let current = policy.period_start(now_millis, Some(self.period_start));
        (current > self.period_start).then_some(current)
    }
}

/// Why admission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    LimitReached,
}

/// Result of an admission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    Allowed { audits_used: i64, audits_limit: i64 },
    Denied { reason: DenialReason },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(y: i32, m: u32, d: u32, h: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_tier_limits() {
        assert_eq!(Tier::Free.audits_limit(), 3);
        assert_eq!(Tier::Pro.audits_limit(), 10);
        assert!(Tier::Enterprise.audits_limit() > Tier::Pro.audits_limit());
    }

    #[test]
    fn test_tier_parse_roundtrip() {
        for tier in [Tier::Free, Tier::Pro, Tier::Enterprise] {
            assert_eq!(tier.to_string().parse::<Tier>().unwrap(), tier);
        }
        assert_eq!("pro".parse::<Tier>().unwrap(), Tier::Pro);
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn test_calendar_month_start() {
        let policy = QuotaPeriod::CalendarMonth;
        let start = policy.period_start(ms(2026, 3, 17, 15), None);
        assert_eq!(start, ms(2026, 3, 1, 0));
    }

    #[test]
    fn test_rolling_window_advances_in_whole_windows() {
        let policy = QuotaPeriod::Rolling { days: 30 };
        let anchor = ms(2026, 1, 10, 12);

        assert_eq!(policy.period_start(anchor + DAY_MS, Some(anchor)), anchor);
        assert_eq!(
            policy.period_start(anchor + 31 * DAY_MS, Some(anchor)),
            anchor + 30 * DAY_MS
        );
        assert_eq!(
            policy.period_start(anchor + 95 * DAY_MS, Some(anchor)),
            anchor + 90 * DAY_MS
        );
    }

    #[test]
    fn test_rollover_detection() {
        let record = QuotaRecord::new("user-1", Tier::Free, ms(2026, 2, 1, 0));
        let policy = QuotaPeriod::CalendarMonth;

        assert_eq!(record.rollover_to(&policy, ms(2026, 2, 27, 8)), None);
        assert_eq!(
            record.rollover_to(&policy, ms(2026, 3, 2, 8)),
            Some(ms(2026, 3, 1, 0))
        );
    }

    #[test]
    fn test_remaining_never_negative() {
        let mut record = QuotaRecord::new("user-1", Tier::Free, 0);
        record.audits_used = 5;
        assert_eq!(record.remaining(), 0);
        assert!(record.is_exhausted());
    }
}
