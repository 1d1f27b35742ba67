//! Daemon settings
//!
//! Layered with the `config` crate: built-in defaults, then the TOML file named
//! by `AUDITDESK_CONFIG`, then `AUDITDESK__SECTION__KEY` environment variables.

use anyhow::{bail, Context, Result};
use auditdesk_core::application::constants::{
    DEFAULT_MAX_POLL_DURATION, DEFAULT_PDF_MAX_ATTEMPTS, DEFAULT_PDF_STALE_AFTER_MS,
    DEFAULT_RECONCILE_INTERVAL,
};
use auditdesk_core::domain::QuotaPeriod;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "AUDITDESK_CONFIG";
const ENV_PREFIX: &str = "AUDITDESK";
const DEFAULT_DB_PATH: &str = "~/.auditdesk/auditdesk.db";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub rpc: RpcSettings,
    pub crawler: CrawlerSettings,
    pub worker: WorkerSettings,
    pub quota: QuotaSettings,
    pub audit: AuditSettings,
    pub pdf: PdfSettings,
    pub reconcile: ReconcileSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite url or a plain file path (`~` is expanded)
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerSettings {
    pub base_url: String,
    pub health_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    pub base_url: String,
    /// Bearer token sent to the render worker
    pub token: String,
    pub caller_id: String,
    /// Token the worker presents on RPC callbacks
    pub callback_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaSettings {
    /// `calendar_month` or `rolling`
    pub period: String,
    pub rolling_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditSettings {
    pub max_poll_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PdfSettings {
    pub max_attempts: i32,
    pub stale_after_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileSettings {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `pretty` or `json`
    pub format: String,
    /// Daily-rotated log files are written here when set
    pub directory: Option<String>,
}

impl Settings {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let settings = Self::build(path.as_deref(), None)
            .context("Failed to load configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// `env` replaces the process environment when given
    fn build(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("database.url", DEFAULT_DB_PATH)?
            .set_default("rpc.host", "127.0.0.1")?
            .set_default("rpc.port", 9637)?
            .set_default("crawler.base_url", "http://127.0.0.1:4000")?
            .set_default("crawler.health_timeout_ms", 5_000)?
            .set_default("crawler.request_timeout_ms", 30_000)?
            .set_default("worker.base_url", "http://127.0.0.1:4100")?
            .set_default("worker.token", "")?
            .set_default("worker.caller_id", "auditdesk")?
            .set_default("worker.callback_token", "")?
            .set_default("quota.period", "calendar_month")?
            .set_default("quota.rolling_days", 30)?
            .set_default(
                "audit.max_poll_minutes",
                DEFAULT_MAX_POLL_DURATION.as_secs() / 60,
            )?
            .set_default("pdf.max_attempts", DEFAULT_PDF_MAX_ATTEMPTS)?
            .set_default("pdf.stale_after_minutes", DEFAULT_PDF_STALE_AFTER_MS / 60_000)?
            .set_default(
                "reconcile.interval_secs",
                DEFAULT_RECONCILE_INTERVAL.as_secs(),
            )?
            .set_default("log.format", "pretty")?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        self.quota_period()?;
        if self.pdf.max_attempts < 1 {
            bail!("pdf.max_attempts must be at least 1");
        }
        if self.pdf.stale_after_minutes < 1 {
            bail!("pdf.stale_after_minutes must be at least 1");
        }
        if self.reconcile.interval_secs == 0 {
            bail!("reconcile.interval_secs must be positive");
        }
        if !matches!(self.log.format.as_str(), "pretty" | "json") {
            bail!("log.format must be 'pretty' or 'json', got '{}'", self.log.format);
        }
        Ok(())
    }

    pub fn quota_period(&self) -> Result<QuotaPeriod> {
        match self.quota.period.as_str() {
            "calendar_month" => Ok(QuotaPeriod::CalendarMonth),
            "rolling" if self.quota.rolling_days > 0 => Ok(QuotaPeriod::Rolling {
                days: self.quota.rolling_days,
            }),
            "rolling" => bail!("quota.rolling_days must be positive"),
            other => bail!("Unknown quota.period '{}'", other),
        }
    }

    /// sqlx url, accepting bare paths
    pub fn database_url(&self) -> String {
        let raw = shellexpand::tilde(&self.database.url).into_owned();
        if raw.starts_with("sqlite:") {
            raw
        } else {
            format!("sqlite://{}", raw)
        }
    }

    pub fn max_poll_duration(&self) -> Duration {
        Duration::from_secs(self.audit.max_poll_minutes * 60)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::build(None, env(&[])).unwrap();
        settings.validate().unwrap();

        assert_eq!(settings.rpc.port, 9637);
        assert_eq!(settings.pdf.max_attempts, 3);
        assert_eq!(settings.pdf.stale_after_minutes, 10);
        assert_eq!(settings.max_poll_duration(), Duration::from_secs(30 * 60));
        assert_eq!(settings.quota_period().unwrap(), QuotaPeriod::CalendarMonth);
        assert!(settings.log.directory.is_none());
        assert!(settings.database_url().starts_with("sqlite://"));
        assert!(!settings.database_url().contains('~'));
    }

    #[test]
    fn test_file_then_env_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[quota]\nperiod = \"rolling\"\nrolling_days = 7\n\n[rpc]\nport = 7000\n"
        )
        .unwrap();

        let settings = Settings::build(
            Some(file.path()),
            env(&[
                ("AUDITDESK__RPC__PORT", "7100"),
                ("AUDITDESK__WORKER__CALLBACK_TOKEN", "s3cret"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.rpc.port, 7100);
        assert_eq!(settings.worker.callback_token, "s3cret");
        assert_eq!(
            settings.quota_period().unwrap(),
            QuotaPeriod::Rolling { days: 7 }
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let settings =
            Settings::build(None, env(&[("AUDITDESK__QUOTA__PERIOD", "weekly")])).unwrap();
        assert!(settings.validate().is_err());

        let settings =
            Settings::build(None, env(&[("AUDITDESK__PDF__MAX_ATTEMPTS", "0")])).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_database_url_keeps_explicit_urls() {
        let settings =
            Settings::build(None, env(&[("AUDITDESK__DATABASE__URL", "sqlite::memory:")]))
                .unwrap();
        assert_eq!(settings.database_url(), "sqlite::memory:");
    }
}
