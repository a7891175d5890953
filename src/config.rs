//! Configuration module
//!
//! Reads TOML configuration from a file (default
//! `~/.config/platform-sync/config.toml`, overridable via the
//! `PLATFORM_SYNC_CONFIG` env var). Every section has full defaults so a
//! missing file yields a working development setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::application::services::ledger::LedgerConfig;
use crate::application::services::pricing::{PricingTable, TokenPackage};
use crate::application::services::revocation::{GuardConfig, RevocationPolicy};
use crate::application::sync::SyncConfig;
use crate::domain::EntityKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSection,
    pub ledger: LedgerSection,
    pub scheduler: SchedulerSection,
    pub sync: SyncSection,
    pub revocation: RevocationSection,
    pub logging: LoggingSection,
    /// Token package catalog override; defaults apply when empty
    pub packages: Vec<TokenPackage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Service identity stamped on outgoing sync requests
    pub name: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: "platform-sync".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub low_balance_threshold: Decimal,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            low_balance_threshold: Decimal::from(10),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Expiry sweep interval in seconds
    pub check_interval_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            check_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// Entity kinds this service consumes
    pub accepted_kinds: Vec<EntityKind>,
    /// Outstanding request TTL in seconds
    pub request_ttl_secs: u64,
    /// Default deadline for callers awaiting a sync resolution
    pub await_timeout_secs: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            accepted_kinds: vec![EntityKind::Institution, EntityKind::User],
            request_ttl_secs: 30,
            await_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RevocationSection {
    pub authority_url: String,
    pub jwt_secret: String,
    pub issuer: Option<String>,
    pub policy: RevocationPolicy,
    pub read_only_policy: RevocationPolicy,
    pub request_timeout_secs: u64,
}

impl Default for RevocationSection {
    fn default() -> Self {
        Self {
            authority_url: "http://127.0.0.1:8090".to_string(),
            jwt_secret: "change-me-in-production".to_string(),
            issuer: None,
            policy: RevocationPolicy::FailClosed,
            read_only_policy: RevocationPolicy::FailOpen,
            request_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            low_balance_threshold: self.ledger.low_balance_threshold,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            service_name: self.service.name.clone(),
            accepted_kinds: self.sync.accepted_kinds.clone(),
            request_ttl: Duration::from_secs(self.sync.request_ttl_secs),
        }
    }

    pub fn await_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.await_timeout_secs)
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            jwt_secret: self.revocation.jwt_secret.clone(),
            issuer: self.revocation.issuer.clone(),
            policy: self.revocation.policy,
            read_only_policy: self.revocation.read_only_policy,
        }
    }

    pub fn pricing_table(&self) -> PricingTable {
        if self.packages.is_empty() {
            PricingTable::default()
        } else {
            PricingTable::new(self.packages.clone())
        }
    }
}

/// Default config path: `~/.config/platform-sync/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("platform-sync")
        .join("config.toml")
}
