//! Configuration loading and representation.
//!
//! Everything is read from environment variables once at startup. The
//! per-run part ([`RunConfig`]) is immutable and passed by reference into
//! every reconciliation run.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use stockrecon_inventory::{CollisionPolicy, IgnoreList};

use crate::retry::{BackoffStrategy, RetryPolicy};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be set")]
    Missing { var: &'static str },

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read ignore file {path}: {reason}")]
    IgnoreFile { path: String, reason: String },
}

/// Timeouts, retries and pagination limits shared by both sources.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Hard ceiling on pages requested from one endpoint in one run.
    pub max_pages: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            max_pages: 500,
        }
    }
}

/// Source A: the ERP product catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErpConfig {
    pub base_url: String,
    pub api_token: String,
    pub page_size: u32,
}

/// Source B: the warehouse management system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WmsConfig {
    pub base_url: String,
    pub api_key: String,
    /// Business unit whose records are kept; everything else is filtered client-side.
    pub lob_id: String,
    pub page_size: u32,
}

/// Who gets told about a run and how much they see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub recipients: Vec<String>,
    pub notify_on_zero: bool,
    pub max_discrepancies: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            recipients: Vec::new(),
            notify_on_zero: false,
            max_discrepancies: 50,
        }
    }
}

/// Immutable per-run configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunConfig {
    pub ignore: IgnoreList,
    pub collision_policy: CollisionPolicy,
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub erp: Option<ErpConfig>,
    pub wms: Option<WmsConfig>,
    pub fetch: FetchSettings,
    pub run: RunConfig,
    pub interval: Duration,
    /// Set only when `USE_PERSISTENT_STORES` is on.
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let bind_addr = env.parsed("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        let fetch = FetchSettings {
            timeout: Duration::from_secs(env.positive("FETCH_TIMEOUT_SECS", 60)?.into()),
            retry: RetryPolicy::with_strategy(
                env.parsed("FETCH_BACKOFF_STRATEGY", BackoffStrategy::Linear)?,
                env.parsed("FETCH_MAX_RETRIES", 2u32)?,
                Duration::from_millis(env.parsed("FETCH_BACKOFF_MS", 1000u64)?),
            ),
            max_pages: env.positive("FETCH_MAX_PAGES", 500)?,
        };

        let erp = match env.get("ERP_BASE_URL") {
            Some(base_url) => Some(ErpConfig {
                base_url,
                api_token: env.required("ERP_API_TOKEN")?,
                page_size: env.positive("ERP_PAGE_SIZE", 100)?,
            }),
            None => None,
        };

        let wms = match env.get("WMS_BASE_URL") {
            Some(base_url) => Some(WmsConfig {
                base_url,
                api_key: env.required("WMS_API_KEY")?,
                lob_id: env.required("WMS_LOB_ID")?,
                page_size: env.positive("WMS_PAGE_SIZE", 100)?,
            }),
            None => None,
        };

        let ignore = match (env.get("RECON_IGNORE_SKUS"), env.get("RECON_IGNORE_FILE")) {
            (Some(inline), _) => IgnoreList::parse(&inline),
            (None, Some(path)) => {
                let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::IgnoreFile {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                IgnoreList::parse(&text)
            }
            (None, None) => IgnoreList::new(),
        };

        let collision_policy = match env.get("RECON_COLLISION_POLICY") {
            Some(raw) => raw.parse::<CollisionPolicy>().map_err(|e| ConfigError::Invalid {
                var: "RECON_COLLISION_POLICY",
                value: raw,
                reason: e.to_string(),
            })?,
            None => CollisionPolicy::default(),
        };

        let notification = NotificationConfig {
            enabled: env.flag("NOTIFY_ENABLED"),
            recipients: env
                .get("NOTIFY_RECIPIENTS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            notify_on_zero: env.flag("NOTIFY_ON_ZERO"),
            max_discrepancies: env.parsed("NOTIFY_MAX_DISCREPANCIES", 50usize)?,
        };

        let interval = Duration::from_secs(env.positive("RECON_INTERVAL_SECS", 86_400)?.into());

        let database_url = if env.flag("USE_PERSISTENT_STORES") {
            Some(env.required("DATABASE_URL")?)
        } else {
            None
        };

        Ok(Self {
            bind_addr,
            erp,
            wms,
            fetch,
            run: RunConfig {
                ignore,
                collision_policy,
                notification,
            },
            interval,
            database_url,
        })
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.get(var).ok_or(ConfigError::Missing { var })
    }

    fn flag(&self, var: &str) -> bool {
        self.get(var)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false)
    }

    fn parsed<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(var) {
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                var,
                value: raw.clone(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn positive(&self, var: &'static str, default: u32) -> Result<u32, ConfigError> {
        let value = self.parsed(var, default)?;
        if value == 0 {
            return Err(ConfigError::Invalid {
                var,
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(value)
    }
}
