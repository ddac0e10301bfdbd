//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the built-in provider chain.

use crate::bypass::provider::{ProviderAuth, ProviderConfig, RequestShape};
use crate::rate_limit::RateLimits;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout for a single provider request
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;
/// Default lifetime of a cached resolution (30 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 60;
/// Default substring rejected in submitted links and provider payloads
pub const DEFAULT_DENYLIST_PATTERN: &str = "luarmor";
/// Default burst limit per short window
pub const DEFAULT_SHORT_TERM_LIMIT: usize = 2;
/// Default short window length in seconds
pub const DEFAULT_SHORT_TERM_WINDOW_SECS: u64 = 300;
/// Default number of bypasses per UTC day
pub const DEFAULT_DAILY_LIMIT: u32 = 10;

/// Ace Bypass endpoint; `{url}` is replaced with the encoded link
pub const ACE_BYPASS_URL: &str = "http://ace-bypass.com/api/bypass?url={url}";
/// TRW endpoint; `{url}` is replaced with the encoded link
pub const TRW_BYPASS_URL: &str = "https://trw.lat/api/bypass?url={url}";

/// Application settings loaded from config files and environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Ace Bypass API key
    pub bypass_api_key: Option<String>,
    /// TRW API key
    pub trw_api_key: Option<String>,

    /// Per-provider request timeout in seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    /// Lifetime of cached resolutions in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Path of the persisted per-user rate state
    #[serde(default = "default_rate_limit_file")]
    pub rate_limit_file: String,
    /// Path of the persisted bypass statistics
    #[serde(default = "default_stats_file")]
    pub stats_file: String,

    /// Case-insensitive substring rejected in links and payloads
    #[serde(default = "default_denylist_pattern")]
    pub denylist_pattern: String,

    /// Bypasses allowed per short window
    #[serde(default = "default_short_term_limit")]
    pub short_term_limit: usize,
    /// Short window length in seconds
    #[serde(default = "default_short_term_window_secs")]
    pub short_term_window_secs: u64,
    /// Bypasses allowed per UTC day
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// User id the console transport submits as
    #[serde(default)]
    pub console_user_id: u64,
}

const fn default_provider_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

const fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_rate_limit_file() -> String {
    "user_rates.json".to_string()
}

fn default_stats_file() -> String {
    "bypass_stats.json".to_string()
}

fn default_denylist_pattern() -> String {
    DEFAULT_DENYLIST_PATTERN.to_string()
}

const fn default_short_term_limit() -> usize {
    DEFAULT_SHORT_TERM_LIMIT
}

const fn default_short_term_window_secs() -> u64 {
    DEFAULT_SHORT_TERM_WINDOW_SECS
}

const fn default_daily_limit() -> u32 {
    DEFAULT_DAILY_LIMIT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bypass_api_key: None,
            trw_api_key: None,
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            rate_limit_file: default_rate_limit_file(),
            stats_file: default_stats_file(),
            denylist_pattern: default_denylist_pattern(),
            short_term_limit: DEFAULT_SHORT_TERM_LIMIT,
            short_term_window_secs: DEFAULT_SHORT_TERM_WINDOW_SECS,
            daily_limit: DEFAULT_DAILY_LIMIT,
            console_user_id: 0,
        }
    }
}

/// Build the layered configuration source shared by all settings loaders.
///
/// # Errors
///
/// Returns a `ConfigError` if any present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        // `APP__CACHE_TTL_SECS=60` sets `cache_ttl_secs`
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Plain UPPER_SNAKE_CASE variables, empty values count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bypass_relay::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let mut settings: Self = build_config()?.try_deserialize()?;

        // Credentials are also read straight from the environment in case the
        // automatic key mapping skipped them
        if settings.bypass_api_key.is_none() {
            settings.bypass_api_key = non_empty_env("BYPASS_API_KEY");
        }
        if settings.trw_api_key.is_none() {
            settings.trw_api_key = non_empty_env("TRW_API_KEY");
        }

        Ok(settings)
    }

    /// Timeout applied to each provider request
    #[must_use]
    pub const fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Lifetime of a cached resolution
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Rate limiter windows and quotas
    #[must_use]
    pub const fn rate_limits(&self) -> RateLimits {
        RateLimits {
            short_term_limit: self.short_term_limit,
            short_term_window: Duration::from_secs(self.short_term_window_secs),
            daily_limit: self.daily_limit,
        }
    }

    /// The provider chain in priority order, with credentials attached
    #[must_use]
    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        vec![
            ProviderConfig {
                name: "ace-bypass".to_string(),
                display_name: "Ace Bypass".to_string(),
                credential: self.bypass_api_key.clone(),
                requires_credential: true,
                request: RequestShape::Get {
                    url_template: ACE_BYPASS_URL.to_string(),
                },
                auth: ProviderAuth::QueryParam("apikey".to_string()),
            },
            ProviderConfig {
                name: "trw-lat".to_string(),
                display_name: "TRW.lat".to_string(),
                credential: self.trw_api_key.clone(),
                requires_credential: false,
                request: RequestShape::Get {
                    url_template: TRW_BYPASS_URL.to_string(),
                },
                auth: ProviderAuth::Header("x-api-key".to_string()),
            },
        ]
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|val| !val.is_empty())
}
