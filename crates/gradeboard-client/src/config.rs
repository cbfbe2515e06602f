//! gradeboard configuration and store factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use gradeboard_core::average::DEFAULT_PASSING_THRESHOLD;
use gradeboard_core::ranking::RankingMode;
use gradeboard_core::traits::RecordStore;
use gradeboard_core::CoordinatorConfig;

use crate::credential::Credential;
use crate::http::{HttpRecordStore, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};

/// Connection settings for the REST API.
///
/// Note: Custom Debug impl masks the token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token. May reference environment variables as `${VAR}`.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &"***")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_freshness")]
    pub freshness_secs: u64,
    #[serde(default = "default_realtime_freshness")]
    pub realtime_freshness_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_secs: default_freshness(),
            realtime_freshness_secs: default_realtime_freshness(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    #[serde(default = "default_passing_threshold")]
    pub passing_threshold: f64,
    #[serde(default)]
    pub ranking_mode: RankingMode,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            passing_threshold: default_passing_threshold(),
            ranking_mode: RankingMode::default(),
        }
    }
}

/// Top-level gradeboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeboardConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub grading: GradingConfig,
    /// Max retries on transient read failures.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for GradeboardConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            cache: CacheConfig::default(),
            grading: GradingConfig::default(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_freshness() -> u64 {
    300
}
fn default_realtime_freshness() -> u64 {
    15
}
fn default_passing_threshold() -> f64 {
    DEFAULT_PASSING_THRESHOLD
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    500
}

impl GradeboardConfig {
    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            freshness: Duration::from_secs(self.cache.freshness_secs),
            realtime_freshness: Duration::from_secs(self.cache.realtime_freshness_secs),
            passing_threshold: self.grading.passing_threshold,
            ranking_mode: self.grading.ranking_mode,
            max_fetch_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            ..CoordinatorConfig::default()
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `gradeboard.toml` in the current directory
/// 2. `~/.config/gradeboard/config.toml`
///
/// Environment variable overrides: `GRADEBOARD_API_URL`, `GRADEBOARD_API_TOKEN`.
pub fn load_config() -> Result<GradeboardConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<GradeboardConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("gradeboard.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<GradeboardConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => GradeboardConfig::default(),
    };

    if let Ok(url) = std::env::var("GRADEBOARD_API_URL") {
        config.api.base_url = url;
    }
    if let Ok(token) = std::env::var("GRADEBOARD_API_TOKEN") {
        config.api.token = token;
    }

    config.api.base_url = resolve_env_vars(&config.api.base_url);
    config.api.token = resolve_env_vars(&config.api.token);

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("gradeboard"))
}

/// Create the REST record store described by `config`.
pub fn create_store(config: &ApiConfig) -> Result<Arc<dyn RecordStore>> {
    if config.token.is_empty() {
        tracing::warn!("no API token configured, requests will be unauthenticated");
    }
    let store = HttpRecordStore::new(
        &config.base_url,
        Credential::new(config.token.clone()),
        config.timeout_secs,
    )?;
    Ok(Arc::new(store))
}
