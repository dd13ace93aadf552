//! TOML application configuration.
//!
//! Every section and key is optional; an empty file yields the defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use portopt_core::rates::{QuoteServiceConfig, MAX_RETRIES, RATE_TTL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub rates: RatesConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.executable.trim().is_empty() {
            return Err(ConfigError::Invalid("gateway.executable is empty".into()));
        }
        if self.gateway.fetch_script.trim().is_empty() {
            return Err(ConfigError::Invalid("gateway.fetch_script is empty".into()));
        }
        if self.gateway.optimize_script.trim().is_empty() {
            return Err(ConfigError::Invalid("gateway.optimize_script is empty".into()));
        }
        if self.rates.ttl_secs == 0 {
            return Err(ConfigError::Invalid("rates.ttl_secs must be > 0".into()));
        }
        if self.rates.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("rates.base_url is empty".into()));
        }
        if self.rates.max_retries > MAX_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "rates.max_retries must be <= {MAX_RETRIES}"
            )));
        }
        Ok(())
    }
}

/// Where and how the external scripts run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub executable: String,
    pub script_dir: PathBuf,
    /// Directory for request artifacts; `script_dir` when unset.
    pub work_dir: Option<PathBuf>,
    pub fetch_script: String,
    pub optimize_script: String,
    /// 0 disables the deadline.
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            executable: "python3".into(),
            script_dir: PathBuf::from("src/main/python"),
            work_dir: None,
            fetch_script: "fetch_stock_data.py".into(),
            optimize_script: "optimize_portfolio.py".into(),
            timeout_secs: 300,
        }
    }
}

impl GatewayConfig {
    pub fn work_dir(&self) -> &Path {
        self.work_dir.as_deref().unwrap_or(&self.script_dir)
    }

    pub fn fetch_script_path(&self) -> PathBuf {
        self.script_dir.join(&self.fetch_script)
    }

    pub fn optimize_script_path(&self) -> PathBuf {
        self.script_dir.join(&self.optimize_script)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RatesConfig {
    pub ttl_secs: u64,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for RatesConfig {
    fn default() -> Self {
        let quote = QuoteServiceConfig::default();
        Self {
            ttl_secs: RATE_TTL.as_secs(),
            base_url: quote.base_url,
            request_timeout_secs: quote.request_timeout.as_secs(),
            max_retries: quote.max_retries,
        }
    }
}

impl RatesConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn quote_service(&self) -> QuoteServiceConfig {
        QuoteServiceConfig {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            ..QuoteServiceConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Keep holdings in memory only; `path` is ignored.
    pub in_memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("holdings.json"),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: Option<String>,
    pub json: bool,
}
