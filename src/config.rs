//! Configuration for the creel daemon.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Default user agent for all outbound scraping requests.
pub const DEFAULT_USER_AGENT: &str = "CreelBot/1.0 (+https://github.com/creel)";

/// Top-level configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub scraping: ScrapingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all fields, collecting every error so the user can fix the
    /// file in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if let Some(port_str) = self.http.listen_addr.rsplit(':').next() {
            match port_str.parse::<u32>() {
                Ok(port) if port == 0 || port > 65535 => {
                    errors.push(format!("HTTP listen port must be 1..=65535, got {port}"));
                }
                Ok(_) => {}
                Err(_) => errors.push(format!(
                    "HTTP listen_addr '{}' has no parsable port",
                    self.http.listen_addr
                )),
            }
        }

        if self.scraping.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be positive".to_string());
        }
        if self.scraping.connect_timeout_secs == 0 {
            errors.push("connect_timeout_secs must be positive".to_string());
        }
        if self.scraping.max_sites_per_job == 0 {
            errors.push("max_sites_per_job must be positive".to_string());
        }
        if self.scraping.user_agent.is_empty() {
            errors.push("user_agent must not be empty".to_string());
        }
        if let Some(endpoint) = &self.scraping.places_endpoint {
            if url::Url::parse(endpoint).is_err() {
                errors.push(format!("places_endpoint '{endpoint}' is not a valid URL"));
            }
        }

        if self.retention.completed_cap_per_type == 0 {
            errors.push("completed_cap_per_type must be positive".to_string());
        }
        if self.retention.sweep_interval_secs == 0 {
            errors.push("sweep_interval_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Invalid configuration:\n  - {}", errors.join("\n  - "))
        }
    }

    /// Directory holding persisted job records.
    pub fn jobs_dir(&self) -> PathBuf {
        self.storage.data_dir.join("jobs")
    }

    /// Directory holding generated report files.
    pub fn reports_dir(&self) -> PathBuf {
        self.storage.data_dir.join("reports")
    }
}

/// HTTP API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address, e.g. "127.0.0.1:8470".
    pub listen_addr: String,
    /// API keys for authentication (empty = no auth required).
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Enable CORS for browser-based clients.
    #[serde(default)]
    pub cors_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8470".to_string(),
            api_keys: Vec::new(),
            cors_enabled: false,
        }
    }
}

/// Outbound scraping configuration shared by all tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    /// User agent string sent on every request.
    pub user_agent: String,
    /// Per-site request timeout (seconds). One unresponsive site times out
    /// on its own without stalling the rest of the job.
    pub request_timeout_secs: u64,
    /// Connection timeout (seconds).
    pub connect_timeout_secs: u64,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
    /// Upper bound on target sites accepted in a single job's params.
    pub max_sites_per_job: usize,
    /// Places directory endpoint for shop_reel jobs. Unset disables the
    /// directory lookup (shop_reel jobs fail with a clear reason).
    pub places_endpoint: Option<String>,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_redirects: 10,
            max_sites_per_job: 200,
            places_endpoint: None,
        }
    }
}

/// On-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root data directory; job records and reports live beneath it.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".creel"),
        }
    }
}

/// Retention policy for terminal jobs. Applied by a periodic sweep, never
/// in the request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Drop failed/cancelled jobs older than this (seconds).
    pub failed_ttl_secs: u64,
    /// Keep at most this many completed jobs per job type.
    pub completed_cap_per_type: usize,
    /// How often the sweep runs (seconds).
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            failed_ttl_secs: 24 * 3600,
            completed_cap_per_type: 50,
            sweep_interval_secs: 600,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Default level filter, overridable via `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn validation_collects_all_errors() {
        let mut config = Config::default();
        config.http.listen_addr = "0.0.0.0:99999".to_string();
        config.scraping.request_timeout_secs = 0;
        config.retention.completed_cap_per_type = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("listen port"));
        assert!(err.contains("request_timeout_secs"));
        assert!(err.contains("completed_cap_per_type"));
    }

    #[test]
    fn bad_places_endpoint_is_rejected() {
        let mut config = Config::default();
        config.scraping.places_endpoint = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.http.listen_addr, config.http.listen_addr);
        assert_eq!(
            parsed.scraping.max_sites_per_job,
            config.scraping.max_sites_per_job
        );
    }
}
