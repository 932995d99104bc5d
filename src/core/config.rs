use crate::core::errors::ConfigError;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Hard ceiling on files per submission
pub const MAX_FILES_LIMIT: usize = 10;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    pub max_body_bytes: usize,
    /// Empty means no CORS layer
    pub cors_allowed_origins: Vec<String>,
}

/// Vision service configuration
#[derive(Clone)]
pub struct VisionConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub image_detail: String,
    pub call_timeout: Duration,
}

// Keeps the key out of debug logs
impl std::fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("image_detail", &self.image_detail)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

/// Retry policy for vision calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first call
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Batch processing configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_files: usize,
    /// K: item pipelines allowed in flight at once
    pub max_concurrency: usize,
    pub request_timeout: Duration,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub vision: VisionConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_source<F>(source: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            source(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let log_level = match get("LOG_LEVEL") {
            None => Level::INFO,
            Some(raw) => match raw.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" | "warning" => Level::WARN,
                "error" => Level::ERROR,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "LOG_LEVEL".into(),
                        value: raw,
                    })
                }
            },
        };

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            server: ServerConfig {
                port: parse_or(&get, "SERVER_PORT", 8000)?,
                host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                log_level,
                max_body_bytes: parse_or(&get, "MAX_BODY_BYTES", 50 * 1024 * 1024)?,
                cors_allowed_origins,
            },
            vision: VisionConfig {
                api_key: get("OPENAI_API_KEY"),
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                model: get("VISION_MODEL").unwrap_or_else(|| "gpt-4.1".to_string()),
                image_detail: get("VISION_IMAGE_DETAIL").unwrap_or_else(|| "high".to_string()),
                call_timeout: Duration::from_secs(parse_or(&get, "VISION_TIMEOUT_SECONDS", 60)?),
            },
            retry: RetryConfig {
                max_attempts: parse_or(&get, "VISION_MAX_ATTEMPTS", 3)?,
                base_delay: Duration::from_millis(parse_or(&get, "VISION_BACKOFF_BASE_MS", 100)?),
                max_delay: Duration::from_millis(parse_or(&get, "VISION_BACKOFF_MAX_MS", 2000)?),
            },
            batch: BatchConfig {
                max_files: parse_or(&get, "MAX_FILES", MAX_FILES_LIMIT)?,
                max_concurrency: parse_or(&get, "MAX_CONCURRENCY", 4)?,
                request_timeout: Duration::from_secs(parse_or(
                    &get,
                    "REQUEST_TIMEOUT_SECONDS",
                    180,
                )?),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_FILES_LIMIT).contains(&self.batch.max_files) {
            return Err(ConfigError::InvalidMaxFiles(self.batch.max_files));
        }
        if self.batch.max_concurrency == 0 {
            return Err(ConfigError::MustBePositive { key: "MAX_CONCURRENCY" });
        }
        if self.batch.request_timeout.is_zero() {
            return Err(ConfigError::MustBePositive { key: "REQUEST_TIMEOUT_SECONDS" });
        }
        if self.vision.call_timeout.is_zero() {
            return Err(ConfigError::MustBePositive { key: "VISION_TIMEOUT_SECONDS" });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::MustBePositive { key: "VISION_MAX_ATTEMPTS" });
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::InvalidBackoff {
                base_ms: self.retry.base_delay.as_millis() as u64,
                max_ms: self.retry.max_delay.as_millis() as u64,
            });
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::MustBePositive { key: "MAX_BODY_BYTES" });
        }

        Ok(())
    }

    /// One-line summary for start-up logs, without secrets
    pub fn summary(&self) -> String {
        format!(
            "model={}, detail={}, api_key={}, K={}, max_files={}, attempts={}, backoff={}..{}ms, call_timeout={}s, request_timeout={}s",
            self.vision.model,
            self.vision.image_detail,
            if self.vision.api_key.is_some() { "[set]" } else { "[missing]" },
            self.batch.max_concurrency,
            self.batch.max_files,
            self.retry.max_attempts,
            self.retry.base_delay.as_millis(),
            self.retry.max_delay.as_millis(),
            self.vision.call_timeout.as_secs(),
            self.batch.request_timeout.as_secs(),
        )
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn api_key(&self) -> Option<&str> {
        self.vision.api_key.as_deref()
    }

    pub fn max_files(&self) -> usize {
        self.batch.max_files
    }

    pub fn max_concurrency(&self) -> usize {
        self.batch.max_concurrency
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_source(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.server_port(), 8000);
        assert_eq!(config.server_host(), "0.0.0.0");
        assert_eq!(config.log_level(), Level::INFO);
        assert!(config.server.cors_allowed_origins.is_empty());
        assert!(config.api_key().is_none());
        assert_eq!(config.vision.model, "gpt-4.1");
        assert_eq!(config.vision.base_url, "https://api.openai.com/v1");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
        assert_eq!(config.max_files(), 10);
        assert_eq!(config.max_concurrency(), 4);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:9999/v1/"),
            ("MAX_CONCURRENCY", "2"),
            ("LOG_LEVEL", "Debug"),
            ("CORS_ALLOWED_ORIGINS", "http://localhost:3000, https://app.example"),
        ])
        .unwrap();

        assert_eq!(config.api_key(), Some("sk-test"));
        assert_eq!(config.vision.base_url, "http://localhost:9999/v1");
        assert_eq!(config.max_concurrency(), 2);
        assert_eq!(config.log_level(), Level::DEBUG);
        assert_eq!(
            config.server.cors_allowed_origins,
            vec!["http://localhost:3000", "https://app.example"]
        );
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let config = config_from(&[("OPENAI_API_KEY", "   ")]).unwrap();
        assert!(config.api_key().is_none());
    }

    #[test]
    fn test_rejects_malformed_number() {
        let err = config_from(&[("MAX_CONCURRENCY", "four")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = config_from(&[("MAX_CONCURRENCY", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::MustBePositive { key: "MAX_CONCURRENCY" }));
    }

    #[test]
    fn test_rejects_max_files_above_limit() {
        let err = config_from(&[("MAX_FILES", "11")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxFiles(11)));
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let err = config_from(&[
            ("VISION_BACKOFF_BASE_MS", "5000"),
            ("VISION_BACKOFF_MAX_MS", "1000"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBackoff { .. }));
    }

    #[test]
    fn test_summary_masks_key() {
        let config = config_from(&[("OPENAI_API_KEY", "sk-secret")]).unwrap();
        let summary = config.summary();
        assert!(!summary.contains("sk-secret"));
        assert!(summary.contains("api_key=[set]"));
        assert!(!format!("{:?}", config).contains("sk-secret"));
    }
}
