use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::Difficulty;
use crate::utils::retry::RetryConfig;

/// Where session snapshots live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Directory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub quiz_path: String,
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
    pub storage: StorageBackend,
    pub retry: RetryConfig,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
    pub rate_limit_disabled: bool,
    pub default_difficulty: Difficulty,
    pub default_question_count: u32,
    pub otlp_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            quiz_path: "quiz/math".to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(30),
            storage: StorageBackend::Directory(PathBuf::from(".learnly")),
            retry: RetryConfig::default(),
            rate_limit_max_requests: 60,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_disabled: false,
            default_difficulty: Difficulty::Medium,
            default_question_count: 10,
            otlp_endpoint: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from .env unless told not to
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if !skip_root_env {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            // Missing config file falls back to ENV
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            // Override with environment variables (prefix: APP_)
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let defaults = Config::default();

        let api_base_url = settings
            .get_string("api.base_url")
            .or_else(|_| env::var("LEARNLY_API_URL"))
            .unwrap_or(defaults.api_base_url);

        let quiz_path = settings
            .get_string("api.quiz_path")
            .or_else(|_| env::var("LEARNLY_QUIZ_PATH"))
            .map(|path| path.trim_matches('/').to_string())
            .unwrap_or(defaults.quiz_path);

        let auth_token = settings
            .get_string("api.auth_token")
            .or_else(|_| env::var("LEARNLY_API_TOKEN"))
            .ok()
            .filter(|token| !token.trim().is_empty());

        let request_timeout = settings
            .get_int("api.request_timeout_seconds")
            .ok()
            .filter(|v| *v > 0)
            .map(|v| Duration::from_secs(v as u64))
            .unwrap_or(defaults.request_timeout);

        let storage = settings
            .get_string("storage.dir")
            .or_else(|_| env::var("LEARNLY_STORAGE_DIR"))
            .map(|dir| {
                if dir.eq_ignore_ascii_case("memory") {
                    StorageBackend::Memory
                } else {
                    StorageBackend::Directory(PathBuf::from(dir))
                }
            })
            .unwrap_or(defaults.storage);

        let retry = RetryConfig {
            max_attempts: positive_int(&settings, "retry.max_attempts")
                .map(|v| v as usize)
                .unwrap_or(defaults.retry.max_attempts),
            base_backoff: positive_int(&settings, "retry.base_backoff_ms")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.base_backoff),
            max_backoff: positive_int(&settings, "retry.max_backoff_ms")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.max_backoff),
            jitter_max: match settings.get_int("retry.jitter_ms") {
                Ok(0) => None,
                Ok(ms) if ms > 0 => Some(Duration::from_millis(ms as u64)),
                _ => defaults.retry.jitter_max,
            },
        };

        let rate_limit_max_requests = positive_int(&settings, "rate_limit.max_requests")
            .map(|v| v as u32)
            .unwrap_or(defaults.rate_limit_max_requests);
        let rate_limit_window = positive_int(&settings, "rate_limit.window_seconds")
            .map(Duration::from_secs)
            .unwrap_or(defaults.rate_limit_window);
        // Allow disabling client-side limits for local perf runs
        let rate_limit_disabled = env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1";

        let default_difficulty = match settings.get_string("quiz.default_difficulty") {
            Ok(value) => value.parse::<Difficulty>().map_err(config::ConfigError::Message)?,
            Err(_) => defaults.default_difficulty,
        };

        let default_question_count = positive_int(&settings, "quiz.default_question_count")
            .map(|v| v as u32)
            .unwrap_or(defaults.default_question_count);

        let otlp_endpoint = settings
            .get_string("telemetry.otlp_endpoint")
            .or_else(|_| env::var("OTEL_EXPORTER_OTLP_ENDPOINT"))
            .ok()
            .filter(|endpoint| !endpoint.trim().is_empty());

        Ok(Config {
            api_base_url,
            quiz_path,
            auth_token,
            request_timeout,
            storage,
            retry,
            rate_limit_max_requests,
            rate_limit_window,
            rate_limit_disabled,
            default_difficulty,
            default_question_count,
            otlp_endpoint,
        })
    }
}

fn positive_int(settings: &config::Config, key: &str) -> Option<u64> {
    settings
        .get_int(key)
        .ok()
        .filter(|v| *v > 0)
        .map(|v| v as u64)
}
