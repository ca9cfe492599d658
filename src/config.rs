use std::{env, net::SocketAddr, num::NonZeroUsize, time::Duration};

use thiserror::Error;

use crate::pipeline::AdaptivePolicy;
use crate::util::retry::RetryConfig;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

const DEFAULT_HTTP_BIND: &str = "0.0.0.0:9010";
const DEFAULT_DATE_RANGE_DAYS: u32 = 7;
const DEFAULT_SCORE_THRESHOLD: f64 = 70.0;
const DEFAULT_ADAPTIVE_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_ADAPTIVE_WINDOW_STEP_DAYS: u32 = 7;
const DEFAULT_ADAPTIVE_THRESHOLD_STEP: f64 = 5.0;
const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
const DEFAULT_TMDB_LANGUAGE: &str = "en-US";
const DEFAULT_TMDB_MAX_PAGES: u32 = 1;
const DEFAULT_IGDB_BASE_URL: &str = "https://api.igdb.com/v4";
const DEFAULT_IGDB_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;
const DEFAULT_TOTAL_TIMEOUT_MS: u64 = 30000;
const DEFAULT_COLLECTOR_DEADLINE_MS: u64 = 90000;
const DEFAULT_HTTP_MAX_ATTEMPTS: usize = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 250;
const DEFAULT_BACKOFF_CAP_MS: u64 = 10000;
const DEFAULT_CACHE_TTL_SECS: u64 = 900;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    date_range_backward_days: u32,
    date_range_forward_days: u32,
    score_threshold: f64,
    max_results: Option<NonZeroUsize>,
    adaptive_enabled: bool,
    adaptive_max_attempts: u32,
    adaptive_window_step_days: u32,
    adaptive_threshold_step: f64,
    tmdb_api_key: Option<String>,
    tmdb_base_url: String,
    tmdb_language: String,
    tmdb_max_pages: u32,
    igdb_client_id: Option<String>,
    igdb_client_secret: Option<String>,
    igdb_base_url: String,
    igdb_token_url: String,
    collector_connect_timeout: Duration,
    collector_total_timeout: Duration,
    collector_deadline: Duration,
    http_max_attempts: usize,
    http_backoff_base_ms: u64,
    http_backoff_cap_ms: u64,
    response_cache_ttl: Option<Duration>,
    otel_exporter_endpoint: Option<String>,
    otel_sampling_ratio: f64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_bind: SocketAddr::from(([0, 0, 0, 0], 9010)),
            date_range_backward_days: DEFAULT_DATE_RANGE_DAYS,
            date_range_forward_days: DEFAULT_DATE_RANGE_DAYS,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            max_results: None,
            adaptive_enabled: true,
            adaptive_max_attempts: DEFAULT_ADAPTIVE_MAX_ATTEMPTS,
            adaptive_window_step_days: DEFAULT_ADAPTIVE_WINDOW_STEP_DAYS,
            adaptive_threshold_step: DEFAULT_ADAPTIVE_THRESHOLD_STEP,
            tmdb_api_key: None,
            tmdb_base_url: DEFAULT_TMDB_BASE_URL.to_string(),
            tmdb_language: DEFAULT_TMDB_LANGUAGE.to_string(),
            tmdb_max_pages: DEFAULT_TMDB_MAX_PAGES,
            igdb_client_id: None,
            igdb_client_secret: None,
            igdb_base_url: DEFAULT_IGDB_BASE_URL.to_string(),
            igdb_token_url: DEFAULT_IGDB_TOKEN_URL.to_string(),
            collector_connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            collector_total_timeout: Duration::from_millis(DEFAULT_TOTAL_TIMEOUT_MS),
            collector_deadline: Duration::from_millis(DEFAULT_COLLECTOR_DEADLINE_MS),
            http_max_attempts: DEFAULT_HTTP_MAX_ATTEMPTS,
            http_backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            http_backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            response_cache_ttl: Some(Duration::from_secs(DEFAULT_CACHE_TTL_SECS)),
            otel_exporter_endpoint: None,
            otel_sampling_ratio: 1.0,
        }
    }
}

impl Config {
    /// 環境変数から Release Radar の設定値を読み込み、検証する。
    ///
    /// 必須の環境変数は無い。コレクタは資格情報が揃っている場合にだけ有効になる。
    ///
    /// # Errors
    /// 数値／アドレス／真偽値のパースや範囲検証に失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr("RELEASE_RADAR_HTTP_BIND", DEFAULT_HTTP_BIND)?;

        // Ranking
        let date_range_backward_days = parse_u32("DATE_RANGE_BACKWARD", DEFAULT_DATE_RANGE_DAYS)?;
        let date_range_forward_days = parse_u32("DATE_RANGE_FORWARD", DEFAULT_DATE_RANGE_DAYS)?;
        let score_threshold = parse_finite_f64("SCORE_THRESHOLD", DEFAULT_SCORE_THRESHOLD)?;
        let max_results = parse_optional_non_zero_usize("MAX_RESULTS")?;

        // Adaptive retry
        let adaptive_enabled = parse_bool("ADAPTIVE_ENABLED", true)?;
        let adaptive_max_attempts =
            parse_non_zero_u32("ADAPTIVE_MAX_ATTEMPTS", DEFAULT_ADAPTIVE_MAX_ATTEMPTS)?;
        let adaptive_window_step_days =
            parse_u32("ADAPTIVE_WINDOW_STEP_DAYS", DEFAULT_ADAPTIVE_WINDOW_STEP_DAYS)?;
        let adaptive_threshold_step =
            parse_non_negative_f64("ADAPTIVE_THRESHOLD_STEP", DEFAULT_ADAPTIVE_THRESHOLD_STEP)?;

        // TMDB
        let tmdb_api_key = optional_env("TMDB_API_KEY");
        let tmdb_base_url =
            env::var("TMDB_BASE_URL").unwrap_or_else(|_| DEFAULT_TMDB_BASE_URL.to_string());
        let tmdb_language =
            env::var("TMDB_LANGUAGE").unwrap_or_else(|_| DEFAULT_TMDB_LANGUAGE.to_string());
        let tmdb_max_pages = parse_non_zero_u32("TMDB_MAX_PAGES", DEFAULT_TMDB_MAX_PAGES)?;

        // IGDB
        let igdb_client_id = optional_env("IGDB_CLIENT_ID");
        let igdb_client_secret = optional_env("IGDB_CLIENT_SECRET");
        let igdb_base_url =
            env::var("IGDB_BASE_URL").unwrap_or_else(|_| DEFAULT_IGDB_BASE_URL.to_string());
        let igdb_token_url =
            env::var("IGDB_TOKEN_URL").unwrap_or_else(|_| DEFAULT_IGDB_TOKEN_URL.to_string());

        // HTTP timeout settings
        let collector_connect_timeout =
            parse_duration_ms("COLLECTOR_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT_MS)?;
        let collector_total_timeout =
            parse_duration_ms("COLLECTOR_TOTAL_TIMEOUT_MS", DEFAULT_TOTAL_TIMEOUT_MS)?;
        let collector_deadline =
            parse_duration_ms("COLLECTOR_DEADLINE_MS", DEFAULT_COLLECTOR_DEADLINE_MS)?;

        // Retry settings (exponential backoff + jitter)
        // 初回の呼び出しを含む試行回数
        let http_max_attempts = parse_usize("HTTP_MAX_ATTEMPTS", DEFAULT_HTTP_MAX_ATTEMPTS)?;
        if http_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "HTTP_MAX_ATTEMPTS",
                source: anyhow::anyhow!("must be greater than zero"),
            });
        }
        let http_backoff_base_ms = parse_u64("HTTP_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS)?;
        let http_backoff_cap_ms = parse_u64("HTTP_BACKOFF_CAP_MS", DEFAULT_BACKOFF_CAP_MS)?;

        let response_cache_ttl = match parse_u64("RESPONSE_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        // OpenTelemetry settings
        let otel_exporter_endpoint = optional_env("OTEL_EXPORTER_OTLP_ENDPOINT");
        let otel_sampling_ratio = parse_ratio("OTEL_SAMPLING_RATIO", 1.0)?;

        Ok(Self {
            http_bind,
            date_range_backward_days,
            date_range_forward_days,
            score_threshold,
            max_results,
            adaptive_enabled,
            adaptive_max_attempts,
            adaptive_window_step_days,
            adaptive_threshold_step,
            tmdb_api_key,
            tmdb_base_url,
            tmdb_language,
            tmdb_max_pages,
            igdb_client_id,
            igdb_client_secret,
            igdb_base_url,
            igdb_token_url,
            collector_connect_timeout,
            collector_total_timeout,
            collector_deadline,
            http_max_attempts,
            http_backoff_base_ms,
            http_backoff_cap_ms,
            response_cache_ttl,
            otel_exporter_endpoint,
            otel_sampling_ratio,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn date_range_backward_days(&self) -> u32 {
        self.date_range_backward_days
    }

    #[must_use]
    pub fn date_range_forward_days(&self) -> u32 {
        self.date_range_forward_days
    }

    #[must_use]
    pub fn score_threshold(&self) -> f64 {
        self.score_threshold
    }

    #[must_use]
    pub fn max_results(&self) -> Option<NonZeroUsize> {
        self.max_results
    }

    #[must_use]
    pub fn adaptive_enabled(&self) -> bool {
        self.adaptive_enabled
    }

    #[must_use]
    pub fn adaptive_policy(&self) -> AdaptivePolicy {
        AdaptivePolicy {
            max_attempts: self.adaptive_max_attempts,
            window_step_days: self.adaptive_window_step_days,
            threshold_step: self.adaptive_threshold_step,
        }
    }

    #[must_use]
    pub fn tmdb_api_key(&self) -> Option<&str> {
        self.tmdb_api_key.as_deref()
    }

    #[must_use]
    pub fn tmdb_base_url(&self) -> &str {
        &self.tmdb_base_url
    }

    #[must_use]
    pub fn tmdb_language(&self) -> &str {
        &self.tmdb_language
    }

    #[must_use]
    pub fn tmdb_max_pages(&self) -> u32 {
        self.tmdb_max_pages
    }

    /// IDとシークレットの両方が設定されている場合のみ返す。
    #[must_use]
    pub fn igdb_credentials(&self) -> Option<(&str, &str)> {
        self.igdb_client_id
            .as_deref()
            .zip(self.igdb_client_secret.as_deref())
    }

    #[must_use]
    pub fn igdb_base_url(&self) -> &str {
        &self.igdb_base_url
    }

    #[must_use]
    pub fn igdb_token_url(&self) -> &str {
        &self.igdb_token_url
    }

    #[must_use]
    pub fn collector_connect_timeout(&self) -> Duration {
        self.collector_connect_timeout
    }

    #[must_use]
    pub fn collector_total_timeout(&self) -> Duration {
        self.collector_total_timeout
    }

    /// ページング・リトライを含む1コレクタ呼び出し全体の上限。
    #[must_use]
    pub fn collector_deadline(&self) -> Duration {
        self.collector_deadline
    }

    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.http_max_attempts,
            self.http_backoff_base_ms,
            self.http_backoff_cap_ms,
        )
    }

    #[must_use]
    pub fn response_cache_ttl(&self) -> Option<Duration> {
        self.response_cache_ttl
    }

    #[must_use]
    pub fn otel_exporter_endpoint(&self) -> Option<&str> {
        self.otel_exporter_endpoint.as_deref()
    }

    #[must_use]
    pub fn otel_sampling_ratio(&self) -> f64 {
        self.otel_sampling_ratio
    }
}

/// 未設定または空文字列の場合は `None`。
fn optional_env(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_optional_non_zero_usize(name: &'static str) -> Result<Option<NonZeroUsize>, ConfigError> {
    let Some(raw) = optional_env(name) else {
        return Ok(None);
    };
    let parsed = raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    NonZeroUsize::new(parsed)
        .map(Some)
        .ok_or_else(|| ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("must be greater than zero"),
        })
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(ms))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_non_zero_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let parsed = parse_u32(name, default)?;
    if parsed == 0 {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("must be greater than zero"),
        });
    }
    Ok(parsed)
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_finite_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    if !parsed.is_finite() {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("value must be a finite number"),
        });
    }
    Ok(parsed)
}

fn parse_non_negative_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let parsed = parse_finite_f64(name, default)?;
    if parsed < 0.0 {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("value must not be negative"),
        });
    }
    Ok(parsed)
}

fn parse_ratio(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let parsed = parse_finite_f64(name, default)?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("value must be between 0 and 1"),
        });
    }
    Ok(parsed)
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}
