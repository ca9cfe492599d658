//! エラー分類とリトライ判定ユーティリティ。
//!
//! 実行全体を止める入力エラーと、コレクタ単位・レコード単位で回復可能なエラーを
//! 型として分けて扱う。
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use thiserror::Error;

/// ネットワーク呼び出しの前に検出される致命的な入力エラー。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("invalid date {value:?}: expected YYYY-MM-DD")]
    InvalidDate { value: String },
    #[error("date window is inverted: start {start} is after end {end}")]
    InvertedWindow { start: NaiveDate, end: NaiveDate },
    #[error("score threshold must be a finite number, got {0}")]
    InvalidThreshold(f64),
    #[error("max_results must be greater than zero")]
    ZeroMaxResults,
    #[error("adaptive retry requires at least one attempt")]
    ZeroAttempts,
    #[error("adaptive threshold step must not be negative, got {0}")]
    NegativeThresholdStep(f64),
}

/// コレクタ単位で回復されるエラー。パイプラインはログに残して空の結果として扱う。
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("failed to decode upstream payload from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("collector timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid collector configuration: {0}")]
    Config(String),
}

/// レコード単位で回復されるエラー。該当レコードのみ破棄される。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unparseable release date {0:?}")]
    InvalidDate(String),
    #[error("unable to determine media type (declared {0:?})")]
    UnknownMediaType(Option<String>),
    #[error("field `{0}` is not a finite number")]
    NonFinite(&'static str),
}

/// エラーの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// リトライ可能なエラー（一時的なネットワークエラー、タイムアウト、5xx、429）
    Retryable,
    /// リトライ不可能なエラー（4xx、ペイロード不正など）
    NonRetryable,
    /// コレクタにとって致命的なエラー（認証失敗、設定不備）
    Fatal,
}

/// コレクタエラーを分類する。
#[must_use]
pub fn classify_collector_error(error: &CollectorError) -> ErrorKind {
    match error {
        CollectorError::Http(err) => {
            if err.is_timeout() || err.is_connect() {
                return ErrorKind::Retryable;
            }
            err.status().map_or(ErrorKind::NonRetryable, classify_status)
        }
        CollectorError::Status { status, .. } => classify_status(*status),
        CollectorError::Timeout(_) => ErrorKind::Retryable,
        CollectorError::Auth(_) | CollectorError::Config(_) => ErrorKind::Fatal,
        CollectorError::Decode { .. } => ErrorKind::NonRetryable,
    }
}

fn classify_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Fatal,
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::Retryable,
        s if s.is_server_error() => ErrorKind::Retryable,
        _ => ErrorKind::NonRetryable,
    }
}

/// エラーがリトライ可能かどうかを判定する。
#[must_use]
pub fn is_retryable(error: &CollectorError) -> bool {
    matches!(classify_collector_error(error), ErrorKind::Retryable)
}
