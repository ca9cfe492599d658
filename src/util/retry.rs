//! 指数バックオフ+ジッター付き再試行ロジック。
//!
//! Full Jitter 戦略。コレクタのHTTP呼び出しにのみ使い、
//! パイプラインの適応リトライ（窓の拡大）とは独立している。
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use super::error::{CollectorError, is_retryable};

/// 再試行戦略の設定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// 最大試行回数（初回を含む）
    pub max_attempts: usize,
    /// ベースとなる遅延時間（ミリ秒）
    pub base_delay_ms: u64,
    /// 最大遅延時間（ミリ秒）
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 10000,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// 指定された試行回数に対する遅延時間を計算する（Full Jitter戦略）。
    ///
    /// # Arguments
    /// * `attempt` - 試行回数（0から開始）
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        // 指数バックオフ: base * 2^(attempt-1)
        let shift = u32::try_from(attempt - 1).unwrap_or(u32::MAX);
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(1_u64.checked_shl(shift).unwrap_or(u64::MAX));

        let capped_delay = exponential_delay.min(self.max_delay_ms);

        let jittered_delay = if capped_delay > 0 {
            rand::rng().random_range(0..=capped_delay)
        } else {
            0
        };

        Duration::from_millis(jittered_delay)
    }

    /// この試行回数が再試行可能かどうかを判定する。
    #[must_use]
    pub const fn can_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

/// 一時的なエラーに限り `call` を再試行する。
///
/// # Errors
/// 再試行不可能なエラー、または試行回数を使い切った場合は最後のエラーを返す。
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &'static str,
    mut call: F,
) -> Result<T, CollectorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollectorError>>,
{
    let mut attempt = 0;

    loop {
        match call().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                attempt += 1;

                if !config.can_retry(attempt) {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = config.max_attempts,
                        "request failed after all retries"
                    );
                    return Err(err);
                }

                if !is_retryable(&err) {
                    return Err(err);
                }

                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "request failed, retrying after delay"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
