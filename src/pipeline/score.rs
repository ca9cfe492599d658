//! Excitement scoring.
//!
//! 人気度・リリース日との近さ・メディア種別の3成分をそれぞれ重み付けして合算する、
//! 上限付きの加算モデル。結果は常に [0, 100] に収まる。

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::record::{MediaType, ReleaseRecord};
use crate::util::error::RecordError;

/// 人気度が提供されていないレコードに適用する値。
pub const DEFAULT_POPULARITY: f64 = 50.0;
pub const MAX_SCORE: f64 = 100.0;

/// 各成分の重みと減衰率。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub popularity: f64,
    pub recency: f64,
    pub media_type: f64,
    /// 公開済みリリースの1日あたりの減点
    pub past_decay_per_day: f64,
    /// 未公開リリースの1日あたりの減点
    pub future_decay_per_day: f64,
    pub game_boost: f64,
    pub screen_boost: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            popularity: 0.5,
            recency: 0.3,
            media_type: 0.2,
            past_decay_per_day: 1.0,
            future_decay_per_day: 2.0,
            game_boost: 20.0,
            screen_boost: 10.0,
        }
    }
}

/// 成分ごとの内訳（重み適用後）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub popularity: f64,
    pub recency: f64,
    pub media_type: f64,
    pub total: f64,
}

/// スコア付けの結果。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredBatch {
    pub records: Vec<ReleaseRecord>,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ExcitementScorer {
    weights: ScoreWeights,
}

impl ExcitementScorer {
    #[must_use]
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// # Errors
    /// 人気度が有限でない場合は [`RecordError::NonFinite`] を返す。
    #[allow(clippy::cast_precision_loss)]
    pub fn breakdown(
        &self,
        record: &ReleaseRecord,
        today: NaiveDate,
    ) -> Result<ScoreBreakdown, RecordError> {
        let w = &self.weights;

        let popularity = record.popularity.unwrap_or(DEFAULT_POPULARITY);
        if !popularity.is_finite() {
            return Err(RecordError::NonFinite("popularity"));
        }
        let popularity_score = popularity.clamp(0.0, MAX_SCORE) * w.popularity;

        let days_until_release = (record.release_date - today).num_days() as f64;
        let recency = if days_until_release < 0.0 {
            (MAX_SCORE + days_until_release * w.past_decay_per_day).max(0.0)
        } else {
            (MAX_SCORE - days_until_release * w.future_decay_per_day).max(0.0)
        };
        let recency_score = recency * w.recency;

        let boost = match record.media_type() {
            MediaType::Game => w.game_boost,
            MediaType::Movie | MediaType::Tv => w.screen_boost,
        };
        let type_score = boost * w.media_type;

        let total = (popularity_score + recency_score + type_score).clamp(0.0, MAX_SCORE);

        Ok(ScoreBreakdown {
            popularity: popularity_score,
            recency: recency_score,
            media_type: type_score,
            total,
        })
    }

    /// # Errors
    /// [`ExcitementScorer::breakdown`] と同じ。
    pub fn score(&self, record: &ReleaseRecord, today: NaiveDate) -> Result<f64, RecordError> {
        self.breakdown(record, today).map(|breakdown| breakdown.total)
    }

    /// すべてのレコードに `excitement_score` を設定する。失敗したレコードは破棄する。
    #[must_use]
    pub fn score_all(&self, records: Vec<ReleaseRecord>, today: NaiveDate) -> ScoredBatch {
        let mut batch = ScoredBatch {
            records: Vec::with_capacity(records.len()),
            dropped: 0,
        };

        for mut record in records {
            match self.breakdown(&record, today) {
                Ok(breakdown) => {
                    debug!(
                        title = %record.title,
                        media_type = %record.media_type(),
                        popularity = breakdown.popularity,
                        recency = breakdown.recency,
                        type_weight = breakdown.media_type,
                        score = breakdown.total,
                        "calculated excitement score"
                    );
                    record.excitement_score = Some(breakdown.total);
                    batch.records.push(record);
                }
                Err(error) => {
                    warn!(title = %record.title, %error, "dropping release that failed scoring");
                    batch.dropped += 1;
                }
            }
        }

        batch
    }
}
