//! ソース依存の生レコードを正規化済みレコードへ変換する。
use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use super::record::{MediaType, RawRelease, ReleaseDetails, ReleaseRecord};
use crate::util::error::RecordError;

/// 正規化の結果。破棄されたレコード数も保持する。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub records: Vec<ReleaseRecord>,
    pub dropped: usize,
}

/// 生レコード群を正規化する。失敗したレコードは警告ログを出して破棄する。
#[must_use]
pub fn normalize_batch(raws: Vec<RawRelease>) -> NormalizedBatch {
    let mut batch = NormalizedBatch {
        records: Vec::with_capacity(raws.len()),
        dropped: 0,
    };

    for raw in raws {
        let title = raw.title.clone().or_else(|| raw.name.clone());
        let source = raw.source.clone();
        match normalize(raw) {
            Ok(record) => batch.records.push(record),
            Err(error) => {
                warn!(
                    title = title.as_deref().unwrap_or("<untitled>"),
                    source = source.as_deref().unwrap_or("unknown"),
                    %error,
                    "dropping release that failed normalization"
                );
                batch.dropped += 1;
            }
        }
    }

    batch
}

/// 単一の生レコードを正規化する。
///
/// 種別が無い・不明な場合は `title` があれば映画、`name` があればTVと推定する。
///
/// # Errors
/// タイトルや日付が欠けている、日付がパースできない、数値が有限でない、
/// 種別が推定できない場合は [`RecordError`] を返す。
pub fn normalize(raw: RawRelease) -> Result<ReleaseRecord, RecordError> {
    let media_type = resolve_media_type(&raw)?;

    let title = raw
        .title
        .as_deref()
        .or(raw.name.as_deref())
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .ok_or(RecordError::MissingField("title"))?
        .to_string();

    let release_date = raw
        .release_date
        .as_deref()
        .or(raw.first_air_date.as_deref())
        .map(str::trim)
        .filter(|date| !date.is_empty())
        .ok_or(RecordError::MissingField("release_date"))
        .and_then(parse_release_date)?;

    let popularity = finite("popularity", raw.popularity)?.map(|value| value.max(0.0));
    let rating = finite("rating", raw.rating)?.unwrap_or(0.0).max(0.0);
    let total_rating = finite("total_rating", raw.total_rating)?
        .unwrap_or(0.0)
        .max(0.0);

    let details = match media_type {
        MediaType::Movie => ReleaseDetails::Movie {
            rating,
            total_rating,
        },
        MediaType::Tv => ReleaseDetails::Tv {
            rating,
            total_rating,
        },
        MediaType::Game => ReleaseDetails::Game {
            platforms: raw
                .platforms
                .iter()
                .map(|platform| platform.trim())
                .filter(|platform| !platform.is_empty())
                .map(str::to_string)
                .collect(),
            cover_url: raw.cover_url.clone(),
        },
    };

    Ok(ReleaseRecord {
        title,
        release_date,
        popularity,
        source: raw.source.unwrap_or_else(|| "unknown".to_string()),
        source_id: raw.source_id,
        details,
        excitement_score: None,
    })
}

fn resolve_media_type(raw: &RawRelease) -> Result<MediaType, RecordError> {
    if let Some(media_type) = raw
        .media_type
        .as_deref()
        .and_then(|declared| declared.parse::<MediaType>().ok())
    {
        return Ok(media_type);
    }

    if raw.title.is_some() {
        Ok(MediaType::Movie)
    } else if raw.name.is_some() {
        Ok(MediaType::Tv)
    } else {
        Err(RecordError::UnknownMediaType(raw.media_type.clone()))
    }
}

/// `YYYY-MM-DD` または RFC 3339 の日時（UTCの日付に丸める）を受け付ける。
fn parse_release_date(value: &str) -> Result<NaiveDate, RecordError> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }

    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc).date_naive())
        .map_err(|_| RecordError::InvalidDate(value.to_string()))
}

fn finite(field: &'static str, value: Option<f64>) -> Result<Option<f64>, RecordError> {
    match value {
        Some(number) if !number.is_finite() => Err(RecordError::NonFinite(field)),
        other => Ok(other),
    }
}
