//! 正規化済みリリースレコードと、コレクタが返す生ペイロード。
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::util::error::RecordError;

/// リリースのメディア種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
    Game,
}

impl MediaType {
    pub const ALL: [MediaType; 3] = [MediaType::Movie, MediaType::Tv, MediaType::Game];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
            MediaType::Game => "game",
        }
    }

    /// 表示用ラベル。
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            MediaType::Movie => "Movie",
            MediaType::Tv => "TV",
            MediaType::Game => "Game",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = RecordError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(MediaType::Movie),
            "tv" => Ok(MediaType::Tv),
            "game" => Ok(MediaType::Game),
            _ => Err(RecordError::UnknownMediaType(Some(value.to_string()))),
        }
    }
}

/// コレクタが返す、ソース依存の生レコード。
///
/// レスポンスキャッシュに保存される値でもある。フィールドはすべて任意で、
/// 正規化段階で検証される。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRelease {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_air_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rating: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl RawRelease {
    /// 種別・タイトル・日付を指定して生レコードを作る。
    #[must_use]
    pub fn new(
        media_type: MediaType,
        title: impl Into<String>,
        release_date: impl Into<String>,
    ) -> Self {
        Self {
            title: Some(title.into()),
            media_type: Some(media_type.as_str().to_string()),
            release_date: Some(release_date.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_popularity(mut self, popularity: f64) -> Self {
        self.popularity = Some(popularity);
        self
    }

    #[must_use]
    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>, source_id: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self.source_id = Some(source_id.into());
        self
    }
}

/// 種別ごとの付加情報。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "media_type", rename_all = "lowercase")]
pub enum ReleaseDetails {
    Movie {
        rating: f64,
        total_rating: f64,
    },
    Tv {
        rating: f64,
        total_rating: f64,
    },
    Game {
        platforms: BTreeSet<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cover_url: Option<String>,
    },
}

impl ReleaseDetails {
    #[must_use]
    pub fn movie() -> Self {
        ReleaseDetails::Movie {
            rating: 0.0,
            total_rating: 0.0,
        }
    }

    #[must_use]
    pub fn tv() -> Self {
        ReleaseDetails::Tv {
            rating: 0.0,
            total_rating: 0.0,
        }
    }

    #[must_use]
    pub fn game<I, S>(platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ReleaseDetails::Game {
            platforms: platforms.into_iter().map(Into::into).collect(),
            cover_url: None,
        }
    }

    #[must_use]
    pub const fn media_type(&self) -> MediaType {
        match self {
            ReleaseDetails::Movie { .. } => MediaType::Movie,
            ReleaseDetails::Tv { .. } => MediaType::Tv,
            ReleaseDetails::Game { .. } => MediaType::Game,
        }
    }

    #[must_use]
    pub fn platforms(&self) -> Option<&BTreeSet<String>> {
        match self {
            ReleaseDetails::Game { platforms, .. } => Some(platforms),
            _ => None,
        }
    }

    #[must_use]
    pub fn cover_url(&self) -> Option<&str> {
        match self {
            ReleaseDetails::Game { cover_url, .. } => cover_url.as_deref(),
            _ => None,
        }
    }
}

/// パイプライン全体で使う正規化済みレコード。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub title: String,
    pub release_date: NaiveDate,
    /// 未提供の場合は `None`。スコアラー側で既定値が適用される。
    pub popularity: Option<f64>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(flatten)]
    pub details: ReleaseDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excitement_score: Option<f64>,
}

impl ReleaseRecord {
    #[must_use]
    pub fn new(title: impl Into<String>, release_date: NaiveDate, details: ReleaseDetails) -> Self {
        Self {
            title: title.into(),
            release_date,
            popularity: None,
            source: "unknown".to_string(),
            source_id: None,
            details,
            excitement_score: None,
        }
    }

    #[must_use]
    pub fn with_popularity(mut self, popularity: f64) -> Self {
        self.popularity = Some(popularity);
        self
    }

    #[must_use]
    pub const fn media_type(&self) -> MediaType {
        self.details.media_type()
    }

    /// スコア未計算のレコードは0として扱う。
    #[must_use]
    pub fn score(&self) -> f64 {
        self.excitement_score.unwrap_or(0.0)
    }
}
