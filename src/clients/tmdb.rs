//! TMDB discover APIクライアント。
//!
//! 映画とTV番組をリリース日範囲で検索し、人気度の降順で返す。ページングは
//! `max_pages` で打ち切る。
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{decode_json, parse_base_url};
use crate::pipeline::window::DateWindow;
use crate::util::error::CollectorError;
use crate::util::retry::{RetryConfig, with_retry};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// discover/movie の結果1件。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TmdbMovie {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

/// discover/tv の結果1件。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TmdbTvShow {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DiscoverPage<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Clone)]
pub struct TmdbConfig {
    pub base_url: String,
    pub api_key: String,
    pub language: String,
    pub max_pages: u32,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    base_url: Url,
    api_key: String,
    language: String,
    max_pages: u32,
    retry: RetryConfig,
}

impl TmdbClient {
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返す。
    pub fn new(config: TmdbConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build TMDB HTTP client")?;

        let base_url = parse_base_url(&config.base_url).context("invalid TMDB base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            language: config.language,
            max_pages: config.max_pages.max(1),
            retry: config.retry,
        })
    }

    /// 範囲内に劇場公開される映画を取得する。
    ///
    /// # Errors
    /// HTTPエラー、非成功ステータス、デコード失敗時に [`CollectorError`] を返す。
    pub async fn discover_movies(&self, window: &DateWindow) -> Result<Vec<TmdbMovie>, CollectorError> {
        self.discover("discover/movie", "primary_release_date", window)
            .await
    }

    /// 範囲内に初回放送されるTV番組を取得する。
    ///
    /// # Errors
    /// [`TmdbClient::discover_movies`] と同じ。
    pub async fn discover_tv(&self, window: &DateWindow) -> Result<Vec<TmdbTvShow>, CollectorError> {
        self.discover("discover/tv", "first_air_date", window).await
    }

    async fn discover<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        date_field: &'static str,
        window: &DateWindow,
    ) -> Result<Vec<T>, CollectorError> {
        let mut results = Vec::new();
        let mut page = 1_u32;

        loop {
            let client = self;
            let response: DiscoverPage<T> = with_retry(&self.retry, endpoint, move || {
                client.fetch_page(endpoint, date_field, window, page)
            })
            .await?;

            let count = response.results.len();
            results.extend(response.results);
            debug!(endpoint, page, count, total = results.len(), "fetched TMDB page");

            if page >= response.total_pages || page >= self.max_pages {
                break;
            }
            page += 1;
        }

        Ok(results)
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        date_field: &'static str,
        window: &DateWindow,
        page: u32,
    ) -> Result<DiscoverPage<T>, CollectorError> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|err| CollectorError::Config(format!("invalid TMDB endpoint: {err}")))?;

        let params = [
            ("api_key".to_string(), self.api_key.clone()),
            ("language".to_string(), self.language.clone()),
            ("sort_by".to_string(), "popularity.desc".to_string()),
            (
                format!("{date_field}.gte"),
                window.start().format(DATE_FORMAT).to_string(),
            ),
            (
                format!("{date_field}.lte"),
                window.end().format(DATE_FORMAT).to_string(),
            ),
            ("page".to_string(), page.to_string()),
        ];

        let response = self.client.get(url).query(&params).send().await?;
        decode_json(response, endpoint).await
    }
}
