//! IGDB games APIクライアント。
//!
//! Twitchのclient credentialsでアクセストークンを取得し、Apicalypseクエリで
//! リリース日範囲のゲームを検索する。トークンが401で拒否された場合は一度だけ
//! 再取得してリクエストをやり直す。
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{decode_json, parse_base_url};
use crate::pipeline::window::DateWindow;
use crate::util::error::CollectorError;
use crate::util::retry::{RetryConfig, with_retry};

const GAMES_ENDPOINT: &str = "games";
const GAMES_LIMIT: u32 = 500;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IgdbPlatform {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IgdbCover {
    #[serde(default)]
    pub url: Option<String>,
}

/// `/games` の結果1件。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IgdbGame {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    /// Unix秒
    #[serde(default)]
    pub first_release_date: Option<i64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub total_rating: Option<f64>,
    #[serde(default)]
    pub aggregated_rating: Option<f64>,
    #[serde(default)]
    pub follows: Option<f64>,
    #[serde(default)]
    pub platforms: Vec<IgdbPlatform>,
    #[serde(default)]
    pub cover: Option<IgdbCover>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct IgdbConfig {
    pub base_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
    pub retry: RetryConfig,
}

#[derive(Debug)]
pub struct IgdbClient {
    client: Client,
    base_url: Url,
    token_url: Url,
    client_id: String,
    client_secret: String,
    retry: RetryConfig,
    token: RwLock<Option<String>>,
}

impl IgdbClient {
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返す。
    pub fn new(config: IgdbConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build IGDB HTTP client")?;

        let base_url = parse_base_url(&config.base_url).context("invalid IGDB base URL")?;
        let token_url = Url::parse(&config.token_url).context("invalid IGDB token URL")?;

        Ok(Self {
            client,
            base_url,
            token_url,
            client_id: config.client_id,
            client_secret: config.client_secret,
            retry: config.retry,
            token: RwLock::new(None),
        })
    }

    /// 範囲内に初回リリースされるゲームを取得する。
    ///
    /// # Errors
    /// トークン取得の失敗は [`CollectorError::Auth`]、それ以外はHTTP/デコードエラーを返す。
    pub async fn fetch_games(&self, window: &DateWindow) -> Result<Vec<IgdbGame>, CollectorError> {
        let query = build_games_query(window);
        debug!(query = %query, "IGDB games query");

        let token = self.access_token().await?;
        match self.post_games(&token, &query).await {
            Err(CollectorError::Status { status, .. }) if status == StatusCode::UNAUTHORIZED => {
                warn!("IGDB rejected the access token, refreshing once");
                let token = self.refresh_token().await?;
                self.post_games(&token, &query).await
            }
            other => other,
        }
    }

    async fn access_token(&self) -> Result<String, CollectorError> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> Result<String, CollectorError> {
        let client = self;
        let response: TokenResponse =
            with_retry(&self.retry, "igdb.token", move || client.request_token()).await?;

        let token = response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| CollectorError::Auth("access token not found in response".to_string()))?;

        info!(expires_in = response.expires_in, "obtained IGDB access token");
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn request_token(&self) -> Result<TokenResponse, CollectorError> {
        let response = self
            .client
            .post(self.token_url.clone())
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::Auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        decode_json(response, "oauth2/token").await
    }

    async fn post_games(&self, token: &str, query: &str) -> Result<Vec<IgdbGame>, CollectorError> {
        let client = self;
        with_retry(&self.retry, "igdb.games", move || {
            client.post_games_once(token, query)
        })
        .await
    }

    async fn post_games_once(&self, token: &str, query: &str) -> Result<Vec<IgdbGame>, CollectorError> {
        let url = self
            .base_url
            .join(GAMES_ENDPOINT)
            .map_err(|err| CollectorError::Config(format!("invalid IGDB endpoint: {err}")))?;

        let response = self
            .client
            .post(url)
            .header("Client-ID", &self.client_id)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "text/plain")
            .body(query.to_string())
            .send()
            .await?;

        decode_json(response, GAMES_ENDPOINT).await
    }
}

/// 範囲の開始日0時から終了日23:59:59（UTC）までを対象とするApicalypseクエリを作る。
#[must_use]
pub fn build_games_query(window: &DateWindow) -> String {
    let start = window.start().and_time(NaiveTime::MIN).and_utc().timestamp();
    let end = window.end().and_time(NaiveTime::MIN).and_utc().timestamp() + SECONDS_PER_DAY - 1;

    format!(
        "fields name, first_release_date, rating, total_rating, platforms.name, cover.url, \
         aggregated_rating, follows; \
         where first_release_date >= {start} & first_release_date <= {end} \
         & category = 0 & version_parent = null; \
         sort first_release_date asc; \
         limit {GAMES_LIMIT};"
    )
}
