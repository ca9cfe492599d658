//! リリース情報のコレクタ。
//!
//! 各コレクタは外部カタログを1つ担当し、ソース依存の [`RawRelease`] を返す。
//! キャッシュが渡された場合は同じ `(source, media_type, window)` の呼び出しを
//! ネットワークに出さずに返す。
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use tracing::{debug, info};

use super::cache::{ResponseCache, cache_key};
use super::record::{MediaType, RawRelease};
use super::window::DateWindow;
use crate::clients::igdb::IgdbGame;
use crate::clients::tmdb::{TmdbMovie, TmdbTvShow};
use crate::clients::{IgdbClient, TmdbClient};
use crate::util::error::CollectorError;

#[async_trait]
pub trait ReleaseCollector: Send + Sync {
    /// ログやメトリクスのラベルに使う名前。
    fn name(&self) -> &str;

    /// 範囲内のリリースを取得する。`media_type` を指定した場合、そのコレクタが
    /// 扱わない種別なら空を返す。
    async fn get_releases(
        &self,
        media_type: Option<MediaType>,
        window: &DateWindow,
        cache: Option<&ResponseCache>,
    ) -> Result<Vec<RawRelease>, CollectorError>;
}

/// キャッシュがあれば参照し、無ければ `fetch` を実行して結果を保存する。
pub(crate) async fn fetch_cached<F, Fut>(
    cache: Option<&ResponseCache>,
    key: String,
    fetch: F,
) -> Result<Vec<RawRelease>, CollectorError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<RawRelease>, CollectorError>>,
{
    let Some(cache) = cache else {
        return fetch().await;
    };

    if let Some(cached) = cache.get(&key).await {
        debug!(key = %key, count = cached.len(), "response cache hit");
        return Ok(cached);
    }

    let releases = fetch().await?;
    cache.insert(key, releases.clone()).await;
    Ok(releases)
}

/// TMDBから映画とTV番組を取得する。
pub struct TmdbCollector {
    client: Arc<TmdbClient>,
}

impl TmdbCollector {
    pub const NAME: &'static str = "tmdb";

    #[must_use]
    pub fn new(client: Arc<TmdbClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReleaseCollector for TmdbCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn get_releases(
        &self,
        media_type: Option<MediaType>,
        window: &DateWindow,
        cache: Option<&ResponseCache>,
    ) -> Result<Vec<RawRelease>, CollectorError> {
        let mut releases = Vec::new();

        if media_type.is_none_or(|wanted| wanted == MediaType::Movie) {
            let key = cache_key(Self::NAME, Some(MediaType::Movie), window);
            let movies = fetch_cached(cache, key, move || async move {
                let movies = self.client.discover_movies(window).await?;
                Ok::<_, CollectorError>(movies.into_iter().map(movie_to_raw).collect())
            })
            .await?;
            info!(collector = Self::NAME, count = movies.len(), "fetched movies");
            releases.extend(movies);
        }

        if media_type.is_none_or(|wanted| wanted == MediaType::Tv) {
            let key = cache_key(Self::NAME, Some(MediaType::Tv), window);
            let shows = fetch_cached(cache, key, move || async move {
                let shows = self.client.discover_tv(window).await?;
                Ok::<_, CollectorError>(shows.into_iter().map(tv_to_raw).collect())
            })
            .await?;
            info!(collector = Self::NAME, count = shows.len(), "fetched TV shows");
            releases.extend(shows);
        }

        Ok(releases)
    }
}

fn movie_to_raw(movie: TmdbMovie) -> RawRelease {
    RawRelease {
        title: movie.title,
        media_type: Some(MediaType::Movie.as_str().to_string()),
        release_date: movie.release_date,
        popularity: movie.popularity,
        rating: movie.vote_average,
        source: Some(TmdbCollector::NAME.to_string()),
        source_id: Some(movie.id.to_string()),
        ..RawRelease::default()
    }
}

fn tv_to_raw(show: TmdbTvShow) -> RawRelease {
    RawRelease {
        name: show.name,
        media_type: Some(MediaType::Tv.as_str().to_string()),
        first_air_date: show.first_air_date,
        popularity: show.popularity,
        rating: show.vote_average,
        source: Some(TmdbCollector::NAME.to_string()),
        source_id: Some(show.id.to_string()),
        ..RawRelease::default()
    }
}

/// IGDBからゲームを取得する。
pub struct IgdbCollector {
    client: Arc<IgdbClient>,
}

impl IgdbCollector {
    pub const NAME: &'static str = "igdb";

    #[must_use]
    pub fn new(client: Arc<IgdbClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReleaseCollector for IgdbCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn get_releases(
        &self,
        media_type: Option<MediaType>,
        window: &DateWindow,
        cache: Option<&ResponseCache>,
    ) -> Result<Vec<RawRelease>, CollectorError> {
        if media_type.is_some_and(|wanted| wanted != MediaType::Game) {
            return Ok(Vec::new());
        }

        let key = cache_key(Self::NAME, Some(MediaType::Game), window);
        let games = fetch_cached(cache, key, move || async move {
            let games = self.client.fetch_games(window).await?;
            Ok::<_, CollectorError>(games.into_iter().filter_map(game_to_raw).collect())
        })
        .await?;
        info!(collector = Self::NAME, count = games.len(), "fetched games");
        Ok(games)
    }
}

/// フォロー数を最も重く扱う人気度の合成値。
fn game_popularity(game: &IgdbGame) -> f64 {
    game.follows.unwrap_or(0.0) * 10.0
        + game.rating.unwrap_or(0.0) * 0.5
        + game.aggregated_rating.unwrap_or(0.0) * 0.5
}

/// サムネイルURLを大きいカバー画像のURLに置き換え、スキームを補う。
fn upgrade_cover_url(url: &str) -> String {
    let upgraded = url.replace("t_thumb", "t_cover_big");
    if upgraded.starts_with("https:") {
        upgraded
    } else {
        format!("https:{upgraded}")
    }
}

/// リリース日の無いゲームは対象外。
fn game_to_raw(game: IgdbGame) -> Option<RawRelease> {
    let release_date = game
        .first_release_date
        .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0))
        .map(|timestamp| timestamp.date_naive().format("%Y-%m-%d").to_string())?;

    Some(RawRelease {
        popularity: Some(game_popularity(&game)),
        title: game.name,
        media_type: Some(MediaType::Game.as_str().to_string()),
        release_date: Some(release_date),
        rating: Some(game.rating.unwrap_or(0.0)),
        total_rating: Some(game.total_rating.unwrap_or(0.0)),
        platforms: game
            .platforms
            .into_iter()
            .filter_map(|platform| platform.name)
            .collect(),
        cover_url: game
            .cover
            .and_then(|cover| cover.url)
            .map(|url| upgrade_cover_url(&url)),
        source: Some(IgdbCollector::NAME.to_string()),
        source_id: Some(game.id.to_string()),
        ..RawRelease::default()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::clients::igdb::{IgdbCover, IgdbPlatform};
    use crate::clients::{IgdbConfig, TmdbConfig};
    use crate::util::retry::RetryConfig;

    fn game(id: u64) -> IgdbGame {
        IgdbGame {
            id,
            name: Some("Test Game".to_string()),
            first_release_date: Some(1_704_153_600),
            rating: Some(80.0),
            total_rating: Some(82.0),
            aggregated_rating: Some(90.0),
            follows: Some(3.0),
            platforms: vec![
                IgdbPlatform {
                    name: Some("PC".to_string()),
                },
                IgdbPlatform { name: None },
            ],
            cover: Some(IgdbCover {
                url: Some("//images.igdb.com/igdb/image/upload/t_thumb/co1.jpg".to_string()),
            }),
        }
    }

    #[test]
    fn game_popularity_weights_follows_heavily() {
        // 3*10 + 80*0.5 + 90*0.5
        assert!((game_popularity(&game(1)) - 115.0).abs() < f64::EPSILON);
    }

    #[test]
    fn game_maps_to_raw_release() {
        let raw = game_to_raw(game(42)).expect("game has a release date");

        assert_eq!(raw.title.as_deref(), Some("Test Game"));
        assert_eq!(raw.media_type.as_deref(), Some("game"));
        assert_eq!(raw.release_date.as_deref(), Some("2024-01-02"));
        assert_eq!(raw.platforms, vec!["PC".to_string()]);
        assert_eq!(
            raw.cover_url.as_deref(),
            Some("https://images.igdb.com/igdb/image/upload/t_cover_big/co1.jpg")
        );
        assert_eq!(raw.source_id.as_deref(), Some("42"));
    }

    #[test]
    fn game_without_release_date_is_skipped() {
        let mut undated = game(1);
        undated.first_release_date = None;
        assert!(game_to_raw(undated).is_none());
    }

    #[test]
    fn https_cover_urls_are_left_alone() {
        assert_eq!(
            upgrade_cover_url("https://x/t_thumb/a.jpg"),
            "https://x/t_cover_big/a.jpg"
        );
    }

    #[test]
    fn tmdb_results_keep_title_and_name_keys() {
        let movie = movie_to_raw(TmdbMovie {
            id: 1,
            title: Some("Dune".to_string()),
            release_date: Some("2024-03-01".to_string()),
            popularity: Some(90.0),
            vote_average: Some(8.1),
        });
        assert_eq!(movie.title.as_deref(), Some("Dune"));
        assert_eq!(movie.rating, Some(8.1));

        let show = tv_to_raw(TmdbTvShow {
            id: 2,
            name: Some("Shogun".to_string()),
            first_air_date: Some("2024-02-27".to_string()),
            popularity: None,
            vote_average: None,
        });
        assert_eq!(show.name.as_deref(), Some("Shogun"));
        assert!(show.title.is_none());
        assert_eq!(show.media_type.as_deref(), Some("tv"));
    }

    #[tokio::test]
    async fn fetch_cached_skips_second_fetch() {
        let cache = ResponseCache::new(None);
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for _ in 0..2 {
            let releases = fetch_cached(Some(&cache), "k".to_string(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CollectorError>(vec![RawRelease::new(MediaType::Movie, "Once", "2024-01-01")])
            })
            .await
            .expect("fetch succeeds");
            assert_eq!(releases.len(), 1);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let cache = ResponseCache::new(None);

        let result = fetch_cached(Some(&cache), "k".to_string(), || async {
            Err::<Vec<RawRelease>, _>(CollectorError::Timeout(Duration::from_secs(1)))
        })
        .await;

        assert!(result.is_err());
        assert!(cache.is_empty().await);
    }

    fn window() -> DateWindow {
        DateWindow::parse("2024-01-01", "2024-01-07").expect("valid window")
    }

    fn tmdb_collector(server: &MockServer) -> TmdbCollector {
        let client = TmdbClient::new(TmdbConfig {
            base_url: server.uri(),
            api_key: "key".to_string(),
            language: "en-US".to_string(),
            max_pages: 1,
            connect_timeout: Duration::from_secs(3),
            total_timeout: Duration::from_secs(10),
            retry: RetryConfig::new(1, 1, 5),
        })
        .expect("client should build");
        TmdbCollector::new(Arc::new(client))
    }

    fn igdb_collector(server: &MockServer) -> IgdbCollector {
        let client = IgdbClient::new(IgdbConfig {
            base_url: format!("{}/v4", server.uri()),
            token_url: format!("{}/oauth2/token", server.uri()),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            connect_timeout: Duration::from_secs(3),
            total_timeout: Duration::from_secs(10),
            retry: RetryConfig::new(1, 1, 5),
        })
        .expect("client should build");
        IgdbCollector::new(Arc::new(client))
    }

    #[tokio::test]
    async fn tmdb_movie_filter_skips_tv_discovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discover/movie"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_pages": 1,
                "results": [{"id": 1, "title": "Dune", "release_date": "2024-01-03"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/discover/tv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_pages": 1,
                "results": []
            })))
            .expect(0)
            .mount(&server)
            .await;

        let releases = tmdb_collector(&server)
            .get_releases(Some(MediaType::Movie), &window(), None)
            .await
            .expect("movies are fetched");

        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].media_type.as_deref(), Some("movie"));
        server.verify().await;
    }

    #[tokio::test]
    async fn tmdb_game_filter_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let releases = tmdb_collector(&server)
            .get_releases(Some(MediaType::Game), &window(), None)
            .await
            .expect("nothing to fetch");

        assert!(releases.is_empty());
        server.verify().await;
    }

    #[tokio::test]
    async fn igdb_ignores_non_game_media_types_without_requests() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let collector = igdb_collector(&server);
        for media_type in [MediaType::Movie, MediaType::Tv] {
            let releases = collector
                .get_releases(Some(media_type), &window(), None)
                .await
                .expect("nothing to fetch");
            assert!(releases.is_empty());
        }
        server.verify().await;
    }
}
