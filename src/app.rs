use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use chrono::NaiveDate;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    api,
    clients::{IgdbClient, IgdbConfig, TmdbClient, TmdbConfig},
    config::Config,
    observability::Telemetry,
    pipeline::{
        AdaptivePolicy, RankRequest, RankingPipeline,
        cache::ResponseCache,
        collect::{IgdbCollector, TmdbCollector},
    },
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    pipeline: Arc<RankingPipeline>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn config(&self) -> &Config {
        &self.registry.config
    }

    pub(crate) fn pipeline(&self) -> &RankingPipeline {
        &self.registry.pipeline
    }
}

impl ComponentRegistry {
    /// 構成情報と依存をまとめて初期化し、アプリケーションの共有レジストリを構築する。
    ///
    /// # Errors
    /// Telemetry の初期化や HTTP クライアント構築が失敗した場合はエラーを返す。
    pub fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new(config.otel_exporter_endpoint(), config.otel_sampling_ratio())?;
        let cache = Arc::new(
            ResponseCache::new(config.response_cache_ttl()).with_metrics(telemetry.metrics()),
        );
        let pipeline = build_pipeline(&config, &telemetry, cache)?;
        Ok(Self::assemble(config, telemetry, pipeline))
    }

    /// 構築済みの部品からレジストリを組み立てる。
    #[must_use]
    pub fn assemble(config: Config, telemetry: Telemetry, pipeline: RankingPipeline) -> Self {
        Self {
            config: Arc::new(config),
            telemetry,
            pipeline: Arc::new(pipeline),
        }
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn pipeline(&self) -> Arc<RankingPipeline> {
        Arc::clone(&self.pipeline)
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}

/// 資格情報が揃っているコレクタだけを登録したパイプラインを作る。
///
/// # Errors
/// HTTP クライアントの構築に失敗した場合はエラーを返す。
pub fn build_pipeline(
    config: &Config,
    telemetry: &Telemetry,
    cache: Arc<ResponseCache>,
) -> Result<RankingPipeline> {
    let mut builder = RankingPipeline::builder()
        .with_cache(cache)
        .with_collector_timeout(config.collector_deadline())
        .with_metrics(telemetry.metrics_arc());

    if let Some(api_key) = config.tmdb_api_key() {
        let client = TmdbClient::new(TmdbConfig {
            base_url: config.tmdb_base_url().to_string(),
            api_key: api_key.to_string(),
            language: config.tmdb_language().to_string(),
            max_pages: config.tmdb_max_pages(),
            connect_timeout: config.collector_connect_timeout(),
            total_timeout: config.collector_total_timeout(),
            retry: config.retry_config(),
        })
        .context("failed to build TMDB client")?;
        builder = builder.with_collector(Arc::new(TmdbCollector::new(Arc::new(client))));
    } else {
        warn!("TMDB_API_KEY is not set, movie and TV releases will be skipped");
    }

    if let Some((client_id, client_secret)) = config.igdb_credentials() {
        let client = IgdbClient::new(IgdbConfig {
            base_url: config.igdb_base_url().to_string(),
            token_url: config.igdb_token_url().to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            connect_timeout: config.collector_connect_timeout(),
            total_timeout: config.collector_total_timeout(),
            retry: config.retry_config(),
        })
        .context("failed to build IGDB client")?;
        builder = builder.with_collector(Arc::new(IgdbCollector::new(Arc::new(client))));
    } else {
        warn!("IGDB_CLIENT_ID/IGDB_CLIENT_SECRET are not set, game releases will be skipped");
    }

    let pipeline = builder.build();
    info!(collectors = ?pipeline.collector_names(), "ranking pipeline assembled");
    Ok(pipeline)
}

/// 設定値から基準日 `today` のリクエストを作る。
#[must_use]
pub fn default_request(config: &Config, today: NaiveDate) -> RankRequest {
    let request = RankRequest::around(
        today,
        config.date_range_backward_days(),
        config.date_range_forward_days(),
        config.score_threshold(),
    );
    match config.max_results() {
        Some(limit) => request.with_max_results(limit.get()),
        None => request,
    }
}

/// 設定で有効なら適応リトライの方針を返す。
#[must_use]
pub fn adaptive_policy(config: &Config) -> Option<AdaptivePolicy> {
    config
        .adaptive_enabled()
        .then(|| config.adaptive_policy())
}

#[must_use]
pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state).layer(TraceLayer::new_for_http())
}
