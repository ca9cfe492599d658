/// Prometheusメトリクス定義。
use prometheus::{
    Counter, CounterVec, Histogram, Registry, register_counter_vec_with_registry,
    register_counter_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub releases_fetched: Counter,
    pub releases_dropped: Counter,
    pub releases_qualified: Counter,
    pub ranking_runs: Counter,
    pub ranking_attempts: Counter,
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub collector_failures: CounterVec,

    // ヒストグラム
    pub collector_duration: Histogram,
    pub run_duration: Histogram,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同じレジストリに同名のメトリクスが登録済みの場合はエラーを返す。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            releases_fetched: register_counter_with_registry!(
                "release_radar_releases_fetched_total",
                "Total number of raw releases returned by collectors",
                registry
            )?,
            releases_dropped: register_counter_with_registry!(
                "release_radar_releases_dropped_total",
                "Total number of releases dropped during normalization or scoring",
                registry
            )?,
            releases_qualified: register_counter_with_registry!(
                "release_radar_releases_qualified_total",
                "Total number of releases that met the score threshold",
                registry
            )?,
            ranking_runs: register_counter_with_registry!(
                "release_radar_ranking_runs_total",
                "Total number of ranking runs",
                registry
            )?,
            ranking_attempts: register_counter_with_registry!(
                "release_radar_ranking_attempts_total",
                "Total number of ranking attempts including adaptive retries",
                registry
            )?,
            cache_hits: register_counter_with_registry!(
                "release_radar_cache_hits_total",
                "Collector calls served from the response cache",
                registry
            )?,
            cache_misses: register_counter_with_registry!(
                "release_radar_cache_misses_total",
                "Collector calls that reached the upstream catalog",
                registry
            )?,
            collector_failures: register_counter_vec_with_registry!(
                "release_radar_collector_failures_total",
                "Collector calls that failed or timed out",
                &["collector"],
                registry
            )?,
            collector_duration: register_histogram_with_registry!(
                "release_radar_collector_duration_seconds",
                "Duration of a single collector call",
                registry
            )?,
            run_duration: register_histogram_with_registry!(
                "release_radar_run_duration_seconds",
                "Duration of a ranking run including adaptive retries",
                registry
            )?,
        })
    }

    /// 独立したレジストリに登録されたメトリクスを作る。テストやCLIで使う。
    ///
    /// # Errors
    /// [`Metrics::new`] と同じ。
    pub fn detached() -> Result<Self, prometheus::Error> {
        Self::new(Arc::new(Registry::new()))
    }
}
