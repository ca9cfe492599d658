pub mod metrics;
pub mod tracing;

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Encoder, Registry, TextEncoder};

use self::metrics::Metrics;

/// Telemetry（メトリクスとトレーシング）を管理する構造体。
#[derive(Debug, Clone)]
pub struct Telemetry {
    metrics: Arc<Metrics>,
    registry: Arc<Registry>,
}

impl Telemetry {
    /// トレーシングを初期化し、専用レジストリにメトリクスを登録する。
    ///
    /// # Errors
    /// サブスクライバまたはメトリクスの初期化に失敗した場合はエラーを返す。
    pub fn new(otlp_endpoint: Option<&str>, sampling_ratio: f64) -> Result<Self> {
        tracing::init(otlp_endpoint, sampling_ratio)?;
        Self::without_tracing()
    }

    /// サブスクライバを設定せずにメトリクスだけを用意する。
    ///
    /// # Errors
    /// メトリクスの登録に失敗した場合はエラーを返す。
    pub fn without_tracing() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(
            Metrics::new(Arc::clone(&registry)).context("failed to register metrics")?,
        );
        Ok(Self { metrics, registry })
    }

    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    #[must_use]
    pub fn metrics_arc(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// 準備完了プローブを記録する。
    pub fn record_ready_check(&self) {
        ::tracing::debug!("service ready check recorded");
    }

    /// ライブプローブを記録する。
    pub fn record_live_check(&self) {
        ::tracing::debug!("service live check");
    }

    /// Prometheusメトリクスをレンダリングする。
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_metrics_from_own_registry() {
        let telemetry = Telemetry::without_tracing().expect("telemetry builds");
        telemetry.metrics().ranking_runs.inc();

        let rendered = telemetry.render_prometheus();
        assert!(rendered.contains("release_radar_ranking_runs_total 1"));
    }
}
