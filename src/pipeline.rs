use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::observability::metrics::Metrics;
use crate::util::error::{CollectorError, InputError, classify_collector_error};

pub mod cache;
pub mod collect;
pub mod dedup;
pub mod normalize;
pub mod record;
pub mod score;
pub mod select;
pub mod window;

use cache::ResponseCache;
use collect::ReleaseCollector;
use normalize::normalize_batch;
use record::{MediaType, RawRelease, ReleaseRecord};
use score::ExcitementScorer;
use window::DateWindow;

/// 1コレクタ呼び出し（全ページ・全リトライ込み）の既定の上限時間。
pub const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(90);

/// 1回のランキング実行への入力。
#[derive(Debug, Clone, PartialEq)]
pub struct RankRequest {
    /// リリースまでの日数を数える基準日。
    pub reference_date: NaiveDate,
    pub window: DateWindow,
    pub score_threshold: f64,
    pub max_results: Option<usize>,
    pub media_type: Option<MediaType>,
}

impl RankRequest {
    #[must_use]
    pub fn new(reference_date: NaiveDate, window: DateWindow, score_threshold: f64) -> Self {
        Self {
            reference_date,
            window,
            score_threshold,
            max_results: None,
            media_type: None,
        }
    }

    /// 基準日の前後 `backward_days` / `forward_days` 日を範囲とするリクエスト。
    #[must_use]
    pub fn around(
        reference_date: NaiveDate,
        backward_days: u32,
        forward_days: u32,
        score_threshold: f64,
    ) -> Self {
        Self::new(
            reference_date,
            DateWindow::around(reference_date, backward_days, forward_days),
            score_threshold,
        )
    }

    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    #[must_use]
    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    /// # Errors
    /// しきい値が有限でない場合、`max_results` が0の場合は [`InputError`] を返す。
    pub fn validate(&self) -> Result<(), InputError> {
        if !self.score_threshold.is_finite() {
            return Err(InputError::InvalidThreshold(self.score_threshold));
        }
        if self.max_results == Some(0) {
            return Err(InputError::ZeroMaxResults);
        }
        if self.window.start() > self.window.end() {
            return Err(InputError::InvertedWindow {
                start: self.window.start(),
                end: self.window.end(),
            });
        }
        Ok(())
    }
}

/// 結果が空だったときに範囲を広げ、しきい値を下げて再実行する方針。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptivePolicy {
    /// 初回を含む最大試行回数
    pub max_attempts: u32,
    pub window_step_days: u32,
    pub threshold_step: f64,
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_step_days: 7,
            threshold_step: 5.0,
        }
    }
}

impl AdaptivePolicy {
    /// # Errors
    /// 試行回数が0の場合、しきい値の刻みが有限でないか負の場合は [`InputError`] を返す。
    pub fn validate(&self) -> Result<(), InputError> {
        if self.max_attempts == 0 {
            return Err(InputError::ZeroAttempts);
        }
        if !self.threshold_step.is_finite() {
            return Err(InputError::InvalidThreshold(self.threshold_step));
        }
        if self.threshold_step < 0.0 {
            return Err(InputError::NegativeThresholdStep(self.threshold_step));
        }
        Ok(())
    }
}

/// しきい値を `step` だけ下げる。0未満には下げない（元から負なら据え置き）。
fn relax_threshold(threshold: f64, step: f64) -> f64 {
    (threshold - step).max(threshold.min(0.0))
}

/// 1回の試行の集計。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub collectors_total: usize,
    pub collectors_failed: usize,
    pub fetched: usize,
    pub dropped: usize,
    pub unique: usize,
    pub qualified: usize,
}

/// ランキングの結果。`window` と `score_threshold` は最後の試行で使われた値。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedReleases {
    pub run_id: Uuid,
    pub releases: Vec<ReleaseRecord>,
    pub window: DateWindow,
    pub score_threshold: f64,
    pub attempts: u32,
    pub stats: RunStats,
}

impl RankedReleases {
    /// コレクタが1つ以上登録されていて、そのすべてが失敗した場合に真。
    #[must_use]
    pub fn all_collectors_failed(&self) -> bool {
        self.stats.collectors_total > 0 && self.stats.collectors_failed == self.stats.collectors_total
    }
}

/// 収集・正規化・重複排除・スコア付け・選別を順に実行するパイプライン。
pub struct RankingPipeline {
    collectors: Vec<Arc<dyn ReleaseCollector>>,
    scorer: ExcitementScorer,
    cache: Option<Arc<ResponseCache>>,
    collector_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl RankingPipeline {
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    #[must_use]
    pub fn collector_count(&self) -> usize {
        self.collectors.len()
    }

    #[must_use]
    pub fn collector_names(&self) -> Vec<&str> {
        self.collectors.iter().map(|collector| collector.name()).collect()
    }

    /// 1回だけランキングを実行する。
    ///
    /// # Errors
    /// 入力が不正な場合は、コレクタを呼び出す前に [`InputError`] を返す。
    pub async fn rank(&self, request: &RankRequest) -> Result<RankedReleases, InputError> {
        request.validate()?;
        let started = Instant::now();
        let run_id = Uuid::new_v4();

        let (releases, stats) = self.run_attempt(run_id, 1, request).await;
        self.record_run(started);

        Ok(RankedReleases {
            run_id,
            releases,
            window: request.window,
            score_threshold: request.score_threshold,
            attempts: 1,
            stats,
        })
    }

    /// 結果が空の間、範囲を広げてしきい値を下げながら再実行する。
    ///
    /// 試行回数は `policy.max_attempts` を超えない。最後まで何も残らなかった場合は
    /// 空の結果を返す。
    ///
    /// # Errors
    /// 入力または方針が不正な場合は、コレクタを呼び出す前に [`InputError`] を返す。
    pub async fn rank_adaptive(
        &self,
        request: &RankRequest,
        policy: &AdaptivePolicy,
    ) -> Result<RankedReleases, InputError> {
        request.validate()?;
        policy.validate()?;
        let started = Instant::now();
        let run_id = Uuid::new_v4();

        let mut current = request.clone();
        let mut attempt = 1;
        loop {
            let (releases, stats) = self.run_attempt(run_id, attempt, &current).await;

            if !releases.is_empty() || attempt >= policy.max_attempts {
                if releases.is_empty() {
                    info!(
                        run_id = %run_id,
                        attempts = attempt,
                        "no release qualified after all adaptive attempts"
                    );
                }
                self.record_run(started);
                return Ok(RankedReleases {
                    run_id,
                    releases,
                    window: current.window,
                    score_threshold: current.score_threshold,
                    attempts: attempt,
                    stats,
                });
            }

            current.window = current.window.widen(policy.window_step_days);
            current.score_threshold =
                relax_threshold(current.score_threshold, policy.threshold_step);
            attempt += 1;

            info!(
                run_id = %run_id,
                attempt,
                start = %current.window.start(),
                end = %current.window.end(),
                score_threshold = current.score_threshold,
                "nothing qualified, widening window and lowering threshold"
            );
        }
    }

    async fn run_attempt(
        &self,
        run_id: Uuid,
        attempt: u32,
        request: &RankRequest,
    ) -> (Vec<ReleaseRecord>, RunStats) {
        if let Some(metrics) = &self.metrics {
            metrics.ranking_attempts.inc();
        }
        debug!(
            run_id = %run_id,
            attempt,
            start = %request.window.start(),
            end = %request.window.end(),
            score_threshold = request.score_threshold,
            "ranking attempt started"
        );

        let (raws, collectors_failed) = self
            .collect_all(run_id, request.media_type, &request.window)
            .await;
        let fetched = raws.len();

        let normalized = normalize_batch(raws);
        let unique = dedup::dedupe(normalized.records);
        let unique_count = unique.len();
        let scored = self.scorer.score_all(unique, request.reference_date);
        let dropped = normalized.dropped + scored.dropped;
        let releases =
            select::filter_and_rank(scored.records, request.score_threshold, request.max_results);

        let stats = RunStats {
            collectors_total: self.collectors.len(),
            collectors_failed,
            fetched,
            dropped,
            unique: unique_count,
            qualified: releases.len(),
        };

        if let Some(metrics) = &self.metrics {
            metrics.releases_fetched.inc_by(as_count(fetched));
            metrics.releases_dropped.inc_by(as_count(dropped));
            metrics.releases_qualified.inc_by(as_count(releases.len()));
        }

        info!(
            run_id = %run_id,
            attempt,
            collectors = stats.collectors_total,
            collectors_failed,
            fetched,
            dropped,
            unique = unique_count,
            qualified = stats.qualified,
            "ranking attempt completed"
        );

        (releases, stats)
    }

    /// すべてのコレクタを並行に呼び出し、登録順に結果を連結する。
    ///
    /// 失敗・タイムアウトしたコレクタはログに残して0件として扱う。
    async fn collect_all(
        &self,
        run_id: Uuid,
        media_type: Option<MediaType>,
        window: &DateWindow,
    ) -> (Vec<RawRelease>, usize) {
        let cache = self.cache.as_deref();
        let calls = self.collectors.iter().map(|collector| async move {
            let started = Instant::now();
            let outcome = tokio::time::timeout(
                self.collector_timeout,
                collector.get_releases(media_type, window, cache),
            )
            .await
            .unwrap_or(Err(CollectorError::Timeout(self.collector_timeout)));
            (collector, outcome, started.elapsed())
        });

        let mut releases = Vec::new();
        let mut failed = 0;
        for (collector, outcome, elapsed) in join_all(calls).await {
            if let Some(metrics) = &self.metrics {
                metrics.collector_duration.observe(elapsed.as_secs_f64());
            }
            match outcome {
                Ok(batch) => {
                    debug!(
                        run_id = %run_id,
                        collector = collector.name(),
                        count = batch.len(),
                        elapsed_ms = elapsed.as_millis(),
                        "collector returned releases"
                    );
                    releases.extend(batch);
                }
                Err(error) => {
                    failed += 1;
                    warn!(
                        run_id = %run_id,
                        collector = collector.name(),
                        kind = ?classify_collector_error(&error),
                        error = %error,
                        "collector failed, continuing without its releases"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics
                            .collector_failures
                            .with_label_values(&[collector.name()])
                            .inc();
                    }
                }
            }
        }

        (releases, failed)
    }

    fn record_run(&self, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.ranking_runs.inc();
            metrics.run_duration.observe(started.elapsed().as_secs_f64());
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_count(value: usize) -> f64 {
    value as f64
}

pub struct PipelineBuilder {
    collectors: Vec<Arc<dyn ReleaseCollector>>,
    scorer: ExcitementScorer,
    cache: Option<Arc<ResponseCache>>,
    collector_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collectors: Vec::new(),
            scorer: ExcitementScorer::default(),
            cache: None,
            collector_timeout: DEFAULT_COLLECTOR_TIMEOUT,
            metrics: None,
        }
    }

    /// コレクタを登録する。結果は登録順に連結される。
    #[must_use]
    pub fn with_collector(mut self, collector: Arc<dyn ReleaseCollector>) -> Self {
        self.collectors.push(collector);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_collector_timeout(mut self, timeout: Duration) -> Self {
        self.collector_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn build(self) -> RankingPipeline {
        RankingPipeline {
            collectors: self.collectors,
            scorer: self.scorer,
            cache: self.cache,
            collector_timeout: self.collector_timeout,
            metrics: self.metrics,
        }
    }
}
