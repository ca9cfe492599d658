//! フェイクコレクタを使ったパイプライン全体の結合テスト。
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use release_radar::{
    pipeline::{
        AdaptivePolicy, RankRequest, RankingPipeline,
        cache::ResponseCache,
        collect::ReleaseCollector,
        record::{MediaType, RawRelease},
        window::DateWindow,
    },
    util::error::{CollectorError, InputError},
};

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).expect("valid date")
}

fn days_from_reference(days: i64) -> String {
    (reference_date() + Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

/// 固定の結果を返し、呼び出し回数を数えるコレクタ。
struct StaticCollector {
    name: &'static str,
    releases: Vec<RawRelease>,
    calls: AtomicUsize,
}

impl StaticCollector {
    fn new(name: &'static str, releases: Vec<RawRelease>) -> Arc<Self> {
        Arc::new(Self {
            name,
            releases,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseCollector for StaticCollector {
    fn name(&self) -> &str {
        self.name
    }

    async fn get_releases(
        &self,
        _media_type: Option<MediaType>,
        _window: &DateWindow,
        _cache: Option<&ResponseCache>,
    ) -> Result<Vec<RawRelease>, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.releases.clone())
    }
}

struct FailingCollector;

#[async_trait]
impl ReleaseCollector for FailingCollector {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get_releases(
        &self,
        _media_type: Option<MediaType>,
        _window: &DateWindow,
        _cache: Option<&ResponseCache>,
    ) -> Result<Vec<RawRelease>, CollectorError> {
        Err(CollectorError::Auth("credentials rejected".to_string()))
    }
}

fn pipeline_with(collectors: Vec<Arc<dyn ReleaseCollector>>) -> RankingPipeline {
    collectors
        .into_iter()
        .fold(RankingPipeline::builder(), |builder, collector| {
            builder.with_collector(collector)
        })
        .build()
}

#[tokio::test]
async fn documented_scores_for_game_and_movie() {
    let collector = StaticCollector::new(
        "static",
        vec![
            RawRelease::new(MediaType::Game, "Launch Day", days_from_reference(0))
                .with_popularity(90.0),
            RawRelease::new(MediaType::Movie, "Next Week", days_from_reference(10)),
        ],
    );
    let pipeline = pipeline_with(vec![collector]);

    let ranked = pipeline
        .rank(&RankRequest::around(reference_date(), 14, 14, 0.0))
        .await
        .expect("valid request");

    let scores: Vec<(&str, f64)> = ranked
        .releases
        .iter()
        .map(|release| (release.title.as_str(), release.score()))
        .collect();
    assert_eq!(scores.len(), 2);
    assert_eq!(scores[0].0, "Launch Day");
    assert!((scores[0].1 - 79.0).abs() < 1e-9);
    assert_eq!(scores[1].0, "Next Week");
    assert!((scores[1].1 - 51.0).abs() < 1e-9);
}

#[tokio::test]
async fn one_failing_collector_does_not_abort_the_run() {
    let healthy = StaticCollector::new(
        "healthy",
        vec![RawRelease::new(MediaType::Game, "Survivor", days_from_reference(0)).with_popularity(100.0)],
    );
    let pipeline = pipeline_with(vec![Arc::new(FailingCollector), healthy]);

    let ranked = pipeline
        .rank(&RankRequest::around(reference_date(), 7, 7, 70.0))
        .await
        .expect("valid request");

    assert_eq!(ranked.stats.collectors_total, 2);
    assert_eq!(ranked.stats.collectors_failed, 1);
    assert!(!ranked.all_collectors_failed());
    assert_eq!(ranked.releases.len(), 1);
    assert_eq!(ranked.releases[0].title, "Survivor");
}

#[tokio::test]
async fn all_collectors_failing_yields_empty_result() {
    let pipeline = pipeline_with(vec![Arc::new(FailingCollector), Arc::new(FailingCollector)]);

    let ranked = pipeline
        .rank(&RankRequest::around(reference_date(), 7, 7, 0.0))
        .await
        .expect("valid request");

    assert!(ranked.releases.is_empty());
    assert!(ranked.all_collectors_failed());
}

#[tokio::test]
async fn ranking_is_descending_stable_and_thresholded() {
    // 同じ人気度・同じ日付の映画は同点になる
    let collector = StaticCollector::new(
        "static",
        vec![
            RawRelease::new(MediaType::Movie, "Tie A", days_from_reference(1)).with_popularity(80.0),
            RawRelease::new(MediaType::Game, "Top", days_from_reference(0)).with_popularity(100.0),
            RawRelease::new(MediaType::Movie, "Tie B", days_from_reference(1)).with_popularity(80.0),
            RawRelease::new(MediaType::Tv, "Too Old", days_from_reference(-60)).with_popularity(5.0),
            RawRelease::new(MediaType::Movie, "Tie C", days_from_reference(1)).with_popularity(80.0),
        ],
    );
    let pipeline = pipeline_with(vec![collector]);

    let ranked = pipeline
        .rank(&RankRequest::around(reference_date(), 90, 90, 40.0))
        .await
        .expect("valid request");

    let titles: Vec<&str> = ranked.releases.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Top", "Tie A", "Tie B", "Tie C"]);
    assert!(
        ranked
            .releases
            .windows(2)
            .all(|pair| pair[0].score() >= pair[1].score())
    );
    assert!(ranked.releases.iter().all(|r| r.score() >= 40.0));
}

#[tokio::test]
async fn duplicates_across_collectors_keep_the_later_record() {
    let first = StaticCollector::new(
        "first",
        vec![
            RawRelease::new(MediaType::Movie, "Shared", days_from_reference(0)).with_popularity(10.0),
            RawRelease::new(MediaType::Movie, "Solo", days_from_reference(0)).with_popularity(5.0),
        ],
    );
    let second = StaticCollector::new(
        "second",
        vec![RawRelease::new(MediaType::Movie, "Shared", days_from_reference(0)).with_popularity(90.0)],
    );
    let pipeline = pipeline_with(vec![first, second]);

    let ranked = pipeline
        .rank(&RankRequest::around(reference_date(), 7, 7, 0.0))
        .await
        .expect("valid request");

    assert_eq!(ranked.stats.fetched, 3);
    assert_eq!(ranked.stats.unique, 2);
    let shared = ranked
        .releases
        .iter()
        .find(|r| r.title == "Shared")
        .expect("shared release present");
    assert_eq!(shared.popularity, Some(90.0));
}

#[tokio::test]
async fn malformed_records_are_dropped_without_failing_the_run() {
    let mut undated = RawRelease::new(MediaType::Game, "Undated", "");
    undated.release_date = None;
    let collector = StaticCollector::new(
        "static",
        vec![
            undated,
            RawRelease::new(MediaType::Game, "Bad Date", "someday"),
            RawRelease::new(MediaType::Game, "Good", days_from_reference(0)).with_popularity(60.0),
        ],
    );
    let pipeline = pipeline_with(vec![collector]);

    let ranked = pipeline
        .rank(&RankRequest::around(reference_date(), 7, 7, 0.0))
        .await
        .expect("valid request");

    assert_eq!(ranked.stats.dropped, 2);
    assert_eq!(ranked.releases.len(), 1);
    assert_eq!(ranked.releases[0].title, "Good");
}

#[tokio::test]
async fn adaptive_retry_stops_after_max_attempts() {
    // 0+30+2=32点の映画は、しきい値が50まで下がっても残らない
    let collector = StaticCollector::new(
        "static",
        vec![RawRelease::new(MediaType::Movie, "Obscure", days_from_reference(0)).with_popularity(0.0)],
    );
    let pipeline = pipeline_with(vec![Arc::clone(&collector) as Arc<dyn ReleaseCollector>]);

    let ranked = pipeline
        .rank_adaptive(
            &RankRequest::around(reference_date(), 7, 7, 70.0),
            &AdaptivePolicy::default(),
        )
        .await
        .expect("valid request");

    assert!(ranked.releases.is_empty());
    assert_eq!(ranked.attempts, 5);
    assert_eq!(collector.calls(), 5);
    assert!((ranked.score_threshold - 50.0).abs() < f64::EPSILON);
    assert_eq!(ranked.window, DateWindow::around(reference_date(), 35, 35));
}

#[tokio::test]
async fn invalid_input_fails_before_any_collector_call() {
    let collector = StaticCollector::new("static", Vec::new());
    let pipeline = pipeline_with(vec![Arc::clone(&collector) as Arc<dyn ReleaseCollector>]);

    let error = pipeline
        .rank(&RankRequest::around(reference_date(), 7, 7, f64::INFINITY))
        .await
        .expect_err("non-finite threshold is rejected");
    assert!(matches!(error, InputError::InvalidThreshold(_)));

    let error = pipeline
        .rank_adaptive(
            &RankRequest::around(reference_date(), 7, 7, 70.0).with_max_results(0),
            &AdaptivePolicy::default(),
        )
        .await
        .expect_err("zero max_results is rejected");
    assert_eq!(error, InputError::ZeroMaxResults);

    assert_eq!(collector.calls(), 0);
}

#[tokio::test]
async fn max_results_truncates_after_ranking() {
    let collector = StaticCollector::new(
        "static",
        (0..10_u32)
            .map(|i| {
                RawRelease::new(MediaType::Game, format!("Game {i}"), days_from_reference(0))
                    .with_popularity(f64::from(i) * 10.0)
            })
            .collect(),
    );
    let pipeline = pipeline_with(vec![collector]);

    let ranked = pipeline
        .rank(&RankRequest::around(reference_date(), 7, 7, 0.0).with_max_results(3))
        .await
        .expect("valid request");

    let titles: Vec<&str> = ranked.releases.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Game 9", "Game 8", "Game 7"]);
}
