use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    app::{AppState, default_request},
    pipeline::{
        RankRequest,
        record::MediaType,
        window::DateWindow,
    },
    util::time::today,
};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReleasesQuery {
    threshold: Option<f64>,
    max_results: Option<usize>,
    backward_days: Option<u32>,
    forward_days: Option<u32>,
    adaptive: Option<bool>,
    media_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_request(message: impl Into<String>) -> axum::response::Response {
    let body = Json(ErrorResponse {
        error: message.into(),
    });
    (StatusCode::BAD_REQUEST, body).into_response()
}

/// 設定値にクエリの上書きを重ねてリクエストを作る。
fn build_request(state: &AppState, query: &ReleasesQuery) -> Result<RankRequest, String> {
    let config = state.config();
    let reference = today();
    let mut request = default_request(config, reference);

    if query.backward_days.is_some() || query.forward_days.is_some() {
        request.window = DateWindow::around(
            reference,
            query
                .backward_days
                .unwrap_or_else(|| config.date_range_backward_days()),
            query
                .forward_days
                .unwrap_or_else(|| config.date_range_forward_days()),
        );
    }
    if let Some(threshold) = query.threshold {
        request.score_threshold = threshold;
    }
    if let Some(limit) = query.max_results {
        request.max_results = Some(limit);
    }
    if let Some(raw) = query.media_type.as_deref() {
        let media_type = raw
            .parse::<MediaType>()
            .map_err(|_| format!("unknown media_type {raw:?}: expected movie, tv or game"))?;
        request = request.with_media_type(media_type);
    }

    Ok(request)
}

pub(crate) async fn list_releases(
    State(state): State<AppState>,
    query: Result<Query<ReleasesQuery>, QueryRejection>,
) -> impl IntoResponse {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let request = match build_request(&state, &query) {
        Ok(request) => request,
        Err(message) => return bad_request(message),
    };

    let adaptive = query
        .adaptive
        .unwrap_or_else(|| state.config().adaptive_enabled());
    let pipeline = state.pipeline();
    let outcome = if adaptive {
        pipeline
            .rank_adaptive(&request, &state.config().adaptive_policy())
            .await
    } else {
        pipeline.rank(&request).await
    };

    match outcome {
        Ok(ranked) => {
            if ranked.all_collectors_failed() {
                warn!(run_id = %ranked.run_id, "every collector failed during ranking");
            }
            info!(
                run_id = %ranked.run_id,
                releases = ranked.releases.len(),
                attempts = ranked.attempts,
                adaptive,
                "ranking served"
            );
            (StatusCode::OK, Json(ranked)).into_response()
        }
        Err(error) => bad_request(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{body::Body, http::Request, http::StatusCode};
    use chrono::Duration;
    use tower::ServiceExt;

    use crate::{
        app::{ComponentRegistry, build_router},
        config::Config,
        observability::Telemetry,
        pipeline::{
            RankingPipeline,
            cache::ResponseCache,
            collect::ReleaseCollector,
            record::{MediaType, RawRelease},
            window::DateWindow,
        },
        util::{error::CollectorError, time::today},
    };

    struct FixedCollector {
        releases: Vec<RawRelease>,
    }

    #[async_trait]
    impl ReleaseCollector for FixedCollector {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn get_releases(
            &self,
            media_type: Option<MediaType>,
            _window: &DateWindow,
            _cache: Option<&ResponseCache>,
        ) -> Result<Vec<RawRelease>, CollectorError> {
            Ok(self
                .releases
                .iter()
                .filter(|raw| {
                    media_type.is_none_or(|wanted| raw.media_type.as_deref() == Some(wanted.as_str()))
                })
                .cloned()
                .collect())
        }
    }

    fn date_from_today(days: i64) -> String {
        (today() + Duration::days(days))
            .format("%Y-%m-%d")
            .to_string()
    }

    fn app_with(collectors: Vec<Arc<dyn ReleaseCollector>>) -> axum::Router {
        let telemetry = Telemetry::without_tracing().expect("telemetry");
        let mut builder = RankingPipeline::builder().with_metrics(telemetry.metrics_arc());
        for collector in collectors {
            builder = builder.with_collector(collector);
        }
        let registry = ComponentRegistry::assemble(Config::default(), telemetry, builder.build());
        build_router(registry)
    }

    fn fixture_app() -> axum::Router {
        app_with(vec![Arc::new(FixedCollector {
            releases: vec![
                RawRelease::new(MediaType::Game, "Big Game", date_from_today(0))
                    .with_popularity(100.0)
                    .with_platforms(["PC"]),
                RawRelease::new(MediaType::Movie, "Quiet Movie", date_from_today(5))
                    .with_popularity(10.0),
            ],
        })])
    }

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::get(uri).body(Body::empty()).expect("request");
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&body).expect("json body");
        (status, json)
    }

    #[tokio::test]
    async fn releases_endpoint_returns_ranked_payload() {
        let (status, json) = get_json(fixture_app(), "/v1/releases").await;

        assert_eq!(status, StatusCode::OK);
        let releases = json["releases"].as_array().expect("releases array");
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0]["title"], "Big Game");
        assert_eq!(releases[0]["media_type"], "game");
        assert_eq!(json["attempts"], 1);
        assert_eq!(json["stats"]["fetched"], 2);
    }

    #[tokio::test]
    async fn query_overrides_threshold_and_media_type() {
        let (status, json) =
            get_json(fixture_app(), "/v1/releases?threshold=0&media_type=Movie&adaptive=false").await;

        assert_eq!(status, StatusCode::OK);
        let releases = json["releases"].as_array().expect("releases array");
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0]["title"], "Quiet Movie");
        assert_eq!(json["score_threshold"], 0.0);
    }

    #[tokio::test]
    async fn unknown_media_type_is_rejected() {
        let (status, json) = get_json(fixture_app(), "/v1/releases?media_type=podcast").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            json["error"]
                .as_str()
                .is_some_and(|message| message.contains("podcast"))
        );
    }

    #[tokio::test]
    async fn malformed_query_values_get_a_json_error_body() {
        for uri in [
            "/v1/releases?threshold=abc",
            "/v1/releases?backward_days=-1",
            "/v1/releases?adaptive=sometimes",
        ] {
            let (status, json) = get_json(fixture_app(), uri).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(
                json["error"]
                    .as_str()
                    .is_some_and(|message| !message.is_empty()),
                "{uri}: {json}"
            );
        }
    }

    #[tokio::test]
    async fn zero_max_results_is_an_input_error() {
        let (status, json) = get_json(fixture_app(), "/v1/releases?max_results=0").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "max_results must be greater than zero");
    }

    #[tokio::test]
    async fn readiness_reports_missing_collectors() {
        let (status, json) = get_json(app_with(Vec::new()), "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "degraded");

        let (status, json) = get_json(fixture_app(), "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["collectors"][0], "fixed");
    }

    #[tokio::test]
    async fn metrics_endpoint_exposes_run_counters() {
        let app = fixture_app();
        let (status, _) = get_json(app.clone(), "/v1/releases").await;
        assert_eq!(status, StatusCode::OK);

        let request = Request::get("/metrics").body(Body::empty()).expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let text = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(text.contains("release_radar_ranking_runs_total 1"));
    }
}
