use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::app::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct HealthReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    collectors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// コレクタが1つも登録されていない場合はランキングできないので503を返す。
pub(crate) async fn ready(
    State(state): State<AppState>,
) -> Result<Json<HealthReport>, (StatusCode, Json<HealthReport>)> {
    state.telemetry().record_ready_check();

    let collectors: Vec<String> = state
        .pipeline()
        .collector_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    if collectors.is_empty() {
        warn!("readiness check failed: no collectors are configured");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReport {
                status: "degraded",
                collectors,
                detail: Some("no collectors configured".to_string()),
            }),
        ));
    }

    Ok(Json(HealthReport {
        status: "ready",
        collectors,
        detail: None,
    }))
}

pub(crate) async fn live(State(state): State<AppState>) -> Json<HealthReport> {
    state.telemetry().record_live_check();
    Json(HealthReport {
        status: "live",
        collectors: Vec::new(),
        detail: None,
    })
}
