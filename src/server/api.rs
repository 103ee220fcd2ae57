use crate::error::AppError;
use crate::models::Period;
use crate::server::AppState;
use crate::services::{CollectOutcome, NotifyOutcome};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

fn error_response(err: AppError) -> Response {
    let status = match &err {
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::InvalidInput(_)
        | AppError::InvalidSnapshot(_)
        | AppError::ConfigValidation(_)
        | AppError::Parse(_) => StatusCode::BAD_REQUEST,
        AppError::Network(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    period: Option<String>,
}

fn parse_period(query: &PeriodQuery) -> Result<Period, Response> {
    match query.period.as_deref() {
        Some(raw) => Period::from_str(raw).map_err(|e| {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))).into_response()
        }),
        None => Ok(Period::default()),
    }
}

/// GET /api/games
pub async fn list_games(State(state): State<AppState>) -> Response {
    match state.store.list_games().await {
        Ok(games) => Json(games).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterGameRequest {
    id: String,
    name: Option<String>,
    history_low_price: Option<f64>,
}

/// POST /api/games - register (or re-register) a game and collect once
/// right away.
pub async fn register_game(
    State(state): State<AppState>,
    Json(body): Json<RegisterGameRequest>,
) -> Response {
    let name = body.name.unwrap_or_else(|| "Unnamed".to_string());
    match state
        .store
        .register_game(&body.id, &name, body.history_low_price)
        .await
    {
        Ok(game) => {
            let collector = state.collector.clone();
            let game_id = game.id.clone();
            tokio::spawn(async move {
                if let Err(e) = collector.collect(&game_id).await {
                    warn!(game_id = %game_id, error = %e, "Initial collection failed");
                }
            });
            (StatusCode::OK, Json(json!({ "success": true, "game": game }))).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// DELETE /api/games/{id} - cascading delete.
pub async fn delete_game(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.delete_game(&id).await {
        Ok(deleted) => {
            info!(game_id = %id, deleted, "Game deleted");
            Json(json!({ "success": true, "deleted": deleted })).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryLowRequest {
    history_low_price: Option<f64>,
}

/// PUT /api/games/{id}/history-low
pub async fn set_history_low(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<HistoryLowRequest>,
) -> Response {
    match state.store.set_history_low(&id, body.history_low_price).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSettingsRequest {
    push_enabled: bool,
}

/// PUT /api/games/{id}/push-settings
pub async fn set_push_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PushSettingsRequest>,
) -> Response {
    match state.store.set_push_enabled(&id, body.push_enabled).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/prices/{id}?period=day|week|month|quarter|year|all
pub async fn get_prices(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Response {
    let period = match parse_period(&query) {
        Ok(period) => period,
        Err(response) => return response,
    };
    match state
        .store
        .snapshots_since(&id, period.cutoff(Utc::now()))
        .await
    {
        Ok(snapshots) => Json(snapshots).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/stats/{id}?period=... - window stats plus the latest snapshot.
/// `stats: null` means no data in the window, not zeros.
pub async fn get_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Response {
    let period = match parse_period(&query) {
        Ok(period) => period,
        Err(response) => return response,
    };

    let stats = match state.aggregator.stats(&id, period).await {
        Ok(stats) => stats,
        Err(e) => return error_response(e),
    };
    match state.store.latest_snapshot(&id).await {
        Ok(latest) => Json(json!({ "stats": stats, "latest": latest })).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/analysis/{id} - rollups, price distribution and volatility.
pub async fn get_analysis(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.aggregator.analysis(&id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/config - secrets masked to a trailing-suffix-visible form.
pub async fn get_config(State(state): State<AppState>) -> Response {
    let redacted = state.config.redacted().await;
    let running = state.scheduler.collection_running().await;
    match serde_json::to_value(&redacted) {
        Ok(mut value) => {
            if let Some(object) = value.as_object_mut() {
                object.insert(
                    "collectionJob".to_string(),
                    json!(if running { "running" } else { "stopped" }),
                );
            }
            Json(value).into_response()
        }
        Err(e) => error_response(AppError::from(e)),
    }
}

/// PUT /api/config - field-by-field patch; independently-valid fields apply
/// even when siblings are rejected, and affected jobs are recreated.
pub async fn update_config(
    State(state): State<AppState>,
    Json(patch): Json<crate::config::ConfigPatch>,
) -> Response {
    match state.config.apply(patch).await {
        Ok(report) => {
            if report.restart_collection {
                state.scheduler.restart_collection().await;
            }
            if report.restart_report {
                state.scheduler.restart_report().await;
            }
            Json(json!({
                "success": report.rejected.is_empty(),
                "applied": report.applied,
                "rejected": report.rejected,
            }))
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /api/collect - collect every registered game now.
pub async fn collect_all(State(state): State<AppState>) -> Response {
    let stats = state.collector.collect_all().await;
    Json(json!({ "success": true, "cycle": stats })).into_response()
}

/// POST /api/collect/{id} - one-off collection for a single game.
pub async fn collect_one(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.collector.collect(&id).await {
        Ok(CollectOutcome::Collected(summary)) => {
            Json(json!({ "success": true, "data": summary })).into_response()
        }
        Ok(CollectOutcome::Empty) => {
            Json(json!({ "success": true, "data": null })).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /api/cleanup - on-demand retention purge.
pub async fn cleanup(State(state): State<AppState>) -> Response {
    let retention_days = state.config.snapshot().await.data_retention_days;
    let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
    match state.store.purge_older_than(cutoff).await {
        Ok(deleted) => Json(json!({ "success": true, "deleted": deleted })).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestNotifyRequest {
    endpoints: Option<Vec<String>>,
}

fn notify_response(outcome: NotifyOutcome) -> Response {
    let success = outcome.delivered();
    let reason = outcome.reason();
    match outcome {
        NotifyOutcome::Sent(report) => {
            Json(json!({ "success": success, "reason": reason, "report": report }))
                .into_response()
        }
        _ => Json(json!({ "success": false, "reason": reason })).into_response(),
    }
}

/// POST /api/notify/test - test message, optionally to not-yet-saved
/// endpoints supplied in the body.
pub async fn notify_test(
    State(state): State<AppState>,
    body: Option<Json<TestNotifyRequest>>,
) -> Response {
    let endpoints = body.and_then(|Json(request)| request.endpoints);
    let outcome = state.alerts.test_push(endpoints).await;
    notify_response(outcome)
}

/// POST /api/notify/daily-report - trigger the report path now.
pub async fn notify_daily_report(State(state): State<AppState>) -> Response {
    match state.alerts.daily_report().await {
        Ok(outcome) => notify_response(outcome),
        Err(e) => error_response(e),
    }
}

/// GET /api/db-stats
pub async fn db_stats(State(state): State<AppState>) -> Response {
    let retention_days = state.config.snapshot().await.data_retention_days;
    match state.store.db_stats().await {
        Ok(stats) => match serde_json::to_value(&stats) {
            Ok(mut value) => {
                if let Some(object) = value.as_object_mut() {
                    object.insert("dataRetentionDays".to_string(), json!(retention_days));
                }
                Json(value).into_response()
            }
            Err(e) => error_response(AppError::from(e)),
        },
        Err(e) => error_response(e),
    }
}
