use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use joinwave_db::{Database, JoinStore};
use joinwave_detect::{AnalyzeError, WaveParams, analyze};
use joinwave_scanner::{ExportSource, ScanOptions, scan_history};
use joinwave_types::{ConversationHandle, WaveSummary};

use crate::config::Config;

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
    /// Cancelled on shutdown; every scan runs under a child token.
    pub shutdown: CancellationToken,
}

// ── Request/response types ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanRequest {
    pub limit: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct WaveQuery {
    pub window_seconds: Option<f64>,
    pub threshold: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WavesResponse {
    pub conversation_id: i64,
    pub total_joins: usize,
    pub waves: Vec<WaveSummary>,
    pub report: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/conversations/{handle}/scan", post(scan))
        .route("/conversations/{conversation_id}/joins", get(get_joins))
        .route("/conversations/{conversation_id}/waves", get(get_waves))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Scans the exported history of a conversation into the join store.
pub async fn scan(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    body: Bytes,
) -> Response {
    let req: ScanRequest = if body.is_empty() {
        ScanRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        }
    };

    // Re-read exports per scan so newly dropped files are picked up
    let source = match ExportSource::load(&state.config.export_dir).await {
        Ok(source) => source,
        Err(e) => {
            error!("Cannot load exports from {}: {}", state.config.export_dir.display(), e);
            return error_response(StatusCode::SERVICE_UNAVAILABLE, e);
        }
    };

    let options = ScanOptions {
        limit: req.limit.unwrap_or(state.config.scan_limit),
        resolve_concurrency: state.config.resolve_concurrency,
        timeout: req
            .timeout_secs
            .map(Duration::from_secs)
            .or(state.config.scan_timeout),
        cancel: state.shutdown.child_token(),
    };

    let handle = ConversationHandle::parse(&handle);
    match scan_history(&source, state.db.clone(), &handle, &options).await {
        Ok(outcome) => {
            let db = state.db.clone();
            let conversation_id = outcome.conversation_id;
            match tokio::task::spawn_blocking(move || db.count_joins(conversation_id)).await {
                Ok(Ok(total)) => {
                    info!("Conversation {} now holds {} join records", conversation_id, total)
                }
                Ok(Err(e)) => warn!("Failed to count joins for {}: {:#}", conversation_id, e),
                Err(e) => warn!("spawn_blocking join error: {}", e),
            }
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Err(e) => {
            error!("Scan of {} failed: {}", handle, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(e.partial_outcome().clone()),
            )
                .into_response()
        }
    }
}

pub async fn get_joins(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> Result<impl IntoResponse, StatusCode> {
    // Run blocking DB query off the async runtime
    let db = state.db.clone();
    let joins = tokio::task::spawn_blocking(move || db.fetch_ordered(conversation_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Failed to fetch joins for {}: {:#}", conversation_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(joins))
}

pub async fn get_waves(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
    Query(query): Query<WaveQuery>,
) -> Response {
    let defaults = state.config.waves;
    let params = match WaveParams::new(
        query.window_seconds.unwrap_or(defaults.window_seconds),
        query.threshold.unwrap_or(defaults.threshold as i64),
    ) {
        Ok(params) => params,
        Err(e) => {
            warn!("Rejected wave query for {}: {}", conversation_id, e);
            return error_response(StatusCode::BAD_REQUEST, e);
        }
    };

    let db = state.db.clone();
    let result = tokio::task::spawn_blocking(move || analyze(&*db, conversation_id, params)).await;
    let analysis = match result {
        Ok(Ok(analysis)) => analysis,
        Ok(Err(AnalyzeError::Detect(e))) => {
            // stored timestamps are finite and sorted, so this means corrupt data
            error!("Join timeline for {} is not analysable: {}", conversation_id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
        Ok(Err(e)) => {
            error!("Wave analysis for {} failed: {}", conversation_id, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    Json(WavesResponse {
        conversation_id,
        total_joins: analysis.records.len(),
        waves: analysis.summaries,
        report: analysis.report,
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use joinwave_types::JoinRecord;
    use tower::ServiceExt;

    fn state(export_dir: &std::path::Path) -> AppState {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.export_dir = export_dir.to_path_buf();
        AppState {
            db: Arc::new(Database::open_in_memory().unwrap()),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(state(dir.path()))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn negative_threshold_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(state(dir.path()))
            .oneshot(
                Request::get("/conversations/1/waves?window_seconds=30&threshold=-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn waves_are_reported_from_stored_joins() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        for (subject_id, timestamp) in [(1, 0.0), (2, 1.0), (3, 2.0), (4, 500.0)] {
            state
                .db
                .insert_if_absent(&JoinRecord {
                    conversation_id: 7,
                    subject_id,
                    display_name: None,
                    timestamp,
                })
                .unwrap();
        }

        let response = router(state)
            .oneshot(
                Request::get("/conversations/7/waves?window_seconds=2&threshold=3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["total_joins"], 4);
        assert_eq!(body["waves"].as_array().unwrap().len(), 1);
        assert_eq!(body["waves"][0]["members"], serde_json::json!(["1", "2", "3"]));
    }

    #[tokio::test]
    async fn scan_then_list_joins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("lobby.json"),
            r#"{"id": 12, "events": [
                {"id": 1, "date": "2024-01-01T00:00:00Z",
                 "action": {"type": "members_added", "user_ids": [5, 6]}}
            ], "users": [{"id": 5, "username": "eve"}, {"id": 6}]}"#,
        )
        .unwrap();
        let app = router(state(dir.path()));

        let response = app
            .clone()
            .oneshot(
                Request::post("/conversations/lobby/scan")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"limit": 50}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outcome = body_json(response).await;
        assert_eq!(outcome["conversation_id"], 12);
        assert_eq!(outcome["inserted"], 2);

        let response = app
            .oneshot(Request::get("/conversations/12/joins").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let joins = body_json(response).await;
        assert_eq!(joins[0]["display_name"], "eve");
        assert_eq!(joins[1]["display_name"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn bad_export_file_does_not_block_other_scans() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("g.json"),
            r#"{"id": 21, "events": [
                {"id": 1, "date": "2024-01-01T00:00:00Z",
                 "action": {"type": "joined_by_link", "user_id": 8}},
                {"id": 2, "date": "2024-01-01T00:00:01Z",
                 "action": {"type": "joined_by_link", "user_id": "oops"}}
            ]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let app = router(state(dir.path()));

        let response = app
            .oneshot(Request::post("/conversations/g/scan").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outcome = body_json(response).await;
        assert_eq!(outcome["inserted"], 1);
        assert_eq!(outcome["skipped"][0]["event_id"], 2);
        assert_eq!(outcome["skipped"][0]["reason"]["kind"], "malformed_event");
    }

    #[tokio::test]
    async fn malformed_scan_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(state(dir.path()))
            .oneshot(
                Request::post("/conversations/1/scan")
                    .body(Body::from(r#"{"limit": "lots"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_export_dir_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(state(&dir.path().join("nope")))
            .oneshot(Request::post("/conversations/1/scan").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
