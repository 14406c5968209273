//! HTTP routes for the read API

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use pulse_storage::TelemetryStore;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

const OPENAPI_JSON: &str = include_str!("../openapi.json");

const DOCS_HTML: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8" />
    <title>GPU Telemetry API Docs</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
  </head>
  <body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script>
      window.onload = () => { window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' }); };
    </script>
  </body>
</html>"#;

#[derive(Clone)]
struct AppState {
    store: Arc<dyn TelemetryStore>,
}

/// Build the gateway router over the given store.
pub fn router(store: Arc<dyn TelemetryStore>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/gpus", get(list_gpus))
        .route("/api/v1/gpus/:gpu_id/telemetry", get(query_telemetry))
        .route("/openapi.json", get(openapi))
        .route("/docs", get(docs))
        .with_state(AppState { store })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn openapi() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        OPENAPI_JSON,
    )
        .into_response()
}

async fn docs() -> Html<&'static str> {
    Html(DOCS_HTML)
}

async fn list_gpus(State(state): State<AppState>) -> Response {
    match state.store.list_gpus().await {
        Ok(gpus) => Json(gpus).into_response(),
        Err(e) => {
            error!("list gpus: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct TimeWindow {
    start_time: Option<String>,
    end_time: Option<String>,
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|t| t.with_timezone(&Utc))
}

async fn query_telemetry(
    State(state): State<AppState>,
    Path(gpu_id): Path<String>,
    Query(window): Query<TimeWindow>,
) -> Response {
    if gpu_id.trim().is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let start = match window.start_time.as_deref() {
        Some(raw) => match parse_rfc3339(raw) {
            Ok(t) => Some(t),
            Err(_) => {
                return (StatusCode::BAD_REQUEST, "invalid start_time").into_response();
            }
        },
        None => None,
    };
    let end = match window.end_time.as_deref() {
        Some(raw) => match parse_rfc3339(raw) {
            Ok(t) => Some(t),
            Err(_) => {
                return (StatusCode::BAD_REQUEST, "invalid end_time").into_response();
            }
        },
        None => None,
    };

    match state.store.query(&gpu_id, start, end).await {
        Ok(items) => Json(items).into_response(),
        Err(e) => {
            error!(gpu = %gpu_id, ?start, ?end, "query telemetry: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
