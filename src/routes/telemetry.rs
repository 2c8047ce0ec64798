//! Telemetry packet endpoints.
//!
//! - `POST /telemetry/validate` checks a packet and reports every violation.
//! - `POST /telemetry` parses, formats and persists a packet.
//!
//! Both take the raw request body so malformed JSON is reported the same
//! way the validator reports it, not as an extractor rejection.

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, response::Response, routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{insert_status, AppState};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/telemetry", post(ingest))
        .route("/telemetry/validate", post(validate))
}

async fn validate(State(state): State<AppState>, body: String) -> Response {
    // ---
    let outcome = state.validator.validate_payload(body.as_str());
    debug!(valid = outcome.is_valid, errors = outcome.errors.len(), "POST /telemetry/validate");

    let status = if outcome.is_valid {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(outcome)).into_response()
}

async fn ingest(State(state): State<AppState>, body: String) -> Response {
    // ---
    info!("POST /telemetry - {} bytes", body.len());

    let outcome = state.validator.validate_payload(body.as_str());
    if !outcome.is_valid {
        if state.require_valid {
            warn!(errors = outcome.errors.len(), "packet rejected by validation");
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(outcome)).into_response();
        }
        warn!(errors = ?outcome.errors, "ingesting packet that failed validation");
    }

    let packet = match state.parser.parse(body.as_str()) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("packet parse failed: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    let formatted = packet.format();
    debug!(rows = formatted.sensors.len(), "packet formatted");

    let outcome = state.pipeline.ingest(&formatted).await;
    (insert_status(&outcome), Json(outcome)).into_response()
}
