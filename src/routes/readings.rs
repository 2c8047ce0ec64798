//! `POST /readings`: land pre-flattened sensor rows.
//!
//! A JSON array goes through the batch path (all or nothing); a single
//! object is inserted on its own.

use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde_json::Value;
use tracing::info;

use super::{insert_status, AppState};

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/readings", post(handler))
}

async fn handler(State(state): State<AppState>, Json(body): Json<Value>) -> impl IntoResponse {
    // ---
    let outcome = match &body {
        Value::Array(rows) => {
            info!("POST /readings - batch of {}", rows.len());
            state.pipeline.insert_json_batch(&body).await
        }
        _ => {
            info!("POST /readings - single row");
            state.pipeline.insert_json(&body).await
        }
    };
    (insert_status(&outcome), Json(outcome))
}
