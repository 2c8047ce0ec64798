//! HTTP route gateway.
//!
//! Each sibling module exports a sub-router; this module merges them and
//! attaches the shared [`AppState`]. `main.rs` only sees [`router`].

use std::sync::Arc;

use axum::http::StatusCode;
use axum::Router;

use crate::config::Config;
use crate::models::{FailureKind, InsertOutcome};
use crate::parser::PacketParser;
use crate::pipeline::InsertPipeline;
use crate::store::ReadingStore;
use crate::timestamp::TimestampNormalizer;
use crate::validator::PayloadValidator;

mod health;
mod readings;
mod telemetry;

// ---

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub pipeline: InsertPipeline,
    pub parser: PacketParser,
    pub validator: Arc<PayloadValidator>,
    /// Reject invalid packets on `POST /telemetry` instead of persisting them.
    pub require_valid: bool,
}

impl AppState {
    // ---
    pub fn new(store: Arc<dyn ReadingStore>, cfg: &Config) -> Self {
        // ---
        let normalizer = TimestampNormalizer::new(cfg.epoch_zone);
        Self {
            pipeline: InsertPipeline::new(store).with_normalizer(normalizer),
            parser: PacketParser::new(normalizer).with_variant(cfg.schema),
            validator: Arc::new(PayloadValidator::new(cfg.schema)),
            require_valid: cfg.require_valid,
        }
    }
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(telemetry::router())
        .merge(readings::router())
        .merge(health::router())
        .with_state(state)
}

/// HTTP status for an insert outcome.
fn insert_status(outcome: &InsertOutcome) -> StatusCode {
    // ---
    match outcome.failure {
        None => StatusCode::CREATED,
        Some(FailureKind::Rejected) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(FailureKind::Connection) => StatusCode::SERVICE_UNAVAILABLE,
        Some(FailureKind::Integrity | FailureKind::Data | FailureKind::Database) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
