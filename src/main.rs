//! `daq-ingest` service binary.
//!
//! Startup order: `.env`, tracing, config, database pool, schema bootstrap,
//! store probe, then the HTTP listener. Route wiring lives behind
//! `routes::router` (EMBP gateway); this file never names a handler.
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL / TimescaleDB connection string
//! - `LISTEN_ADDR` (optional) – bind address (default: `0.0.0.0:8080`)
//! - `INGEST_LOG_LEVEL` (optional) – log verbosity when `RUST_LOG` is unset (default: `debug`)
//! - `INGEST_SPAN_EVENTS` (optional) – `full`, `enter_exit`, or close-only (default)
//! - `FORCE_COLOR` (optional) – override TTY color detection
//!
//! Pool size, schema variant and the rest are documented in
//! [`daq_ingest::config::load_from_env`].
use std::{env, io::IsTerminal, sync::Arc};

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use daq_ingest::routes::{self, AppState};
use daq_ingest::store::{PgReadingStore, ReadingStore};
use daq_ingest::{config, schema};

const DEFAULT_LOG_LEVEL: &str = "debug";

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let store = PgReadingStore::connect(&cfg.db_url, cfg.db_pool_max)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database pool ready ({} max connections)", cfg.db_pool_max);

    schema::create_schema(store.pool())
        .await
        .context("Failed to create schema")?;
    store.ping().await.context("Database did not answer ping")?;

    let store: Arc<dyn ReadingStore> = Arc::new(store);
    let app = routes::router(AppState::new(store, &cfg));

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    tracing::info!(
        "Ingesting {} telemetry on {}",
        cfg.schema,
        cfg.listen_addr
    );
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Install the global compact `fmt` subscriber with target, file and line.
///
/// Call once, before the first log macro.
fn init_tracing() {
    // ---
    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events())
        .with_env_filter(env_filter())
        .with_ansi(use_color())
        .compact()
        .init();
}

/// `INGEST_SPAN_EVENTS`: `full` (enter, exit, close with timing),
/// `enter_exit`, anything else close-only.
fn span_events() -> FmtSpan {
    match env::var("INGEST_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    }
}

/// `FORCE_COLOR` wins (`1|true|yes` on, `0|false|no` off); otherwise color
/// only when stdout is a terminal.
fn use_color() -> bool {
    match env::var("FORCE_COLOR").as_deref() {
        Ok("1" | "true" | "yes") => true,
        Ok("0" | "false" | "no") => false,
        _ => std::io::stdout().is_terminal(),
    }
}

/// `RUST_LOG` when set. Otherwise `INGEST_LOG_LEVEL` for everything, with
/// per-statement sqlx logging held at `warn`.
fn env_filter() -> EnvFilter {
    // ---
    if env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    let level = env::var("INGEST_LOG_LEVEL")
        .ok()
        .filter(|level| ["trace", "debug", "info", "warn", "error"].contains(&level.as_str()))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    EnvFilter::new(format!("{level},sqlx::query=warn"))
}
