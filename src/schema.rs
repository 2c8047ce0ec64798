//! Database schema bootstrap for `daq-ingest`.
//!
//! Applied once on startup from `main.rs`. Every statement is `IF NOT
//! EXISTS`, so restarts against an existing database are no-ops.

use anyhow::{Context, Result};
use sqlx::PgPool;

// ---

/// One row per sensor channel per packet. The natural-key constraint is
/// what turns a replayed reading into a skipped insert.
const SENSOR_READINGS: &str = r#"
    CREATE TABLE IF NOT EXISTS sensor_readings (
        timestamp   TIMESTAMPTZ      NOT NULL,
        session_id  TEXT             NOT NULL,
        vehicle_id  TEXT             NOT NULL,
        sensor_name TEXT             NOT NULL,
        value       DOUBLE PRECISION NOT NULL,
        CONSTRAINT sensor_readings_natural_key
            UNIQUE (timestamp, session_id, vehicle_id, sensor_name)
    )
"#;

/// Packet envelopes: flattened telemetry metadata plus the compact raw payload.
const TELEMETRY_PACKETS: &str = r#"
    CREATE TABLE IF NOT EXISTS telemetry_packets (
        timestamp      TIMESTAMPTZ      NOT NULL,
        session_id     TEXT             NOT NULL,
        vehicle_id     TEXT             NOT NULL,
        packet_id      TEXT,
        sample_rate_hz DOUBLE PRECISION,
        daq_version    TEXT,
        metadata       TEXT             NOT NULL,
        raw_payload    TEXT             NOT NULL,
        received_at    TIMESTAMPTZ      NOT NULL DEFAULT now(),
        CONSTRAINT telemetry_packets_natural_key
            UNIQUE (timestamp, session_id, vehicle_id)
    )
"#;

const STATEMENTS: &[(&str, &str)] = &[
    ("sensor_readings", SENSOR_READINGS),
    ("telemetry_packets", TELEMETRY_PACKETS),
    (
        "idx_sensor_readings_session",
        "CREATE INDEX IF NOT EXISTS idx_sensor_readings_session \
         ON sensor_readings (session_id, vehicle_id)",
    ),
    (
        "idx_telemetry_packets_packet_id",
        "CREATE INDEX IF NOT EXISTS idx_telemetry_packets_packet_id \
         ON telemetry_packets (packet_id)",
    ),
];

/// Create tables and indexes in a single transaction.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    for (name, sql) in STATEMENTS {
        sqlx::query(*sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("creating {name}"))?;
    }

    tx.commit().await?;
    tracing::info!("Schema ready ({} objects)", STATEMENTS.len());
    Ok(())
}
