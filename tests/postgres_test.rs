//! Insert pipeline against a live Postgres / TimescaleDB.
//!
//! Skipped unless `DATABASE_URL` is set. Each test uses its own session id
//! so runs against a shared database do not interfere.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use daq_ingest::{
    schema, FailureKind, InsertPipeline, PacketParser, PgReadingStore, ReadingStore, SensorRow,
};
use serde_json::json;

async fn connect() -> Result<Option<PgReadingStore>> {
    // ---
    let Ok(db_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return Ok(None);
    };
    let store = PgReadingStore::connect(&db_url, 4).await?;
    schema::create_schema(store.pool()).await?;
    Ok(Some(store))
}

fn unique_session(tag: &str) -> String {
    format!("test_{tag}_{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

#[tokio::test]
async fn duplicate_rows_are_skipped_by_natural_key() -> Result<()> {
    // ---
    let Some(store) = connect().await? else {
        return Ok(());
    };
    let pipeline = InsertPipeline::new(Arc::new(store));
    let session = unique_session("dedup");

    let row = SensorRow {
        timestamp: Some(Utc::now().fixed_offset()),
        session_id: Some(session.clone()),
        vehicle_id: Some("FSAE_TEST".to_string()),
        sensor_name: "engine_rpm".to_string(),
        value: json!(8500),
    };

    let first = pipeline.insert_single(&row).await;
    assert!(first.succeeded, "{}", first.message);
    assert_eq!(first.inserted_count, 1);

    let second = pipeline.insert_single(&row).await;
    assert!(second.succeeded, "{}", second.message);
    assert_eq!(second.skipped_count, 1);
    Ok(())
}

#[tokio::test]
async fn packet_ingest_is_idempotent() -> Result<()> {
    // ---
    let Some(store) = connect().await? else {
        return Ok(());
    };
    let pipeline = InsertPipeline::new(Arc::new(store));
    let session = unique_session("ingest");

    let payload = json!({
        "timestamp": Utc::now().to_rfc3339(),
        "session_id": session,
        "vehicle_id": "FSAE_TEST",
        "sensors": { "engine_rpm": 9100, "throttle_position": 55.5, "speed_fl": 21.4 },
        "telemetry_metadata": { "packet_id": "pkt_test", "sample_rate_hz": 100, "daq_version": "v2.1.3" }
    });
    let formatted = PacketParser::default().parse(&payload)?.format();

    let first = pipeline.ingest(&formatted).await;
    assert!(first.succeeded, "{}", first.message);
    assert_eq!(first.inserted_count, 3);

    let replay = pipeline.ingest(&formatted).await;
    assert!(replay.succeeded, "{}", replay.message);
    assert_eq!((replay.inserted_count, replay.skipped_count), (0, 3));
    Ok(())
}

#[tokio::test]
async fn closed_pool_is_reported_unavailable() -> Result<()> {
    // ---
    let Some(store) = connect().await? else {
        return Ok(());
    };
    store.pool().close().await;
    assert!(!store.is_available());

    let pipeline = InsertPipeline::new(Arc::new(store));
    let outcome = pipeline.insert_json_batch(&json!([{ "sensor_name": "x" }])).await;
    assert!(!outcome.succeeded);
    assert_eq!(outcome.failure, Some(FailureKind::Rejected));
    assert!(outcome.message.contains("closed"));
    Ok(())
}
