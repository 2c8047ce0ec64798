//! PostgreSQL / TimescaleDB implementation of [`ReadingStore`].

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::{ReadingStore, StoreTransaction};
use crate::error::StoreError;
use crate::models::{PacketRecord, SensorReading};

// ---

const INSERT_READING_SQL: &str = r#"
    INSERT INTO sensor_readings (timestamp, session_id, vehicle_id, sensor_name, value)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (timestamp, session_id, vehicle_id, sensor_name) DO NOTHING
"#;

const INSERT_PACKET_SQL: &str = r#"
    INSERT INTO telemetry_packets (
        timestamp, session_id, vehicle_id,
        packet_id, sample_rate_hz, daq_version,
        metadata, raw_payload
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (timestamp, session_id, vehicle_id) DO NOTHING
"#;

/// Pool-backed store. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    // ---
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool of at most `max_connections` against `db_url`.
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        // ---
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    // ---
    fn is_available(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        // ---
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

/// Wraps a sqlx transaction; sqlx rolls it back when dropped uncommitted.
struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    // ---
    async fn insert_reading(&mut self, reading: &SensorReading) -> Result<u64, StoreError> {
        // ---
        let result = sqlx::query(INSERT_READING_SQL)
            .bind(reading.timestamp.with_timezone(&Utc))
            .bind(&reading.session_id)
            .bind(&reading.vehicle_id)
            .bind(&reading.sensor_name)
            .bind(reading.value)
            .execute(&mut *self.tx)
            .await?;

        debug!(
            sensor = %reading.sensor_name,
            rows = result.rows_affected(),
            "executed reading insert"
        );
        Ok(result.rows_affected())
    }

    async fn insert_packet(&mut self, packet: &PacketRecord) -> Result<u64, StoreError> {
        // ---
        let result = sqlx::query(INSERT_PACKET_SQL)
            .bind(packet.timestamp.with_timezone(&Utc))
            .bind(&packet.session_id)
            .bind(&packet.vehicle_id)
            .bind(&packet.packet_id)
            .bind(packet.sample_rate_hz)
            .bind(&packet.daq_version)
            .bind(&packet.metadata)
            .bind(&packet.raw_payload)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Classify sqlx failures by SQLSTATE class where the server supplied one.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // ---
        let message = err.to_string();
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(code) if code.starts_with("08") => Self::Connection(message),
                Some(code) if code.starts_with("23") => Self::Integrity(message),
                Some(code) if code.starts_with("22") => Self::Data(message),
                _ => Self::Database(message),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_) => Self::Connection(message),
            sqlx::Error::Encode(_)
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::TypeNotFound { .. } => Self::Data(message),
            _ => Self::Database(message),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_connection_failures_are_classified() {
        // ---
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Connection(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolClosed),
            StoreError::Connection(_)
        ));
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(StoreError::from(sqlx::Error::Io(io)), StoreError::Connection(_)));
    }

    #[test]
    fn test_type_failures_are_data_errors() {
        // ---
        let err = sqlx::Error::TypeNotFound {
            type_name: "sensor_value".to_string(),
        };
        assert!(matches!(StoreError::from(err), StoreError::Data(_)));
    }

    #[test]
    fn test_other_failures_fall_back_to_database() {
        // ---
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
    }
}
