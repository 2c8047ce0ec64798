//! Store abstraction for sensor readings and packets.
//!
//! The pipeline talks to storage through [`ReadingStore`], which hands out one
//! [`StoreTransaction`] per insert call. A transaction that is dropped without
//! [`commit`](StoreTransaction::commit) is rolled back, so every early return,
//! error path or panic leaves the store untouched.
//!
//! Implementations must enforce uniqueness of the reading natural key
//! `(timestamp, session_id, vehicle_id, sensor_name)` and report a conflicting
//! insert as zero affected rows, not as an error.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{PacketRecord, SensorReading};

mod memory;
mod postgres;

pub use memory::MemoryReadingStore;
pub use postgres::PgReadingStore;

// ---

/// A store that can open transactions for reading and packet inserts.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// `false` once the underlying handle has been closed.
    fn is_available(&self) -> bool;

    /// Round-trip to the store without touching data.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Acquire a connection and start a transaction on it.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// One open transaction. Dropping it without committing rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Insert one reading, skipping on natural-key conflict.
    /// Returns the affected row count (1 inserted, 0 skipped).
    async fn insert_reading(&mut self, reading: &SensorReading) -> Result<u64, StoreError>;

    /// Insert one packet row, skipping on conflict of
    /// `(timestamp, session_id, vehicle_id)`. Returns the affected row count.
    async fn insert_packet(&mut self, packet: &PacketRecord) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
