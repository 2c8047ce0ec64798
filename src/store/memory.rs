//! In-process implementation of [`ReadingStore`].
//!
//! Same natural-key and transaction semantics as the Postgres store: inserts
//! are staged per transaction, visible to that transaction immediately and
//! to everyone else only after commit. Used by tests and dry runs, and can
//! inject store failures for a given sensor name.
//!
//! Write transactions are serialized: [`begin`](ReadingStore::begin) waits
//! until the previous transaction commits, rolls back or is dropped. A
//! second writer of the same key therefore sees the first one's row and
//! reports 0, as a blocked Postgres insert does once the holder commits.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ReadingStore, StoreTransaction};
use crate::error::StoreError;
use crate::models::{PacketRecord, SensorReading};

// ---

type ReadingKey = (DateTime<Utc>, String, String, String);
type PacketKey = (DateTime<Utc>, String, String);

fn reading_key(reading: &SensorReading) -> ReadingKey {
    (
        reading.timestamp.with_timezone(&Utc),
        reading.session_id.clone(),
        reading.vehicle_id.clone(),
        reading.sensor_name.clone(),
    )
}

fn packet_key(packet: &PacketRecord) -> PacketKey {
    (
        packet.timestamp.with_timezone(&Utc),
        packet.session_id.clone(),
        packet.vehicle_id.clone(),
    )
}

#[derive(Debug, Default)]
struct MemoryState {
    readings: BTreeMap<ReadingKey, f64>,
    packets: BTreeMap<PacketKey, PacketRecord>,
    /// Sensor name -> error returned when a reading for it is executed.
    faults: HashMap<String, StoreError>,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryReadingStore {
    state: Arc<Mutex<MemoryState>>,
    /// Held by the open write transaction, if any.
    writer: Arc<Mutex<()>>,
    closed: Arc<AtomicBool>,
}

impl MemoryReadingStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert of a reading named `sensor_name` fail with `err`.
    pub async fn fail_on_sensor(&self, sensor_name: impl Into<String>, err: StoreError) {
        self.state.lock().await.faults.insert(sensor_name.into(), err);
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    /// Mark the handle closed. `is_available` turns false, so the pipeline
    /// rejects calls up front; direct `begin`/`ping` calls get a
    /// connection error.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn reading_count(&self) -> usize {
        self.state.lock().await.readings.len()
    }

    pub async fn packet_count(&self) -> usize {
        self.state.lock().await.packets.len()
    }

    /// Committed value for a natural key, if any.
    pub async fn reading_value(&self, reading: &SensorReading) -> Option<f64> {
        self.state.lock().await.readings.get(&reading_key(reading)).copied()
    }

    pub async fn readings(&self) -> Vec<SensorReading> {
        // ---
        self.state
            .lock()
            .await
            .readings
            .iter()
            .map(|((ts, session, vehicle, sensor), value)| SensorReading {
                timestamp: ts.fixed_offset(),
                session_id: session.clone(),
                vehicle_id: vehicle.clone(),
                sensor_name: sensor.clone(),
                value: *value,
            })
            .collect()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("store handle is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    // ---
    fn is_available(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_open()
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        // ---
        self.ensure_open()?;
        let writer = Arc::clone(&self.writer).lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            _writer: writer,
            store: self.clone(),
            readings: BTreeMap::new(),
            packets: BTreeMap::new(),
        }))
    }
}

/// Staged writes; discarded when dropped uncommitted.
struct MemoryTransaction {
    _writer: OwnedMutexGuard<()>,
    store: MemoryReadingStore,
    readings: BTreeMap<ReadingKey, f64>,
    packets: BTreeMap<PacketKey, PacketRecord>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    // ---
    async fn insert_reading(&mut self, reading: &SensorReading) -> Result<u64, StoreError> {
        // ---
        self.store.ensure_open()?;
        let state = self.store.state.lock().await;
        if let Some(err) = state.faults.get(&reading.sensor_name) {
            return Err(err.clone());
        }
        if !reading.value.is_finite() {
            return Err(StoreError::Data(format!(
                "value {} for '{}' is not a finite number",
                reading.value, reading.sensor_name
            )));
        }

        let key = reading_key(reading);
        if state.readings.contains_key(&key) || self.readings.contains_key(&key) {
            return Ok(0);
        }
        self.readings.insert(key, reading.value);
        Ok(1)
    }

    async fn insert_packet(&mut self, packet: &PacketRecord) -> Result<u64, StoreError> {
        // ---
        self.store.ensure_open()?;
        let state = self.store.state.lock().await;
        let key = packet_key(packet);
        if state.packets.contains_key(&key) || self.packets.contains_key(&key) {
            return Ok(0);
        }
        self.packets.insert(key, packet.clone());
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        // ---
        self.store.ensure_open()?;
        let mut state = self.store.state.lock().await;
        state.readings.extend(self.readings);
        state.packets.extend(self.packets);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn reading(sensor: &str, value: f64) -> SensorReading {
        // ---
        SensorReading {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap().fixed_offset(),
            session_id: "s1".to_string(),
            vehicle_id: "v1".to_string(),
            sensor_name: sensor.to_string(),
            value,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        // ---
        let store = MemoryReadingStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.insert_reading(&reading("engine_rpm", 1.0)).await.unwrap(), 1);
        assert_eq!(store.reading_count().await, 0);

        tx.commit().await.unwrap();
        assert_eq!(store.reading_count().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        // ---
        let store = MemoryReadingStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_reading(&reading("engine_rpm", 1.0)).await.unwrap();
        }
        assert_eq!(store.reading_count().await, 0);
    }

    #[tokio::test]
    async fn test_conflict_within_and_across_transactions() {
        // ---
        let store = MemoryReadingStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.insert_reading(&reading("engine_rpm", 1.0)).await.unwrap(), 1);
        assert_eq!(tx.insert_reading(&reading("engine_rpm", 2.0)).await.unwrap(), 0);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.insert_reading(&reading("engine_rpm", 3.0)).await.unwrap(), 0);
        tx.commit().await.unwrap();

        assert_eq!(store.reading_value(&reading("engine_rpm", 0.0)).await, Some(1.0));
    }

    async fn insert_and_commit(store: MemoryReadingStore, value: f64) -> u64 {
        // ---
        let mut tx = store.begin().await.unwrap();
        let affected = tx.insert_reading(&reading("speed_fl", value)).await.unwrap();
        tx.commit().await.unwrap();
        affected
    }

    #[tokio::test]
    async fn test_second_writer_waits_and_skips() {
        // ---
        let store = MemoryReadingStore::new();
        let mut first = store.begin().await.unwrap();
        assert_eq!(first.insert_reading(&reading("speed_fl", 10.0)).await.unwrap(), 1);

        let second = tokio::spawn(insert_and_commit(store.clone(), 20.0));
        tokio::task::yield_now().await;
        assert!(!second.is_finished());

        first.commit().await.unwrap();
        assert_eq!(second.await.unwrap(), 0);

        assert_eq!(store.reading_count().await, 1);
        assert_eq!(store.reading_value(&reading("speed_fl", 0.0)).await, Some(10.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_count_the_key_once() {
        // ---
        let store = MemoryReadingStore::new();
        let handles: Vec<_> = (0..8)
            .map(|i| tokio::spawn(insert_and_commit(store.clone(), f64::from(i))))
            .collect();

        let mut affected = 0;
        for handle in handles {
            affected += handle.await.unwrap();
        }
        assert_eq!(affected, 1);
        assert_eq!(store.reading_count().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_writer_releases_the_store() {
        // ---
        let store = MemoryReadingStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_reading(&reading("speed_fl", 1.0)).await.unwrap();
        }
        assert_eq!(insert_and_commit(store.clone(), 2.0).await, 1);
        assert_eq!(store.reading_value(&reading("speed_fl", 0.0)).await, Some(2.0));
    }

    #[tokio::test]
    async fn test_fault_injection_and_close() {
        // ---
        let store = MemoryReadingStore::new();
        store
            .fail_on_sensor("oil_pressure", StoreError::Integrity("check violated".into()))
            .await;

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_reading(&reading("oil_pressure", 1.0)).await.unwrap_err();
        assert_eq!(err, StoreError::Integrity("check violated".into()));

        store.close();
        assert!(!store.is_available());
        assert!(matches!(store.begin().await, Err(StoreError::Connection(_))));
    }
}
