//! Dedup insert pipeline.
//!
//! Every call normalizes its rows first and only then opens a transaction,
//! so a bad row never causes a partial write. A natural-key conflict is a
//! skip, not a failure. Store failures roll the transaction back and come
//! back as a classified [`InsertOutcome`]; nothing here returns `Err`.
//!
//! Calls do not share transactions and the pipeline takes no locks;
//! concurrent writers of the same reading are arbitrated by the store's
//! unique constraint.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{RowError, StoreError};
use crate::models::{FormattedPacket, InsertOutcome, PacketRecord, SensorReading, SensorRow};
use crate::store::{ReadingStore, StoreTransaction};
use crate::timestamp::TimestampNormalizer;

// ---

const UNAVAILABLE: &str = "store connection is closed.";

/// Rows written by one transaction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct WriteCounts {
    packets: u64,
    inserted: u64,
    skipped: u64,
}

/// Validates row shape and lands rows in a [`ReadingStore`].
#[derive(Clone)]
pub struct InsertPipeline {
    store: Arc<dyn ReadingStore>,
    normalizer: TimestampNormalizer,
}

impl InsertPipeline {
    // ---
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self {
            store,
            normalizer: TimestampNormalizer::default(),
        }
    }

    /// Normalizer applied to timestamps of untyped JSON rows.
    pub fn with_normalizer(mut self, normalizer: TimestampNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn store(&self) -> &Arc<dyn ReadingStore> {
        &self.store
    }

    /// Insert one formatted sensor row.
    #[instrument(skip_all, fields(sensor = %row.sensor_name))]
    pub async fn insert_single(&self, row: &SensorRow) -> InsertOutcome {
        // ---
        if !self.store.is_available() {
            return InsertOutcome::rejected(format!("Insert failed: {UNAVAILABLE}"));
        }
        match SensorReading::try_from(row) {
            Ok(reading) => self.insert_reading(reading).await,
            Err(e) => InsertOutcome::rejected(e.to_string()),
        }
    }

    /// Insert one row given as an untyped JSON object.
    #[instrument(skip_all)]
    pub async fn insert_json(&self, row: &Value) -> InsertOutcome {
        // ---
        if !self.store.is_available() {
            return InsertOutcome::rejected(format!("Insert failed: {UNAVAILABLE}"));
        }
        match SensorReading::from_json(row, &self.normalizer) {
            Ok(reading) => self.insert_reading(reading).await,
            Err(e) => InsertOutcome::rejected(e.to_string()),
        }
    }

    /// Insert formatted rows in one all-or-nothing transaction.
    #[instrument(skip_all, fields(rows = rows.len()))]
    pub async fn insert_batch(&self, rows: &[SensorRow]) -> InsertOutcome {
        // ---
        if let Some(outcome) = self.reject_batch(rows.is_empty()) {
            return outcome;
        }
        match normalize_all(rows.iter().map(SensorReading::try_from)) {
            Ok(readings) => self.write_batch(readings).await,
            Err(outcome) => outcome,
        }
    }

    /// Insert a JSON array of untyped row objects in one transaction.
    #[instrument(skip_all)]
    pub async fn insert_json_batch(&self, rows: &Value) -> InsertOutcome {
        // ---
        let list = match rows.as_array() {
            Some(list) => list,
            None => {
                return InsertOutcome::rejected(
                    "Batch insert failed: rows must be a non-empty list.",
                )
            }
        };
        if let Some(outcome) = self.reject_batch(list.is_empty()) {
            return outcome;
        }
        let readings = list
            .iter()
            .map(|row| SensorReading::from_json(row, &self.normalizer));
        match normalize_all(readings) {
            Ok(readings) => self.write_batch(readings).await,
            Err(outcome) => outcome,
        }
    }

    /// Persist a formatted packet: the packet row and every sensor row,
    /// in one transaction.
    #[instrument(skip_all, fields(session_id = ?packet.packet.session_id, rows = packet.sensors.len()))]
    pub async fn ingest(&self, packet: &FormattedPacket) -> InsertOutcome {
        // ---
        if !self.store.is_available() {
            return InsertOutcome::rejected(format!("Ingest failed: {UNAVAILABLE}"));
        }
        let record = match PacketRecord::try_from(&packet.packet) {
            Ok(record) => record,
            Err(e) => return InsertOutcome::rejected(format!("Packet: {e}")),
        };
        let readings = match normalize_all(packet.sensors.iter().map(SensorReading::try_from)) {
            Ok(readings) => readings,
            Err(outcome) => return outcome,
        };

        match self.write(Some(&record), &readings).await {
            Ok(counts) => {
                let packet_note = if counts.packets == 0 {
                    " (packet already stored)"
                } else {
                    ""
                };
                info!(
                    inserted = counts.inserted,
                    skipped = counts.skipped,
                    "packet ingested"
                );
                InsertOutcome::success(
                    format!(
                        "Packet ingested{packet_note}: inserted {}, skipped {} duplicates.",
                        counts.inserted, counts.skipped
                    ),
                    counts.inserted,
                    counts.skipped,
                )
            }
            Err(e) => {
                error!("packet ingest failed: {}", e);
                InsertOutcome::store_failure("Ingest failed", &e)
            }
        }
    }

    // ---

    fn reject_batch(&self, empty: bool) -> Option<InsertOutcome> {
        // ---
        if !self.store.is_available() {
            return Some(InsertOutcome::rejected(format!(
                "Batch insert failed: {UNAVAILABLE}"
            )));
        }
        if empty {
            return Some(InsertOutcome::rejected(
                "Batch insert failed: rows must be a non-empty list.",
            ));
        }
        None
    }

    async fn insert_reading(&self, reading: SensorReading) -> InsertOutcome {
        // ---
        match self.write(None, std::slice::from_ref(&reading)).await {
            Ok(counts) if counts.inserted == 1 => {
                debug!("inserted 1 sensor reading");
                InsertOutcome::success("Inserted 1 sensor reading.", 1, 0)
            }
            Ok(_) => {
                warn!(
                    session_id = %reading.session_id,
                    vehicle_id = %reading.vehicle_id,
                    "duplicate sensor reading skipped"
                );
                InsertOutcome::success("Duplicate sensor reading skipped.", 0, 1)
            }
            Err(e) => {
                error!("insert failed: {}", e);
                InsertOutcome::store_failure("Insert failed", &e)
            }
        }
    }

    async fn write_batch(&self, readings: Vec<SensorReading>) -> InsertOutcome {
        // ---
        match self.write(None, &readings).await {
            Ok(counts) => {
                info!(
                    inserted = counts.inserted,
                    skipped = counts.skipped,
                    "batch insert complete"
                );
                InsertOutcome::success(
                    format!(
                        "Batch insert complete: inserted {}, skipped {} duplicates.",
                        counts.inserted, counts.skipped
                    ),
                    counts.inserted,
                    counts.skipped,
                )
            }
            Err(e) => {
                error!("batch insert failed, rolled back: {}", e);
                InsertOutcome::store_failure("Insert failed", &e)
            }
        }
    }

    /// Run every insert inside one transaction. Commits only if all succeed;
    /// otherwise rolls back before returning the first error.
    async fn write(
        &self,
        packet: Option<&PacketRecord>,
        readings: &[SensorReading],
    ) -> Result<WriteCounts, StoreError> {
        // ---
        let mut tx = self.store.begin().await?;

        match execute_all(tx.as_mut(), packet, readings).await {
            Ok(counts) => {
                tx.commit().await?;
                Ok(counts)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}

async fn execute_all(
    tx: &mut dyn StoreTransaction,
    packet: Option<&PacketRecord>,
    readings: &[SensorReading],
) -> Result<WriteCounts, StoreError> {
    // ---
    let mut counts = WriteCounts::default();
    if let Some(packet) = packet {
        counts.packets = tx.insert_packet(packet).await?;
    }
    for reading in readings {
        if tx.insert_reading(reading).await? == 1 {
            counts.inserted += 1;
        } else {
            counts.skipped += 1;
        }
    }
    Ok(counts)
}

/// Normalize every row up front; the first bad row aborts with its index.
fn normalize_all(
    rows: impl Iterator<Item = Result<SensorReading, RowError>>,
) -> Result<Vec<SensorReading>, InsertOutcome> {
    // ---
    rows.enumerate()
        .map(|(index, row)| {
            row.map_err(|e| {
                warn!(index, "batch rejected: {}", e);
                InsertOutcome::rejected(format!("Row {index}: {e}"))
            })
        })
        .collect()
}
