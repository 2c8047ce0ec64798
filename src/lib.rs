//! Telemetry ingestion for a vehicle data-acquisition (DAQ) rig.
//!
//! Packets arrive as JSON, are validated against one of two payload
//! layouts, flattened into one row per sensor channel and landed in a
//! store that silently skips rows it has already seen.
//!
//! Module map:
//! - [`timestamp`]: coerce ISO 8601 strings and numeric epochs to one instant type
//! - [`validator`]: schema checks for the FSAE and sensor-list layouts
//! - [`parser`]: packet decoding and row flattening
//! - [`pipeline`]: transactional, duplicate-skipping inserts
//! - [`store`]: the storage seam plus Postgres and in-memory backends
//! - [`routes`], [`config`], [`schema`]: the HTTP service around them

pub mod config;
pub mod error;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod routes;
pub mod schema;
pub mod store;
pub mod timestamp;
pub mod validator;

pub use config::Config;
pub use error::{ParseError, RowError, StoreError, TimestampError, ValidationError};
pub use models::{
    FailureKind, FormattedPacket, InsertOutcome, PacketRecord, PacketRow, RawInput, SensorReading,
    SensorRow, TelemetryPacket, ValidationOutcome, ValidationReport,
};
pub use parser::PacketParser;
pub use pipeline::InsertPipeline;
pub use store::{MemoryReadingStore, PgReadingStore, ReadingStore, StoreTransaction};
pub use timestamp::{EpochZone, Instant, TimestampNormalizer};
pub use validator::{PayloadValidator, RangeRule, RuleTable, SchemaVariant};
