//! Error types for the ingestion pipeline.
//!
//! Library code returns these typed errors; the binary wraps them in
//! `anyhow` at the edges. Insert operations never propagate a
//! [`StoreError`] to the caller, they fold it into an
//! [`InsertOutcome`](crate::models::InsertOutcome) after rolling back.

use thiserror::Error;

// ---

/// A timestamp could not be coerced into an [`Instant`](crate::timestamp::Instant).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("unsupported timestamp type: {0}")]
    UnsupportedType(&'static str),

    #[error("unparseable ISO 8601 timestamp '{0}'")]
    Unparseable(String),

    #[error("epoch value {0} is outside the representable range")]
    EpochOutOfRange(f64),
}

/// A raw payload could not be decoded into a packet.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("invalid packet timestamp: {0}")]
    Timestamp(#[from] TimestampError),
}

/// Aggregated validation failure raised by the strict validator.
///
/// Carries every violation found in the pass, in the order they were found.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Validation failed:\n{}", bullet_list(.errors))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

fn bullet_list(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A sensor or packet row failed shape normalization before any write.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("Row must be a JSON object, got {0}.")]
    NotAnObject(&'static str),

    #[error("Missing required field(s): {}.", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("{0} must be a non-empty string.")]
    EmptyField(&'static str),

    #[error("value must be numeric.")]
    NonNumeric,
}

/// Failure reported by a [`ReadingStore`](crate::store::ReadingStore), classified by cause.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Store unreachable or connection lost. Terminal for the call.
    #[error("connection error ({0})")]
    Connection(String),

    /// Constraint violation other than the tolerated natural-key conflict.
    #[error("integrity error ({0})")]
    Integrity(String),

    /// Value rejected by the store's column types.
    #[error("data error ({0})")]
    Data(String),

    #[error("database error ({0})")]
    Database(String),
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_validation_error_joins_every_entry() {
        // ---
        let err = ValidationError {
            errors: vec!["first".to_string(), "second".to_string()],
        };
        assert_eq!(err.to_string(), "Validation failed:\n  - first\n  - second");
    }

    #[test]
    fn test_missing_fields_message() {
        // ---
        let err = RowError::MissingFields(vec!["session_id", "value"]);
        assert_eq!(err.to_string(), "Missing required field(s): session_id, value.");
    }

    #[test]
    fn test_store_error_classification_prefix() {
        // ---
        let err = StoreError::Connection("refused".to_string());
        assert_eq!(format!("Insert failed: {err}"), "Insert failed: connection error (refused)");
    }
}
