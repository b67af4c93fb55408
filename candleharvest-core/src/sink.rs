//! Checkpoint store collaborator.
//!
//! The downloader does not persist anything itself; it hands the full
//! normalized accumulation to a caller-supplied sink on a fixed cadence.
//! Because every checkpoint carries the whole series re-derived from the
//! raw rows, a sink may simply overwrite its previous state.

use thiserror::Error;

use crate::normalize::Candle;

/// Failure from a data sink. Always fatal to the running fetch; persistence
/// is assumed caller-critical and is never retried.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        SinkError(message.into())
    }
}

/// Receives the normalized series accumulated so far at each checkpoint.
pub trait DataSink: Send {
    /// `source` names the data origin (e.g. `"delta"`).
    fn store(&self, candles: &[Candle], symbol: &str, source: &str) -> Result<(), SinkError>;
}

/// Discards stored data, for callers that only want the returned series.
pub struct NullSink;

impl DataSink for NullSink {
    fn store(&self, _candles: &[Candle], _symbol: &str, _source: &str) -> Result<(), SinkError> {
        Ok(())
    }
}
