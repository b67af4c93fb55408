//! Structured error types for download operations.
//!
//! Rate limits and transient failures are absorbed inside the fetch loop and
//! never appear here on their own; these are the terminal errors a caller
//! can actually see.

use thiserror::Error;

use crate::normalize::Candle;

/// Terminal errors surfaced by the downloader.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Rejected locally, before any request is issued.
    #[error("unsupported resolution '{token}' (supported: 1m 3m 5m 15m 30m 1h 2h 4h 6h 12h 1d 3d 1w 1M)")]
    UnsupportedResolution { token: String },

    /// The per-window error budget was exhausted, or the source reported a
    /// failure that retrying cannot fix. Carries whatever rows were
    /// accumulated before the abort, normalized.
    #[error("download aborted for {symbol} after {errors} error(s) on one window: {message}")]
    Aborted {
        symbol: String,
        errors: u32,
        message: String,
        partial: Vec<Candle>,
    },

    /// A checkpoint store failed. Persistence is caller-critical; this is
    /// never retried.
    #[error("checkpoint store failed: {0}")]
    Checkpoint(String),

    /// A metadata request (products listing) failed.
    #[error("products request failed: {0}")]
    Api(String),
}
