//! Raw kline rows and candle normalization.
//!
//! The wire delivers candles as positional arrays
//! `[time, open, high, low, close, volume]` with time in unix seconds.
//! Adjacent request windows can overlap by one candle at their shared
//! boundary, so normalization deduplicates by timestamp before sorting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Raw candle row exactly as returned by the remote. A row with the wrong
/// number of fields fails at deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawKline(pub i64, pub f64, pub f64, pub f64, pub f64, pub f64);

impl RawKline {
    /// Unix seconds of the candle open.
    pub fn timestamp(&self) -> i64 {
        self.0
    }
}

/// Normalized OHLCV candle.
///
/// Within one normalized series, timestamps are unique and strictly
/// increasing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Re-derive the wire row for this candle.
    pub fn to_raw(&self) -> RawKline {
        RawKline(
            self.timestamp.timestamp(),
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
    }
}

/// Normalize raw rows into a clean candle series.
///
/// Deduplicates by timestamp (first occurrence wins), converts unix seconds
/// to UTC instants, and sorts ascending. Empty input yields an empty series.
/// Idempotent: normalizing an already-normalized series returns it
/// unchanged.
pub fn normalize(rows: &[RawKline]) -> Vec<Candle> {
    let mut seen: HashSet<i64> = HashSet::with_capacity(rows.len());
    let mut candles: Vec<Candle> = Vec::with_capacity(rows.len());

    for row in rows {
        if !seen.insert(row.0) {
            continue;
        }
        let timestamp = match DateTime::from_timestamp(row.0, 0) {
            Some(t) => t,
            None => {
                log::warn!("dropping row with out-of-range timestamp {}", row.0);
                continue;
            }
        };
        candles.push(Candle {
            timestamp,
            open: row.1,
            high: row.2,
            low: row.3,
            close: row.4,
            volume: row.5,
        });
    }

    candles.sort_by_key(|c| c.timestamp);
    candles
}
