//! Parquet checkpoint cache with Hive-style partitioning.
//!
//! Layout: `{cache_dir}/symbol={SYMBOL}/resolution={RES}/{year}.parquet`
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity validation on load (schema check, row count > 0)
//! - Quarantine for corrupt files ({filename}.quarantined)
//! - Metadata sidecar per symbol+resolution (hash, time range, source)
//!
//! Implements [`DataSink`], so it can sit directly behind the downloader's
//! checkpoint cadence: every checkpoint rewrites the touched year
//! partitions from the full accumulated series.

use chrono::{DateTime, Datelike, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::normalize::Candle;
use crate::resolution::Resolution;
use crate::sink::{DataSink, SinkError};

/// Metadata sidecar for a cached symbol+resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    pub resolution: Resolution,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub candle_count: usize,
    pub data_hash: String,
    pub source: String,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(String),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("metadata error: {0}")]
    Meta(String),

    #[error("no cached data for {symbol} at {resolution}")]
    NoCachedData {
        symbol: String,
        resolution: Resolution,
    },
}

/// The Parquet cache for one resolution.
pub struct ParquetCache {
    cache_dir: PathBuf,
    resolution: Resolution,
}

impl ParquetCache {
    pub fn new(cache_dir: impl Into<PathBuf>, resolution: Resolution) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            resolution,
        }
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory for a symbol at this cache's resolution.
    fn partition_dir(&self, symbol: &str) -> PathBuf {
        self.cache_dir
            .join(format!("symbol={symbol}"))
            .join(format!("resolution={}", self.resolution))
    }

    fn year_path(&self, symbol: &str, year: i32) -> PathBuf {
        self.partition_dir(symbol).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.partition_dir(symbol).join("meta.json")
    }

    /// Write a normalized series for a symbol.
    ///
    /// Groups candles by year and writes one Parquet file per year, tmp then
    /// atomic rename. An empty series is a no-op, not an error — a
    /// checkpoint can legitimately fire before any rows have arrived.
    pub fn write(&self, symbol: &str, candles: &[Candle], source: &str) -> Result<(), CacheError> {
        if candles.is_empty() {
            log::debug!("skipping cache write for {symbol}: empty series");
            return Ok(());
        }

        let dir = self.partition_dir(symbol);
        fs::create_dir_all(&dir)
            .map_err(|e| CacheError::Io(format!("failed to create dir: {e}")))?;

        // Group candles by year
        let mut by_year: HashMap<i32, Vec<&Candle>> = HashMap::new();
        for candle in candles {
            by_year
                .entry(candle.timestamp.year())
                .or_default()
                .push(candle);
        }

        // Write each year partition
        for (year, year_candles) in &by_year {
            let df = candles_to_dataframe(year_candles)?;
            let path = self.year_path(symbol, *year);
            let tmp_path = path.with_extension("parquet.tmp");

            write_parquet(&df, &tmp_path)?;

            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                CacheError::Io(format!("atomic rename failed: {e}"))
            })?;
        }

        // Write metadata sidecar
        let meta = CacheMeta {
            symbol: symbol.to_string(),
            resolution: self.resolution,
            start: candles.first().unwrap().timestamp,
            end: candles.last().unwrap().timestamp,
            candle_count: candles.len(),
            data_hash: blake3::hash(
                &serde_json::to_vec(candles)
                    .map_err(|e| CacheError::Meta(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            source: source.to_string(),
            cached_at: Utc::now(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| CacheError::Meta(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(symbol), meta_json)
            .map_err(|e| CacheError::Meta(format!("meta write: {e}")))?;

        Ok(())
    }

    /// Load all cached candles for a symbol, sorted ascending.
    pub fn load(&self, symbol: &str) -> Result<Vec<Candle>, CacheError> {
        let dir = self.partition_dir(symbol);
        if !dir.exists() {
            return Err(CacheError::NoCachedData {
                symbol: symbol.to_string(),
                resolution: self.resolution,
            });
        }

        let mut all = Vec::new();

        let entries =
            fs::read_dir(&dir).map_err(|e| CacheError::Io(format!("read dir: {e}")))?;

        for entry in entries {
            let entry = entry.map_err(|e| CacheError::Io(format!("dir entry: {e}")))?;
            let path = entry.path();

            // Skip non-parquet files (meta.json, .quarantined, etc)
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }

            match load_and_validate_parquet(&path) {
                Ok(candles) => all.extend(candles),
                Err(e) => {
                    let quarantine = path.with_extension("parquet.quarantined");
                    log::warn!(
                        "quarantining corrupt cache file {}: {e}",
                        path.display()
                    );
                    let _ = fs::rename(&path, &quarantine);
                }
            }
        }

        if all.is_empty() {
            return Err(CacheError::NoCachedData {
                symbol: symbol.to_string(),
                resolution: self.resolution,
            });
        }

        all.sort_by_key(|c| c.timestamp);
        Ok(all)
    }

    /// Metadata for a symbol at this cache's resolution, if cached.
    pub fn get_meta(&self, symbol: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// All metadata sidecars under a cache directory, across symbols and
    /// resolutions. Used by status reporting.
    pub fn scan(cache_dir: &Path) -> Vec<CacheMeta> {
        let mut metas = Vec::new();

        let Ok(symbols) = fs::read_dir(cache_dir) else {
            return metas;
        };
        for symbol_entry in symbols.flatten() {
            let Ok(resolutions) = fs::read_dir(symbol_entry.path()) else {
                continue;
            };
            for res_entry in resolutions.flatten() {
                let meta_path = res_entry.path().join("meta.json");
                if let Ok(content) = fs::read_to_string(&meta_path) {
                    if let Ok(meta) = serde_json::from_str::<CacheMeta>(&content) {
                        metas.push(meta);
                    }
                }
            }
        }

        metas.sort_by(|a, b| (a.symbol.as_str(), a.resolution.token())
            .cmp(&(b.symbol.as_str(), b.resolution.token())));
        metas
    }
}

impl DataSink for ParquetCache {
    fn store(&self, candles: &[Candle], symbol: &str, source: &str) -> Result<(), SinkError> {
        self.write(symbol, candles, source)
            .map_err(|e| SinkError::new(e.to_string()))
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

/// Convert candles to a Polars DataFrame. Timestamps are stored as unix
/// seconds in an Int64 column.
fn candles_to_dataframe(candles: &[&Candle]) -> Result<DataFrame, CacheError> {
    let timestamps: Vec<i64> = candles.iter().map(|c| c.timestamp.timestamp()).collect();
    let opens: Vec<f64> = candles.iter().map(|c| c.open).collect();
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    DataFrame::new(vec![
        Column::new("timestamp".into(), timestamps),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| CacheError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), CacheError> {
    let file =
        fs::File::create(path).map_err(|e| CacheError::Parquet(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| CacheError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

/// Load a Parquet file and validate its integrity.
fn load_and_validate_parquet(path: &Path) -> Result<Vec<Candle>, CacheError> {
    let file = fs::File::open(path).map_err(|e| CacheError::Parquet(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| CacheError::Parquet(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(CacheError::Validation("empty parquet file".into()));
    }

    let expected_cols = ["timestamp", "open", "high", "low", "close", "volume"];
    for col_name in &expected_cols {
        if df.column(col_name).is_err() {
            return Err(CacheError::Validation(format!(
                "missing column '{col_name}'"
            )));
        }
    }

    dataframe_to_candles(&df)
}

fn dataframe_to_candles(df: &DataFrame) -> Result<Vec<Candle>, CacheError> {
    let col =
        |name: &str| df.column(name).map_err(|e| CacheError::Parquet(format!("column read: {e}")));

    let ts_ca = col("timestamp")?
        .i64()
        .map_err(|e| CacheError::Parquet(format!("timestamp column type: {e}")))?;
    let open_ca = col("open")?
        .f64()
        .map_err(|e| CacheError::Parquet(format!("open column type: {e}")))?;
    let high_ca = col("high")?
        .f64()
        .map_err(|e| CacheError::Parquet(format!("high column type: {e}")))?;
    let low_ca = col("low")?
        .f64()
        .map_err(|e| CacheError::Parquet(format!("low column type: {e}")))?;
    let close_ca = col("close")?
        .f64()
        .map_err(|e| CacheError::Parquet(format!("close column type: {e}")))?;
    let vol_ca = col("volume")?
        .f64()
        .map_err(|e| CacheError::Parquet(format!("volume column type: {e}")))?;

    let n = df.height();
    let mut candles = Vec::with_capacity(n);

    for i in 0..n {
        let secs = ts_ca
            .get(i)
            .ok_or_else(|| CacheError::Parquet(format!("null timestamp at row {i}")))?;
        let timestamp = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| CacheError::Validation(format!("invalid timestamp: {secs}")))?;

        candles.push(Candle {
            timestamp,
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0.0),
        });
    }

    Ok(candles)
}
