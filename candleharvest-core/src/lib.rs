//! CandleHarvest Core — bulk historical OHLCV downloading.
//!
//! Given a symbol, a time range, and a resolution, this crate retrieves
//! ordered candle data from a paginated, rate-limited remote source and
//! turns it into a clean, deduplicated, time-sorted series:
//! - Resolution table and request windowing arithmetic
//! - Rate-limited fetching with back-off and a per-window error budget
//! - Candle normalization (dedup by timestamp, sort ascending)
//! - Progress/ETA reporting and periodic checkpointing through
//!   caller-supplied sinks
//! - Parquet checkpoint cache and TOML configuration

pub mod cache;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod normalize;
pub mod progress;
pub mod resolution;
pub mod sink;
pub mod window;

pub use cache::{CacheError, CacheMeta, ParquetCache};
pub use client::{rate_limit_wait, CandleSource, DeltaClient, FetchOutcome, DEFAULT_BASE_URL};
pub use config::{ConfigError, DownloadConfig};
pub use download::{DownloadResult, Downloader};
pub use error::DownloadError;
pub use normalize::{normalize, Candle, RawKline};
pub use progress::{FetchStatus, NullProgress, ProgressSink, StdoutProgress};
pub use resolution::Resolution;
pub use sink::{DataSink, NullSink, SinkError};
pub use window::{plan, Window, WindowSchedule};
