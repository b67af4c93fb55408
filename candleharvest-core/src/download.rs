//! Download orchestrator — the end-to-end fetch loop.
//!
//! Drives the window schedule through a candle source, absorbing rate
//! limits (wait, retry same window) and transient failures (bounded
//! per-window budget), checkpointing the accumulated series on a cadence,
//! and reporting progress after every successful window.
//!
//! Single sequential flow of control: blocking requests, synchronous
//! callbacks, and pacing sleeps as the only voluntary suspensions. There is
//! exactly one mutator of the accumulation buffer.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::{Duration, Instant};

use crate::client::{CandleSource, FetchOutcome};
use crate::config::DownloadConfig;
use crate::error::DownloadError;
use crate::normalize::{normalize, Candle, RawKline};
use crate::progress::{FetchStatus, ProgressSink};
use crate::resolution::Resolution;
use crate::sink::DataSink;
use crate::window::{plan, Window};

/// Pause before retrying a window after a transient failure.
const TRANSIENT_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Fetch-loop state for a single window. Waiting (rate limit) and erroring
/// (transient failure) both retry the same window; only a successful fetch
/// lets the cursor advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    Fetching,
    Waiting(Duration),
    Erroring,
}

/// Final product of a completed fetch: the normalized series and the
/// terminal status record.
#[derive(Debug)]
pub struct DownloadResult {
    pub candles: Vec<Candle>,
    pub status: FetchStatus,
}

/// One fetch operation over a symbol and time range.
///
/// Owns nothing but borrowed collaborators; the accumulation buffer lives
/// inside a single `download` call and is consumed into the result.
pub struct Downloader<'a> {
    source: &'a dyn CandleSource,
    progress: &'a dyn ProgressSink,
    sink: &'a dyn DataSink,
    config: DownloadConfig,
}

impl<'a> Downloader<'a> {
    pub fn new(
        source: &'a dyn CandleSource,
        progress: &'a dyn ProgressSink,
        sink: &'a dyn DataSink,
        config: DownloadConfig,
    ) -> Self {
        Self {
            source,
            progress,
            sink,
            config,
        }
    }

    /// Fetch `[start, end)` at `resolution`.
    ///
    /// Returns the deduplicated, time-sorted series and the terminal status.
    /// On abort, the error carries whatever was accumulated, normalized.
    pub fn download(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DownloadResult, DownloadError> {
        let (schedule, expected) = plan(
            start,
            end,
            resolution,
            self.config.candles_per_request,
            Utc::now(),
        );

        let started = Instant::now();
        let mut rows: Vec<RawKline> = Vec::new();
        let mut calls_made: u64 = 0;

        for window in schedule {
            self.fetch_window_with_retry(symbol, resolution, &window, &mut rows)?;
            calls_made += 1;

            let status = FetchStatus::compute(
                symbol,
                calls_made,
                expected,
                started.elapsed().as_secs_f64(),
            );
            self.progress.update(&status);

            if calls_made % u64::from(self.config.checkpoint_every.max(1)) == 0 {
                self.checkpoint(&rows, symbol)?;
            }

            self.pace();
        }

        let status = FetchStatus::terminal(symbol, calls_made, started.elapsed().as_secs_f64());
        self.progress.update(&status);

        Ok(DownloadResult {
            candles: normalize(&rows),
            status,
        })
    }

    /// Fetch a single window, absorbing rate limits and transient failures.
    ///
    /// The error budget is charged per window: it starts fresh here and is
    /// forgotten once this returns. Rate limits never touch it.
    fn fetch_window_with_retry(
        &self,
        symbol: &str,
        resolution: Resolution,
        window: &Window,
        rows: &mut Vec<RawKline>,
    ) -> Result<(), DownloadError> {
        let mut state = FetchState::Fetching;
        let mut errors: u32 = 0;

        loop {
            match state {
                FetchState::Waiting(wait) => {
                    log::info!(
                        "rate limited fetching {symbol}, waiting {:.0}s",
                        wait.as_secs_f64()
                    );
                    std::thread::sleep(wait);
                    state = FetchState::Fetching;
                }
                FetchState::Erroring => {
                    std::thread::sleep(TRANSIENT_RETRY_PAUSE);
                    state = FetchState::Fetching;
                }
                FetchState::Fetching => match self.source.fetch_window(symbol, resolution, window)
                {
                    FetchOutcome::Success(mut batch) => {
                        rows.append(&mut batch);
                        return Ok(());
                    }
                    FetchOutcome::RateLimited { wait } => {
                        state = FetchState::Waiting(wait);
                    }
                    FetchOutcome::Transient(message) => {
                        errors += 1;
                        log::warn!(
                            "transient failure fetching {symbol} ({message}), error {errors}/{}",
                            self.config.error_budget
                        );
                        if errors > self.config.error_budget {
                            return Err(self.abort(symbol, errors, message, rows));
                        }
                        state = FetchState::Erroring;
                    }
                    FetchOutcome::Fatal(message) => {
                        return Err(self.abort(symbol, errors, message, rows));
                    }
                },
            }
        }
    }

    fn abort(
        &self,
        symbol: &str,
        errors: u32,
        message: String,
        rows: &[RawKline],
    ) -> DownloadError {
        log::error!("aborting download of {symbol}: {message}");
        DownloadError::Aborted {
            symbol: symbol.to_string(),
            errors,
            message,
            partial: normalize(rows),
        }
    }

    fn checkpoint(&self, rows: &[RawKline], symbol: &str) -> Result<(), DownloadError> {
        let candles = normalize(rows);
        self.sink
            .store(&candles, symbol, self.source.name())
            .map_err(|e| DownloadError::Checkpoint(e.to_string()))
    }

    /// Jittered inter-request delay applied after every successful window.
    fn pace(&self) {
        let delay = pace_delay(
            self.config.min_delay_secs,
            self.config.base_delay_secs,
            rand::thread_rng().gen::<f64>(),
        );
        std::thread::sleep(Duration::from_secs_f64(delay));
    }
}

/// Pacing arithmetic: uniform in `[min_delay, min_delay + base_delay)` with
/// a 0.1s floor, so the remote is never hammered even with a zero config.
/// `unit` is a uniform sample from `[0, 1)`.
fn pace_delay(min_delay: f64, base_delay: f64, unit: f64) -> f64 {
    let mut delay = min_delay + unit * base_delay;
    if delay < 0.1 {
        delay += 0.1;
    }
    delay
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pace_floor_applies_to_zero_config() {
        assert_eq!(pace_delay(0.0, 0.0, 0.0), 0.1);
        assert_eq!(pace_delay(0.0, 0.0, 0.99), 0.1);
    }

    #[test]
    fn pace_spans_the_configured_range() {
        assert_eq!(pace_delay(0.0, 0.3, 0.5), 0.15);
        assert_eq!(pace_delay(0.5, 0.3, 0.0), 0.5);
        // Just under the floor gets bumped, not clamped.
        let bumped = pace_delay(0.0, 0.3, 0.1);
        assert!((bumped - 0.13).abs() < 1e-12);
    }

    #[test]
    fn pace_respects_min_delay_above_floor() {
        let d = pace_delay(1.0, 0.5, 0.999);
        assert!(d >= 1.0 && d < 1.5);
    }
}
