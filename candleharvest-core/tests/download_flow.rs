//! End-to-end fetch-loop behavior against a scripted candle source.
//!
//! The source trait lets these tests script outcome sequences (success,
//! rate limit, transient failure, fatal) and observe exactly which windows
//! the orchestrator asked for, without any network.

use candleharvest_core::client::{CandleSource, FetchOutcome};
use candleharvest_core::config::DownloadConfig;
use candleharvest_core::download::Downloader;
use candleharvest_core::error::DownloadError;
use candleharvest_core::normalize::{Candle, RawKline};
use candleharvest_core::progress::{FetchStatus, ProgressSink};
use candleharvest_core::resolution::Resolution;
use candleharvest_core::sink::{DataSink, NullSink, SinkError};
use candleharvest_core::window::Window;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

// ── Test doubles ─────────────────────────────────────────────────────

struct ScriptedSource {
    script: Mutex<VecDeque<FetchOutcome>>,
    windows_seen: Mutex<Vec<Window>>,
}

impl ScriptedSource {
    fn new(outcomes: Vec<FetchOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            windows_seen: Mutex::new(Vec::new()),
        }
    }

    fn windows_seen(&self) -> Vec<Window> {
        self.windows_seen.lock().unwrap().clone()
    }
}

impl CandleSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch_window(&self, _symbol: &str, _resolution: Resolution, window: &Window) -> FetchOutcome {
        self.windows_seen.lock().unwrap().push(*window);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| FetchOutcome::Fatal("script exhausted".into()))
    }
}

#[derive(Default)]
struct RecordingProgress(Mutex<Vec<FetchStatus>>);

impl RecordingProgress {
    fn statuses(&self) -> Vec<FetchStatus> {
        self.0.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn update(&self, status: &FetchStatus) {
        self.0.lock().unwrap().push(status.clone());
    }
}

#[derive(Default)]
struct RecordingSink(Mutex<Vec<(Vec<Candle>, String, String)>>);

impl RecordingSink {
    fn stores(&self) -> Vec<(Vec<Candle>, String, String)> {
        self.0.lock().unwrap().clone()
    }
}

impl DataSink for RecordingSink {
    fn store(&self, candles: &[Candle], symbol: &str, source: &str) -> Result<(), SinkError> {
        self.0
            .lock()
            .unwrap()
            .push((candles.to_vec(), symbol.to_string(), source.to_string()));
        Ok(())
    }
}

struct FailingSink;

impl DataSink for FailingSink {
    fn store(&self, _candles: &[Candle], _symbol: &str, _source: &str) -> Result<(), SinkError> {
        Err(SinkError::new("disk full"))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn utc(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn rows(stamps: &[i64]) -> Vec<RawKline> {
    stamps
        .iter()
        .map(|&t| RawKline(t, 1.0, 2.0, 0.5, 1.5, 10.0))
        .collect()
}

fn ok(stamps: &[i64]) -> FetchOutcome {
    FetchOutcome::Success(rows(stamps))
}

fn transient() -> FetchOutcome {
    FetchOutcome::Transient("HTTP 500 for BTCUSD".into())
}

fn fast_config() -> DownloadConfig {
    DownloadConfig {
        base_delay_secs: 0.0,
        min_delay_secs: 0.0,
        candles_per_request: 1000,
        checkpoint_every: 30,
        error_budget: 3,
    }
}

/// Start of a fixed past range; 1h resolution at 1000 candles/request means
/// `hours` hours of range produce `ceil(hours / 1000)` windows.
fn range_of_hours(hours: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = utc("2024-01-01T00:00:00Z");
    (start, start + Duration::hours(hours))
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn completes_across_three_windows() {
    let source = ScriptedSource::new(vec![ok(&[1, 2]), ok(&[3, 4]), ok(&[5])]);
    let progress = RecordingProgress::default();
    let (start, end) = range_of_hours(2001);

    let result = Downloader::new(&source, &progress, &NullSink, fast_config())
        .download("BTCUSD", Resolution::Hour1, start, end)
        .unwrap();

    assert_eq!(result.candles.len(), 5);
    assert_eq!(result.status.percent_complete, 100.0);
    assert_eq!(result.status.calls_made, 3);

    // Three windows, contiguous, in chronological order.
    let windows = source.windows_seen();
    assert_eq!(windows.len(), 3);
    assert_eq!(windows[0].start, start);
    assert_eq!(windows[2].end, end);
    for pair in windows.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
}

#[test]
fn percent_is_monotone_and_ends_at_exactly_100() {
    let source = ScriptedSource::new(vec![ok(&[1]), ok(&[2]), ok(&[3])]);
    let progress = RecordingProgress::default();
    let (start, end) = range_of_hours(2001);

    Downloader::new(&source, &progress, &NullSink, fast_config())
        .download("BTCUSD", Resolution::Hour1, start, end)
        .unwrap();

    let statuses = progress.statuses();
    // One status per successful window plus the terminal record.
    assert_eq!(statuses.len(), 4);
    for pair in statuses.windows(2) {
        assert!(pair[0].percent_complete <= pair[1].percent_complete);
    }
    assert_eq!(statuses[0].percent_complete, 33.33);
    assert_eq!(statuses[0].calls_expected, 3);
    assert_eq!(statuses.last().unwrap().percent_complete, 100.0);
    assert_eq!(statuses.last().unwrap().eta_secs, 0.0);
}

#[test]
fn rate_limit_retries_same_window_without_budget_charge() {
    let source = ScriptedSource::new(vec![
        FetchOutcome::RateLimited {
            wait: std::time::Duration::ZERO,
        },
        ok(&[1]),
        ok(&[2]),
        ok(&[3]),
    ]);
    let progress = RecordingProgress::default();
    let (start, end) = range_of_hours(2001);

    let result = Downloader::new(&source, &progress, &NullSink, fast_config())
        .download("BTCUSD", Resolution::Hour1, start, end)
        .unwrap();

    assert_eq!(result.candles.len(), 3);

    // Four requests for three windows: the rate-limited one was re-asked.
    let windows = source.windows_seen();
    assert_eq!(windows.len(), 4);
    assert_eq!(windows[0], windows[1]);
}

#[test]
fn error_budget_resets_between_windows() {
    // Each window burns the full budget of 3 transients, then succeeds.
    // If the budget were cumulative across windows, this would abort.
    let source = ScriptedSource::new(vec![
        transient(),
        transient(),
        transient(),
        ok(&[1]),
        transient(),
        transient(),
        transient(),
        ok(&[2]),
    ]);
    let progress = RecordingProgress::default();
    let (start, end) = range_of_hours(1001);

    let result = Downloader::new(&source, &progress, &NullSink, fast_config())
        .download("BTCUSD", Resolution::Hour1, start, end)
        .unwrap();

    assert_eq!(result.candles.len(), 2);
    assert_eq!(source.windows_seen().len(), 8);
}

#[test]
fn exhausted_budget_aborts_with_partial_rows() {
    // First window succeeds (with one duplicate row), second fails 4 times.
    let source = ScriptedSource::new(vec![
        ok(&[100, 200, 100]),
        transient(),
        transient(),
        transient(),
        transient(),
    ]);
    let progress = RecordingProgress::default();
    let (start, end) = range_of_hours(1001);

    let err = Downloader::new(&source, &progress, &NullSink, fast_config())
        .download("BTCUSD", Resolution::Hour1, start, end)
        .unwrap_err();

    match err {
        DownloadError::Aborted {
            symbol,
            errors,
            partial,
            ..
        } => {
            assert_eq!(symbol, "BTCUSD");
            assert_eq!(errors, 4);
            // Partial rows from the successful window, normalized.
            let stamps: Vec<i64> = partial.iter().map(|c| c.timestamp.timestamp()).collect();
            assert_eq!(stamps, vec![100, 200]);
        }
        other => panic!("expected Aborted, got {other:?}"),
    }

    // No further windows were attempted after the abort.
    assert_eq!(source.windows_seen().len(), 5);
}

#[test]
fn fatal_outcome_aborts_immediately() {
    let source = ScriptedSource::new(vec![FetchOutcome::Fatal("HTTP 404 for NOSUCH".into())]);
    let progress = RecordingProgress::default();
    let (start, end) = range_of_hours(2001);

    let err = Downloader::new(&source, &progress, &NullSink, fast_config())
        .download("NOSUCH", Resolution::Hour1, start, end)
        .unwrap_err();

    match err {
        DownloadError::Aborted { partial, message, .. } => {
            assert!(partial.is_empty());
            assert!(message.contains("404"));
        }
        other => panic!("expected Aborted, got {other:?}"),
    }
    assert_eq!(source.windows_seen().len(), 1);
}

#[test]
fn checkpoints_fire_on_cadence_with_accumulated_series() {
    let source = ScriptedSource::new(vec![
        ok(&[1]),
        ok(&[2]),
        ok(&[3]),
        ok(&[4]),
        ok(&[5]),
    ]);
    let progress = RecordingProgress::default();
    let sink = RecordingSink::default();
    let mut config = fast_config();
    config.checkpoint_every = 2;
    let (start, end) = range_of_hours(4001); // 5 windows

    Downloader::new(&source, &progress, &sink, config)
        .download("BTCUSD", Resolution::Hour1, start, end)
        .unwrap();

    let stores = sink.stores();
    // Cadence 2 over 5 successful calls → checkpoints after calls 2 and 4.
    assert_eq!(stores.len(), 2);
    assert_eq!(stores[0].0.len(), 2);
    assert_eq!(stores[1].0.len(), 4);
    assert_eq!(stores[0].1, "BTCUSD");
    assert_eq!(stores[0].2, "scripted");
}

#[test]
fn checkpoint_failure_is_fatal() {
    let source = ScriptedSource::new(vec![ok(&[1]), ok(&[2]), ok(&[3])]);
    let progress = RecordingProgress::default();
    let mut config = fast_config();
    config.checkpoint_every = 1;
    let (start, end) = range_of_hours(2001);

    let err = Downloader::new(&source, &progress, &FailingSink, config)
        .download("BTCUSD", Resolution::Hour1, start, end)
        .unwrap_err();

    assert!(matches!(err, DownloadError::Checkpoint(msg) if msg.contains("disk full")));
    // The loop stopped at the first checkpoint; later windows never ran.
    assert_eq!(source.windows_seen().len(), 1);
}

#[test]
fn empty_range_completes_without_requests() {
    let source = ScriptedSource::new(vec![]);
    let progress = RecordingProgress::default();
    let start = utc("2024-01-01T00:00:00Z");

    let result = Downloader::new(&source, &progress, &NullSink, fast_config())
        .download("BTCUSD", Resolution::Hour1, start, start)
        .unwrap();

    assert!(result.candles.is_empty());
    assert_eq!(result.status.percent_complete, 100.0);
    assert_eq!(result.status.calls_made, 0);
    assert!(source.windows_seen().is_empty());

    // Only the terminal status was emitted.
    assert_eq!(progress.statuses().len(), 1);
}

#[test]
fn boundary_overlap_between_windows_is_deduplicated() {
    // Adjacent requests can both return the candle sitting on their shared
    // boundary.
    let source = ScriptedSource::new(vec![ok(&[100, 200]), ok(&[200, 300])]);
    let progress = RecordingProgress::default();
    let (start, end) = range_of_hours(1001);

    let result = Downloader::new(&source, &progress, &NullSink, fast_config())
        .download("BTCUSD", Resolution::Hour1, start, end)
        .unwrap();

    let stamps: Vec<i64> = result
        .candles
        .iter()
        .map(|c| c.timestamp.timestamp())
        .collect();
    assert_eq!(stamps, vec![100, 200, 300]);
}
