//! Progress status computation and reporting sinks.

use serde::Serialize;

/// Snapshot of download progress, produced after every successful window
/// fetch and once more terminally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchStatus {
    pub symbol: String,
    /// 0–100, monotonically non-decreasing within one fetch; exactly 100 on
    /// the terminal record.
    pub percent_complete: f64,
    pub calls_made: u64,
    pub calls_expected: u64,
    pub elapsed_secs: f64,
    pub eta_secs: f64,
}

impl FetchStatus {
    /// Compute a progress snapshot. Pure in the call counts and elapsed
    /// wall-clock time.
    ///
    /// The expected count is advisory (the schedule may end early), so the
    /// percentage is capped at 100. ETA extrapolates the observed pace over
    /// the remaining calls and is zero before the first call completes.
    pub fn compute(symbol: &str, calls_made: u64, calls_expected: u64, elapsed_secs: f64) -> Self {
        let percent = if calls_expected == 0 {
            100.0
        } else {
            (calls_made as f64 / calls_expected as f64 * 100.0).min(100.0)
        };
        let eta = if calls_made == 0 {
            0.0
        } else {
            elapsed_secs / calls_made as f64 * calls_expected.saturating_sub(calls_made) as f64
        };

        FetchStatus {
            symbol: symbol.to_string(),
            percent_complete: round2(percent),
            calls_made,
            calls_expected,
            elapsed_secs: round2(elapsed_secs),
            eta_secs: round2(eta),
        }
    }

    /// Terminal snapshot: percentage pinned to exactly 100, ETA zero, and
    /// the expected count settled to the calls actually made.
    pub fn terminal(symbol: &str, calls_made: u64, elapsed_secs: f64) -> Self {
        FetchStatus {
            symbol: symbol.to_string(),
            percent_complete: 100.0,
            calls_made,
            calls_expected: calls_made,
            elapsed_secs: round2(elapsed_secs),
            eta_secs: 0.0,
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Receives progress snapshots during a fetch.
///
/// Invoked synchronously on the fetch loop's thread; a slow implementation
/// slows the fetch, it does not corrupt it.
pub trait ProgressSink: Send {
    fn update(&self, status: &FetchStatus);
}

/// Prints one line per update to stdout.
pub struct StdoutProgress;

impl ProgressSink for StdoutProgress {
    fn update(&self, status: &FetchStatus) {
        println!(
            "[{}] {:.2}% ({}/{} calls, {:.0}s elapsed, ~{:.0}s remaining)",
            status.symbol,
            status.percent_complete,
            status.calls_made,
            status.calls_expected,
            status.elapsed_secs,
            status.eta_secs,
        );
    }
}

/// Discards all updates.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn update(&self, _status: &FetchStatus) {}
}
