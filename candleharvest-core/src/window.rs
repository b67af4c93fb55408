//! Request windowing arithmetic.
//!
//! A fetch over `[start, end)` is split into fixed-length windows of
//! `resolution_minutes × max_candles` minutes each, so every request stays
//! under the remote's per-request candle cap. The last window is truncated
//! to the (possibly clamped) end of the range.

use chrono::{DateTime, Duration, Utc};

use crate::resolution::Resolution;

/// Half-open time window `[start, end)` for a single candles request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// Window start as unix seconds (the wire format).
    pub fn start_unix(&self) -> i64 {
        self.start.timestamp()
    }

    /// Window end as unix seconds.
    pub fn end_unix(&self) -> i64 {
        self.end.timestamp()
    }

    /// How many candles of `resolution` fit in this window, rounding up.
    /// Used as the request `limit` parameter.
    pub fn candle_capacity(&self, resolution: Resolution) -> i64 {
        let span_secs = (self.end - self.start).num_seconds();
        let candle_secs = i64::from(resolution.minutes()) * 60;
        (span_secs + candle_secs - 1) / candle_secs
    }
}

/// Lazy, finite sequence of chronological windows covering a range.
///
/// Consuming the iterator advances a cursor; it cannot be rewound. A fresh
/// schedule must be planned for every fetch operation.
#[derive(Debug, Clone)]
pub struct WindowSchedule {
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
}

impl Iterator for WindowSchedule {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.cursor >= self.end {
            return None;
        }
        let window_end = (self.cursor + self.step).min(self.end);
        let window = Window {
            start: self.cursor,
            end: window_end,
        };
        self.cursor = window_end;
        Some(window)
    }
}

/// Plan the window sequence for a fetch.
///
/// `end` is clamped to `now` (truncated to the minute) when it lies in the
/// future — a request may never ask for unarrived data. Returns the schedule
/// and the expected request count. The count is advisory, for progress
/// estimation only: iteration may stop early when the operation aborts.
pub fn plan(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    resolution: Resolution,
    max_candles: u32,
    now: DateTime<Utc>,
) -> (WindowSchedule, u64) {
    let horizon = truncate_to_minute(now);
    let end = end.min(horizon);

    let step_minutes = i64::from(resolution.minutes()) * i64::from(max_candles.max(1));
    let step = Duration::minutes(step_minutes);

    let expected = if end <= start {
        0
    } else {
        let range_secs = (end - start).num_seconds();
        let step_secs = step.num_seconds();
        ((range_secs + step_secs - 1) / step_secs) as u64
    };

    (
        WindowSchedule {
            cursor: start,
            end,
            step,
        },
        expected,
    )
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(60), 0).unwrap()
}
