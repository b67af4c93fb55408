//! Delta-shaped exchange client.
//!
//! Issues exactly one HTTP request per window against the candles endpoint
//! and classifies the response into success / rate-limited / transient /
//! fatal outcomes. Retry policy lives in the orchestrator, not here — this
//! layer only says what happened.

use serde::Deserialize;
use std::time::Duration;

use crate::error::DownloadError;
use crate::normalize::RawKline;
use crate::resolution::Resolution;
use crate::window::Window;

/// Production API host.
pub const DEFAULT_BASE_URL: &str = "https://api.india.delta.exchange";

/// Wait applied when a 429 carries no usable reset header.
const RATE_LIMIT_FALLBACK: Duration = Duration::from_secs(60);

/// Response header carrying the unix second at which the quota resets.
const RATE_LIMIT_RESET_HEADER: &str = "X-RATE-LIMIT-RESET";

/// Outcome of a single window fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Rows extracted from a success body.
    Success(Vec<RawKline>),
    /// HTTP 429. The same window is retried after the wait; never charged
    /// to the error budget.
    RateLimited { wait: Duration },
    /// Recoverable failure, retried up to the per-window error budget.
    Transient(String),
    /// The request itself is wrong; retrying cannot succeed.
    Fatal(String),
}

/// A paginated candle source.
///
/// Implementations issue one remote request per window. The trait exists so
/// the orchestrator can be driven by scripted fakes in tests.
pub trait CandleSource: Send + Sync {
    /// Name recorded in checkpoint metadata (e.g. `"delta"`).
    fn name(&self) -> &str;

    /// Fetch candles for one window.
    fn fetch_window(&self, symbol: &str, resolution: Resolution, window: &Window) -> FetchOutcome;
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    success: bool,
    #[serde(default)]
    result: Vec<RawKline>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

impl ApiError {
    fn message_or_unknown(self) -> String {
        self.message.unwrap_or_else(|| "unknown error".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    success: bool,
    #[serde(default)]
    result: Vec<Product>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Product {
    symbol: String,
    state: String,
}

// ── Client ──────────────────────────────────────────────────────────

/// Blocking HTTP client for the candles and products endpoints.
pub struct DeltaClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl DeltaClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("candleharvest/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Symbols of all live products, sorted ascending.
    pub fn available_symbols(&self) -> Result<Vec<String>, DownloadError> {
        let url = format!("{}/v2/products", self.base_url);

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| DownloadError::Api(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Api(format!(
                "HTTP {status} from products endpoint"
            )));
        }

        let body: ProductsResponse = resp
            .json()
            .map_err(|e| DownloadError::Api(format!("malformed products response: {e}")))?;

        if !body.success {
            let msg = body
                .error
                .map(ApiError::message_or_unknown)
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(DownloadError::Api(msg));
        }

        Ok(live_symbols(body.result))
    }
}

impl Default for DeltaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CandleSource for DeltaClient {
    fn name(&self) -> &str {
        "delta"
    }

    fn fetch_window(&self, symbol: &str, resolution: Resolution, window: &Window) -> FetchOutcome {
        let url = format!("{}/v2/history/candles", self.base_url);

        let result = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("resolution", resolution.token())])
            .query(&[
                ("start", window.start_unix()),
                ("end", window.end_unix()),
                ("limit", window.candle_capacity(resolution)),
            ])
            .send();

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => return FetchOutcome::Transient(format!("request failed: {e}")),
        };

        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let reset = resp
                .headers()
                .get(RATE_LIMIT_RESET_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok());
            let wait = rate_limit_wait(reset, chrono::Utc::now().timestamp());
            return FetchOutcome::RateLimited { wait };
        }

        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::NOT_FOUND {
            return FetchOutcome::Fatal(format!("HTTP {status} for {symbol}"));
        }

        if !status.is_success() {
            return FetchOutcome::Transient(format!("HTTP {status} for {symbol}"));
        }

        let body: CandlesResponse = match resp.json() {
            Ok(body) => body,
            Err(e) => return FetchOutcome::Transient(format!("malformed candles response: {e}")),
        };

        if !body.success {
            let msg = body
                .error
                .map(ApiError::message_or_unknown)
                .unwrap_or_else(|| "unknown error".to_string());
            log::warn!("candles request for {symbol} rejected: {msg}");
            return FetchOutcome::Transient(msg);
        }

        FetchOutcome::Success(body.result)
    }
}

/// Wait derived from a 429 reset header: `reset − now` floored at zero, or
/// the 60s fallback when the header is absent or unparseable.
pub fn rate_limit_wait(reset_unix: Option<i64>, now_unix: i64) -> Duration {
    match reset_unix {
        Some(reset) => Duration::from_secs(reset.saturating_sub(now_unix).max(0) as u64),
        None => RATE_LIMIT_FALLBACK,
    }
}

fn live_symbols(products: Vec<Product>) -> Vec<String> {
    let mut symbols: Vec<String> = products
        .into_iter()
        .filter(|p| p.state == "live")
        .map(|p| p.symbol)
        .collect();
    symbols.sort();
    symbols
}
