//! Historical bar sources.
//!
//! `BinanceFuturesSource` fetches closed klines from the USDⓈ-M futures
//! REST API. Handles retries with exponential backoff, rate-limit
//! responses, and a failure-count breaker that halts requests after
//! repeated consecutive errors.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, warn};
use vwapband_core::Bar;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("unexpected response shape: {0}")]
    ResponseFormat(String),

    #[error("source halted after {failures} consecutive failures")]
    Halted { failures: u32 },

    #[error("HTTP {status} from exchange")]
    Status { status: u16 },
}

/// A source of historical closed bars for one symbol.
pub trait HistoricalBarSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch up to `limit` closed bars starting at `start`, ascending.
    fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Bar>, SourceError>;
}

pub struct BinanceFuturesSource {
    client: reqwest::blocking::Client,
    base_url: String,
    interval: String,
    max_retries: u32,
    base_delay: Duration,
    consecutive_failures: AtomicU32,
    halt_after: u32,
}

impl BinanceFuturesSource {
    pub fn new(interval: impl Into<String>) -> Result<Self, SourceError> {
        Self::with_base_url("https://fapi.binance.com", interval)
    }

    /// Point the source at a different host. Used by tests and for
    /// region-specific mirrors.
    pub fn with_base_url(
        base_url: impl Into<String>,
        interval: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            interval: interval.into(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            consecutive_failures: AtomicU32::new(0),
            halt_after: 10,
        })
    }

    fn klines_url(&self, symbol: &str, start: DateTime<Utc>, limit: usize) -> String {
        format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&startTime={}&limit={}",
            self.base_url,
            symbol,
            self.interval,
            start.timestamp_millis(),
            limit
        )
    }

    fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    fn is_halted(&self) -> Option<u32> {
        let failures = self.consecutive_failures.load(Ordering::SeqCst);
        (failures >= self.halt_after).then_some(failures)
    }

    fn fetch_with_retry(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, SourceError> {
        if let Some(failures) = self.is_halted() {
            return Err(SourceError::Halted { failures });
        }

        let url = self.klines_url(symbol, start, limit);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                std::thread::sleep(delay);
            }

            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.record_failure();
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(SourceError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if !status.is_success() {
                        self.record_failure();
                        last_error = Some(SourceError::Status {
                            status: status.as_u16(),
                        });
                        continue;
                    }

                    let rows: Vec<serde_json::Value> = resp
                        .json()
                        .map_err(|e| SourceError::ResponseFormat(e.to_string()))?;
                    self.record_success();
                    return Ok(rows);
                }
                Err(e) => {
                    let failures = self.record_failure();
                    warn!(symbol, attempt, failures, error = %e, "klines request failed");
                    last_error = Some(SourceError::Network(e.to_string()));
                    if !(e.is_connect() || e.is_timeout()) {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::Network("max retries exceeded".into())))
    }
}

/// Parse Binance kline rows into closed bars for `symbol`.
///
/// Each row is `[open_time_ms, "open", "high", "low", "close", "volume",
/// close_time_ms, ...]` with prices as strings. Rows whose close time is
/// still in the future (the forming candle) are skipped.
pub fn parse_klines(
    symbol: &str,
    rows: &[serde_json::Value],
    now: DateTime<Utc>,
) -> Result<Vec<Bar>, SourceError> {
    let mut bars = Vec::with_capacity(rows.len());

    for row in rows {
        let fields = row
            .as_array()
            .ok_or_else(|| SourceError::ResponseFormat("kline row is not an array".into()))?;
        if fields.len() < 7 {
            return Err(SourceError::ResponseFormat(format!(
                "kline row has {} fields, expected at least 7",
                fields.len()
            )));
        }

        let open_time = fields[0]
            .as_i64()
            .ok_or_else(|| SourceError::ResponseFormat("open time is not an integer".into()))?;
        let close_time = fields[6]
            .as_i64()
            .ok_or_else(|| SourceError::ResponseFormat("close time is not an integer".into()))?;

        // Still-forming candle: volume and close are provisional.
        if close_time > now.timestamp_millis() {
            continue;
        }

        let timestamp = Utc
            .timestamp_millis_opt(open_time)
            .single()
            .ok_or_else(|| SourceError::ResponseFormat(format!("invalid open time {open_time}")))?;

        bars.push(Bar {
            symbol: symbol.to_string(),
            timestamp,
            open: price_field(fields, 1, "open")?,
            high: price_field(fields, 2, "high")?,
            low: price_field(fields, 3, "low")?,
            close: price_field(fields, 4, "close")?,
            volume: price_field(fields, 5, "volume")?,
        });
    }

    debug!(symbol, bars = bars.len(), "parsed klines");
    Ok(bars)
}

fn price_field(fields: &[serde_json::Value], index: usize, name: &str) -> Result<f64, SourceError> {
    fields[index]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| SourceError::ResponseFormat(format!("{name} is not a numeric string")))
}

impl HistoricalBarSource for BinanceFuturesSource {
    fn name(&self) -> &str {
        "binance_futures"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Bar>, SourceError> {
        let rows = self.fetch_with_retry(symbol, start, limit)?;
        parse_klines(symbol, &rows, Utc::now())
    }
}
