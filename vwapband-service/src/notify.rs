//! Signal notification: batch grouping, Markdown rendering, delivery sinks.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use vwapband_core::{SignalEvent, SignalKind};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(String),

    #[error("telegram rejected the message: {0}")]
    Rejected(String),
}

/// Where rendered signal messages go. The batcher thread owns one sink.
pub trait NotificationSink: Send {
    fn deliver(&self, text: &str) -> Result<(), NotifyError>;
}

/// Signals grouped into the three report sections.
#[derive(Debug, Default, Clone)]
pub struct SignalBatch {
    pub entries: Vec<SignalEvent>,
    pub exits: Vec<SignalEvent>,
    pub stops: Vec<SignalEvent>,
}

impl SignalBatch {
    pub fn group(events: impl IntoIterator<Item = SignalEvent>) -> Self {
        let mut batch = Self::default();
        for event in events {
            match event.kind {
                SignalKind::Buy | SignalKind::Sell | SignalKind::ScaleInBuy | SignalKind::ScaleInSell => {
                    batch.entries.push(event)
                }
                SignalKind::ExitLong | SignalKind::ExitShort | SignalKind::Tp1 => {
                    batch.exits.push(event)
                }
                SignalKind::StopLoss => batch.stops.push(event),
            }
        }
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.exits.is_empty() && self.stops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.exits.len() + self.stops.len()
    }
}

const RULE: &str = "━━━━━━━━━━━━━━━━━━\n";

/// Render a batch as one Markdown message: entries first (buys before
/// sells), then exit reports, then stop-losses, with a UTC timestamp footer.
pub fn format_batch(batch: &SignalBatch, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    if !batch.entries.is_empty() {
        out.push_str("📣 *SIGNALS DETECTED*\n");
        out.push_str(RULE);

        let buys = batch.entries.iter().filter(|e| is_buy_side(e.kind));
        let sells = batch.entries.iter().filter(|e| !is_buy_side(e.kind));
        let mut counter = 1;
        for event in buys.chain(sells) {
            let emoji = match event.kind {
                SignalKind::Buy => "🟢",
                SignalKind::ScaleInBuy => "🟢🟢",
                SignalKind::Sell => "🔴",
                _ => "🔴🔴",
            };
            out.push_str(&format!(
                "{counter}. {emoji} *{} #{}*\n   Entry: {:.4}\n",
                event.kind.label(),
                event.symbol,
                event.entry_price,
            ));
            if let Some(stop) = event.stop_price {
                out.push_str(&format!("   SL: {stop:.4}\n"));
            }
            out.push('\n');
            counter += 1;
        }
    }

    if !batch.exits.is_empty() {
        if !out.is_empty() {
            out.push_str(RULE);
        }
        out.push_str("🔔 *EXIT REPORTS*\n");
        out.push_str(RULE);

        for (i, event) in batch.exits.iter().enumerate() {
            out.push_str(&format!(
                "{}. 🟡 *{} #{}*\n",
                i + 1,
                event.kind.label(),
                event.symbol
            ));
            if let Some(peak) = event.peak_profit_pct {
                out.push_str(&format!("   Peak: {peak:.2}%\n"));
            }
            if let Some(exit) = event.exit_price {
                out.push_str(&format!("   Exit: {exit:.4}\n"));
            }
            if let Some(reason) = &event.reason {
                out.push_str(&format!("   Reason: {reason}\n"));
            }
            out.push('\n');
        }
    }

    if !batch.stops.is_empty() {
        if !out.is_empty() {
            out.push_str(RULE);
        }
        out.push_str("🛑 *STOPLOSS HIT*\n");
        out.push_str(RULE);

        for (i, event) in batch.stops.iter().enumerate() {
            out.push_str(&format!(
                "{}. *#{}*\n   Entry: {:.4}\n",
                i + 1,
                event.symbol,
                event.entry_price
            ));
            if let Some(stop) = event.stop_price {
                out.push_str(&format!("   Exit: {stop:.4}\n"));
            }
            if let Some(peak) = event.peak_profit_pct {
                out.push_str(&format!("   Peak: {peak:.2}%\n"));
            }
            out.push('\n');
        }
    }

    out.push_str(RULE);
    out.push_str(&format!("⏰ Time: {} UTC", now.format("%H:%M:%S")));
    out
}

fn is_buy_side(kind: SignalKind) -> bool {
    matches!(kind, SignalKind::Buy | SignalKind::ScaleInBuy)
}

/// Delivers messages to a Telegram chat via the Bot API.
pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    base_url: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self, NotifyError> {
        Self::with_base_url("https://api.telegram.org", token, chat_id)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            chat_id: chat_id.into(),
        })
    }

    fn send_once(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        let payload: serde_json::Value = resp
            .json()
            .map_err(|e| NotifyError::Network(e.to_string()))?;
        if payload.get("ok").and_then(|v| v.as_bool()) == Some(true) {
            Ok(())
        } else {
            let description = payload
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_string();
            Err(NotifyError::Rejected(description))
        }
    }
}

impl NotificationSink for TelegramNotifier {
    fn deliver(&self, text: &str) -> Result<(), NotifyError> {
        match self.send_once(text) {
            Ok(()) => Ok(()),
            // One retry after a short pause covers transient rate limits.
            Err(first) => {
                warn!(error = %first, "telegram send failed, retrying");
                std::thread::sleep(Duration::from_secs(5));
                self.send_once(text)
            }
        }
    }
}

/// Fallback sink for headless runs: messages go to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, text: &str) -> Result<(), NotifyError> {
        info!(message = %text, "signal notification");
        Ok(())
    }
}
