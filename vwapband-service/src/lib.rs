//! Service shell around `vwapband-core`.
//!
//! The core crate is pure and synchronous; everything that touches the
//! outside world lives here: TOML configuration, the Binance klines source,
//! session backfill and catch-up, the polling feed loop, the notification
//! batcher, Telegram delivery, and the bot command handler.

pub mod backfill;
pub mod batcher;
pub mod commands;
pub mod config;
pub mod feed;
pub mod hub;
pub mod notify;
pub mod runner;
pub mod source;

pub use backfill::{catch_up, session_backfill, BackfillReport};
pub use batcher::SignalBatcher;
pub use commands::{Command, CommandHandler, TelegramCommandPoller};
pub use config::{AppConfig, ConfigError, FeedConfig, NotifyConfig, TelegramConfig};
pub use feed::{drive_feed, BarFeed, ChannelFeed, FeedError, PollingFeed};
pub use hub::{EngineHub, StatusSnapshot, SymbolStatus};
pub use notify::{format_batch, LogSink, NotificationSink, NotifyError, SignalBatch, TelegramNotifier};
pub use runner::{run, run_with};
pub use source::{BinanceFuturesSource, HistoricalBarSource, SourceError};
