//! Service wiring: build everything from an `AppConfig` and run until the
//! feed closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};

use crate::backfill::{catch_up, session_backfill};
use crate::batcher::SignalBatcher;
use crate::commands::{CommandHandler, TelegramCommandPoller};
use crate::config::AppConfig;
use crate::feed::{drive_feed, BarFeed, PollingFeed};
use crate::hub::EngineHub;
use crate::notify::{LogSink, NotificationSink, TelegramNotifier};
use crate::source::{BinanceFuturesSource, HistoricalBarSource};

/// Run the service with the default polling feed against Binance futures.
pub fn run(config: AppConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;

    let source: Arc<dyn HistoricalBarSource> = Arc::new(
        BinanceFuturesSource::new(config.interval.clone())
            .context("failed to build bar source")?,
    );
    let mut feed = PollingFeed::new(
        source.clone(),
        config.symbols.clone(),
        Utc::now(),
        Duration::from_secs(config.feed.poll_interval_secs),
        config.feed.catchup_page,
    );
    run_with(config, source, &mut feed)
}

/// Run with an explicit source and feed. Tests and alternative transports
/// enter here.
pub fn run_with(
    config: AppConfig,
    source: Arc<dyn HistoricalBarSource>,
    feed: &mut dyn BarFeed,
) -> anyhow::Result<()> {
    let hub = Arc::new(EngineHub::new(&config.symbols, config.engine.clone()));

    info!(
        symbols = config.symbols.len(),
        interval = %config.interval,
        "starting vwapband service"
    );

    // Replay today's session before going live; signals emitted here are
    // history, not news.
    let report = session_backfill(&hub, &source, Utc::now());
    if report.failures > 0 {
        warn!(failures = report.failures, "backfill incomplete, engines will catch up");
    }

    let sink: Box<dyn NotificationSink> = if config.telegram.is_usable() {
        Box::new(
            TelegramNotifier::new(config.telegram.token.clone(), config.telegram.chat_id.clone())
                .context("failed to build telegram notifier")?,
        )
    } else {
        info!("telegram disabled, signals will be logged");
        Box::new(LogSink)
    };
    let (batcher, batcher_handle) =
        SignalBatcher::spawn(sink, Duration::from_millis(config.notify.batch_window_ms));

    // Catch-up sweeper: fetch anything the live feed misses. It holds a
    // batcher clone, so it must observe shutdown and drop it before the
    // batcher worker can exit.
    let stopping = Arc::new(AtomicBool::new(false));
    let catch_up_handle = {
        let hub = hub.clone();
        let source = source.clone();
        let batcher = batcher.clone();
        let stopping = stopping.clone();
        let interval = Duration::from_secs(config.feed.catchup_interval_secs);
        let lag_secs = config.feed.catchup_lag_secs;
        let page = config.feed.catchup_page;
        std::thread::Builder::new()
            .name("catch-up".into())
            .spawn(move || {
                let mut elapsed = Duration::ZERO;
                let tick = Duration::from_millis(250);
                while !stopping.load(Ordering::SeqCst) {
                    std::thread::sleep(tick);
                    elapsed += tick;
                    if elapsed >= interval {
                        elapsed = Duration::ZERO;
                        catch_up(&hub, &source, &batcher, Utc::now(), lag_secs, page);
                    }
                }
            })
            .context("failed to spawn catch-up thread")?
    };

    if config.telegram.is_usable() {
        let handler = CommandHandler::new(hub.clone(), config.clone());
        let mut poller = TelegramCommandPoller::new(config.telegram.token.clone(), handler)
            .context("failed to build command poller")?;
        std::thread::Builder::new()
            .name("telegram-commands".into())
            .spawn(move || poller.run())
            .context("failed to spawn command poller thread")?;
    }

    let result = drive_feed(feed, &hub, &batcher);

    stopping.store(true, Ordering::SeqCst);
    if catch_up_handle.join().is_err() {
        warn!("catch-up thread panicked during shutdown");
    }
    // Dropping the last batcher handle lets the worker flush and exit.
    drop(batcher);
    if batcher_handle.join().is_err() {
        warn!("batcher thread panicked during shutdown");
    }

    result.context("feed loop failed")
}
