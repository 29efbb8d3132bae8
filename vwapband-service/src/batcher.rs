//! Debouncing signal batcher.
//!
//! Signals often fire for several symbols on the same closed minute. Each
//! arriving event restarts the flush window; once no event has arrived for a
//! full window the batcher delivers a single grouped message instead of a
//! burst.

use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error};
use vwapband_core::SignalEvent;

use crate::notify::{format_batch, NotificationSink, SignalBatch};

/// Cloneable handle; dropping every handle stops the worker after a final
/// flush.
#[derive(Clone)]
pub struct SignalBatcher {
    tx: mpsc::Sender<SignalEvent>,
}

impl SignalBatcher {
    /// Spawn the batcher worker around `sink`.
    pub fn spawn(
        sink: Box<dyn NotificationSink>,
        window: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<SignalEvent>();
        let handle = std::thread::Builder::new()
            .name("signal-batcher".into())
            .spawn(move || run_worker(rx, sink, window))
            .expect("failed to spawn batcher thread");
        (Self { tx }, handle)
    }

    /// Queue one event. Quietly drops the event if the worker has exited.
    pub fn submit(&self, event: SignalEvent) {
        if self.tx.send(event).is_err() {
            error!("signal batcher is gone, dropping event");
        }
    }

    pub fn submit_all(&self, events: impl IntoIterator<Item = SignalEvent>) {
        for event in events {
            self.submit(event);
        }
    }
}

fn run_worker(rx: mpsc::Receiver<SignalEvent>, sink: Box<dyn NotificationSink>, window: Duration) {
    let mut pending: Vec<SignalEvent> = Vec::new();
    let mut flush_at: Option<Instant> = None;

    loop {
        let received = match flush_at {
            // Idle: block until the first event of the next batch.
            None => match rx.recv() {
                Ok(event) => Some(event),
                Err(_) => break,
            },
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    None
                } else {
                    match rx.recv_timeout(deadline - now) {
                        Ok(event) => Some(event),
                        Err(mpsc::RecvTimeoutError::Timeout) => None,
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            }
        };

        match received {
            Some(event) => {
                // Every arrival pushes the deadline out again, so a burst
                // settles into one message no matter how long it runs.
                flush_at = Some(Instant::now() + window);
                pending.push(event);
            }
            None => {
                flush(&mut pending, sink.as_ref());
                flush_at = None;
            }
        }
    }

    // Channel closed: deliver whatever is still queued.
    flush(&mut pending, sink.as_ref());
}

fn flush(pending: &mut Vec<SignalEvent>, sink: &dyn NotificationSink) {
    if pending.is_empty() {
        return;
    }
    let batch = SignalBatch::group(pending.drain(..));
    debug!(signals = batch.len(), "flushing signal batch");
    let text = format_batch(&batch, chrono::Utc::now());
    if let Err(e) = sink.deliver(&text) {
        error!(error = %e, "failed to deliver signal batch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::{Arc, Mutex};
    use vwapband_core::SignalKind;

    #[derive(Clone, Default)]
    struct CapturingSink {
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl NotificationSink for CapturingSink {
        fn deliver(&self, text: &str) -> Result<(), crate::notify::NotifyError> {
            self.messages.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn event(symbol: &str) -> SignalEvent {
        SignalEvent::entry(
            SignalKind::Buy,
            symbol,
            100.0,
            97.0,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn batches_burst_into_one_message() {
        let sink = CapturingSink::default();
        let messages = sink.messages.clone();
        let (batcher, handle) = SignalBatcher::spawn(Box::new(sink), Duration::from_millis(50));

        batcher.submit(event("ETHUSDT"));
        batcher.submit(event("BTCUSDT"));
        batcher.submit(event("SOLUSDT"));
        std::thread::sleep(Duration::from_millis(200));

        drop(batcher);
        handle.join().unwrap();

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("ETHUSDT"));
        assert!(messages[0].contains("BTCUSDT"));
        assert!(messages[0].contains("SOLUSDT"));
    }

    #[test]
    fn trickle_within_the_window_stays_one_message() {
        let sink = CapturingSink::default();
        let messages = sink.messages.clone();
        let (batcher, handle) = SignalBatcher::spawn(Box::new(sink), Duration::from_millis(100));

        // Each gap is shorter than the window but the run as a whole is
        // longer. The restarting deadline must hold the flush until the
        // trickle stops.
        batcher.submit(event("ETHUSDT"));
        std::thread::sleep(Duration::from_millis(60));
        batcher.submit(event("BTCUSDT"));
        std::thread::sleep(Duration::from_millis(60));
        batcher.submit(event("SOLUSDT"));
        std::thread::sleep(Duration::from_millis(300));

        drop(batcher);
        handle.join().unwrap();

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("SOLUSDT"));
    }

    #[test]
    fn separate_windows_produce_separate_messages() {
        let sink = CapturingSink::default();
        let messages = sink.messages.clone();
        let (batcher, handle) = SignalBatcher::spawn(Box::new(sink), Duration::from_millis(20));

        batcher.submit(event("ETHUSDT"));
        std::thread::sleep(Duration::from_millis(150));
        batcher.submit(event("BTCUSDT"));
        std::thread::sleep(Duration::from_millis(150));

        drop(batcher);
        handle.join().unwrap();

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn pending_events_flush_on_shutdown() {
        let sink = CapturingSink::default();
        let messages = sink.messages.clone();
        // Long window: shutdown must not wait for it.
        let (batcher, handle) = SignalBatcher::spawn(Box::new(sink), Duration::from_secs(60));

        batcher.submit(event("ETHUSDT"));
        drop(batcher);
        handle.join().unwrap();

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
    }
}
