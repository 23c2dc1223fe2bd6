use crate::sync::Substream;
use crossbeam::channel::{bounded, select, tick, Sender};
use log::{info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Period of the desynchronization check
pub const DEFAULT_WATCHDOG_PERIOD: Duration = Duration::from_secs(30);

/// A substream is reported when it received more than this many messages per emitted tuple
pub const DEFAULT_DESYNC_RATIO: usize = 3;

/// Cumulative receive/emit counters written by the synchronizer
///
#[derive(Debug, Default)]
pub struct SyncCounters {
    received: [AtomicUsize; 5],
    emitted: AtomicUsize,
}

impl SyncCounters {
    pub fn record_received(&self, substream: Substream) {
        self.received[substream.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        let mut received = [0; 5];
        for (r, c) in received.iter_mut().zip(self.received.iter()) {
            *r = c.load(Ordering::Relaxed);
        }
        SyncSnapshot {
            received,
            emitted: self.emitted.load(Ordering::Relaxed),
        }
    }
}

/// Point in time copy of [SyncCounters](SyncCounters)
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub received: [usize; 5],
    pub emitted: usize,
}

impl SyncSnapshot {
    pub fn received(&self, substream: Substream) -> usize {
        self.received[substream.index()]
    }

    /// Substreams that received more than `ratio` times the number of emitted tuples
    ///
    pub fn desynchronized(&self, ratio: usize) -> Vec<Substream> {
        let threshold = ratio.saturating_mul(self.emitted);
        Substream::ALL
            .into_iter()
            .filter(|s| self.received(*s) > threshold)
            .collect()
    }
}

fn report(snapshot: &SyncSnapshot, ratio: usize) {
    let lagging = snapshot.desynchronized(ratio);
    if lagging.is_empty() {
        return;
    }
    let counts = Substream::ALL
        .iter()
        .map(|s| format!("{}={}", s.name(), snapshot.received(*s)))
        .collect::<Vec<_>>()
        .join(", ");
    warn!(
        "Inputs are not synchronized, check the producer clocks and the transport. \
         Received: {}; synchronized tuples: {}; affected: {:?}",
        counts, snapshot.emitted, lagging
    );
}

/// Thread that periodically compares the counters and warns about desynchronized inputs.
///
/// The watchdog only reads the counters; it is stopped and joined on drop.
///
pub struct DesyncWatchdog {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DesyncWatchdog {
    pub fn spawn(counters: Arc<SyncCounters>, period: Duration, ratio: usize) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        info!(
            "Input synchronization is checked every {:?} (ratio {})",
            period, ratio
        );
        let thread = thread::spawn(move || {
            let ticker = tick(period);
            loop {
                select! {
                    recv(ticker) -> _ => report(&counters.snapshot(), ratio),
                    recv(stop_rx) -> _ => break,
                }
            }
        });
        Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        }
    }
}

impl Drop for DesyncWatchdog {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .expect("Watchdog thread is expected to shutdown successfully.");
        }
    }
}
