use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct Metrics {
    exchanges: AtomicU64,
    failed_exchanges: AtomicU64,
    rejected_sends: AtomicU64,
    utterances: AtomicU64,
    playback_cancellations: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_exchanges(&self) {
        self.exchanges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed_exchanges(&self) {
        self.failed_exchanges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected_sends(&self) {
        self.rejected_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_utterances(&self) {
        self.utterances.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_playback_cancellations(&self) {
        self.playback_cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            exchanges: self.exchanges.load(Ordering::Relaxed),
            failed_exchanges: self.failed_exchanges.load(Ordering::Relaxed),
            rejected_sends: self.rejected_sends.load(Ordering::Relaxed),
            utterances: self.utterances.load(Ordering::Relaxed),
            playback_cancellations: self.playback_cancellations.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Sends that reached the completion client.
    pub exchanges: u64,
    pub failed_exchanges: u64,
    /// Empty or concurrent sends that were dropped.
    pub rejected_sends: u64,
    pub utterances: u64,
    pub playback_cancellations: u64,
}

impl MetricsSnapshot {
    pub fn exchange_success_rate(&self) -> f64 {
        if self.exchanges == 0 {
            return 1.0;
        }
        1.0 - (self.failed_exchanges as f64 / self.exchanges as f64)
    }
}
