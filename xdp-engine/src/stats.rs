//! Per-endpoint counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the batch operations. Shared through an `Arc` so a
/// reporter thread can read them while the endpoint runs.
#[derive(Debug, Default)]
pub struct Stats {
    rx_packets: AtomicU64,
    rx_bytes: AtomicU64,
    tx_packets: AtomicU64,
    tx_bytes: AtomicU64,
    tx_completions: AtomicU64,
    rx_wakeups: AtomicU64,
    tx_wakeups: AtomicU64,
    wakeup_errors: AtomicU64,
    fill_retries: AtomicU64,
    tx_ring_full: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rx(&self, packets: u64, bytes: u64) {
        self.rx_packets.fetch_add(packets, Ordering::Relaxed);
        self.rx_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_tx(&self, packets: u64, bytes: u64) {
        self.tx_packets.fetch_add(packets, Ordering::Relaxed);
        self.tx_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_completions(&self, count: u64) {
        self.tx_completions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_rx_wakeup(&self) {
        self.rx_wakeups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx_wakeup(&self) {
        self.tx_wakeups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wakeup_error(&self) {
        self.wakeup_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fill_retry(&self) {
        self.fill_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx_ring_full(&self) {
        self.tx_ring_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            tx_completions: self.tx_completions.load(Ordering::Relaxed),
            rx_wakeups: self.rx_wakeups.load(Ordering::Relaxed),
            tx_wakeups: self.tx_wakeups.load(Ordering::Relaxed),
            wakeup_errors: self.wakeup_errors.load(Ordering::Relaxed),
            fill_retries: self.fill_retries.load(Ordering::Relaxed),
            tx_ring_full: self.tx_ring_full.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.rx_packets,
            &self.rx_bytes,
            &self.tx_packets,
            &self.tx_bytes,
            &self.tx_completions,
            &self.rx_wakeups,
            &self.tx_wakeups,
            &self.wakeup_errors,
            &self.fill_retries,
            &self.tx_ring_full,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Plain copy of [`Stats`] for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub tx_completions: u64,
    pub rx_wakeups: u64,
    pub tx_wakeups: u64,
    /// Wakeup syscalls that failed with something other than a transient errno.
    pub wakeup_errors: u64,
    /// Receive batches that had to retry the fill ring reservation.
    pub fill_retries: u64,
    /// Send batches that found the tx ring full.
    pub tx_ring_full: u64,
}

impl StatsSnapshot {
    /// Packets per second over `duration_secs`.
    pub fn rx_pps(&self, duration_secs: f64) -> f64 {
        if duration_secs > 0.0 {
            self.rx_packets as f64 / duration_secs
        } else {
            0.0
        }
    }

    pub fn tx_pps(&self, duration_secs: f64) -> f64 {
        if duration_secs > 0.0 {
            self.tx_packets as f64 / duration_secs
        } else {
            0.0
        }
    }
}
