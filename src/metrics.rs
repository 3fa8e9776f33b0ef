//! Process-memory counters for conditions the core absorbs rather than
//! propagates as errors (§7). Nothing here is persisted; a caller that
//! wants visibility takes a [`Snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Counter(AtomicU64);

impl Counter {
    fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// All counters the core maintains.
///
/// The `rx_drops_*` / `decode_drops` counters are required by §4.2/§6.4;
/// the tx/rx frame and byte counters restore the fuller set the source's
/// `core/metrics.py` tracked but the distillation narrowed to drops only.
#[derive(Debug, Default)]
pub struct Metrics {
    pub rx_drops_short: Counter,
    pub rx_drops_ethertype: Counter,
    pub rx_drops_subtype: Counter,
    pub rx_drops_length: Counter,
    pub rx_drops_stream_id: Counter,
    pub decode_drops: Counter,
    pub tx_frames: Counter,
    pub rx_frames: Counter,
    pub tx_bytes: Counter,
    pub rx_bytes: Counter,
    pub tx_errors: Counter,
    pub rx_errors: Counter,
    pub task_auto_disabled: Counter,
    pub receiver_shutdown_timeouts: Counter,
}

/// A point-in-time copy of every counter, safe to log or compare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub rx_drops_short: u64,
    pub rx_drops_ethertype: u64,
    pub rx_drops_subtype: u64,
    pub rx_drops_length: u64,
    pub rx_drops_stream_id: u64,
    pub decode_drops: u64,
    pub tx_frames: u64,
    pub rx_frames: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_errors: u64,
    pub rx_errors: u64,
    pub task_auto_disabled: u64,
    pub receiver_shutdown_timeouts: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            rx_drops_short: self.rx_drops_short.get(),
            rx_drops_ethertype: self.rx_drops_ethertype.get(),
            rx_drops_subtype: self.rx_drops_subtype.get(),
            rx_drops_length: self.rx_drops_length.get(),
            rx_drops_stream_id: self.rx_drops_stream_id.get(),
            decode_drops: self.decode_drops.get(),
            tx_frames: self.tx_frames.get(),
            rx_frames: self.rx_frames.get(),
            tx_bytes: self.tx_bytes.get(),
            rx_bytes: self.rx_bytes.get(),
            tx_errors: self.tx_errors.get(),
            rx_errors: self.rx_errors.get(),
            task_auto_disabled: self.task_auto_disabled.get(),
            receiver_shutdown_timeouts: self.receiver_shutdown_timeouts.get(),
        }
    }

    pub fn mark_tx(&self, bytes: usize) {
        self.tx_frames.incr();
        self.tx_bytes.0.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn mark_rx(&self, bytes: usize) {
        self.rx_frames.incr();
        self.rx_bytes.0.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn mark_tx_error(&self) {
        self.tx_errors.incr();
    }

    pub fn mark_rx_error(&self) {
        self.rx_errors.incr();
    }

    pub fn mark_decode_drop(&self) {
        self.decode_drops.incr();
    }

    pub fn mark_task_auto_disabled(&self) {
        self.task_auto_disabled.incr();
    }

    pub fn mark_receiver_shutdown_timeout(&self) {
        self.receiver_shutdown_timeouts.incr();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let m = Metrics::new();
        m.mark_tx(10);
        m.mark_rx(20);
        m.decode_drops.incr();
        let snap = m.snapshot();
        assert_eq!(snap.tx_frames, 1);
        assert_eq!(snap.tx_bytes, 10);
        assert_eq!(snap.rx_frames, 1);
        assert_eq!(snap.rx_bytes, 20);
        assert_eq!(snap.decode_drops, 1);
    }
}
