// =============================================================================
// Telemetry — order-lifecycle counters and latency window
// =============================================================================
//
// Grounded on `app_state::AppState`'s atomic counters (`AtomicU64` fields
// bumped from hot paths, read without locking) and `cache::TtlCache`'s
// `parking_lot::RwLock` idiom for the one piece of state that isn't a plain
// counter: a bounded rolling window of recent latencies.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

const LATENCY_WINDOW: usize = 256;

#[derive(Debug, Default)]
pub struct Telemetry {
    orders_attempted: AtomicU64,
    orders_filled: AtomicU64,
    orders_failed: AtomicU64,
    orders_recorded: AtomicU64,
    latencies_ms: Mutex<VecDeque<u64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub orders_attempted: u64,
    pub orders_filled: u64,
    pub orders_failed: u64,
    pub orders_recorded: u64,
    pub latency_p50_ms: Option<u64>,
    pub latency_p99_ms: Option<u64>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_order_attempt(&self) {
        self.orders_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order_filled(&self) {
        self.orders_filled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order_failed(&self) {
        self.orders_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// An idempotent replay: a `client_order_id` that was already on disk,
    /// so no new order was placed.
    pub fn record_order_recorded(&self) {
        self.orders_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one request's latency, dropping the oldest sample once the
    /// window is full.
    pub fn record_latency_ms(&self, latency_ms: u64) {
        let mut window = self.latencies_ms.lock();
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(latency_ms);
    }

    fn percentile(sorted: &[u64], pct: f64) -> u64 {
        if sorted.is_empty() {
            return 0;
        }
        let idx = ((sorted.len() - 1) as f64 * pct).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let mut samples: Vec<u64> = self.latencies_ms.lock().iter().copied().collect();
        samples.sort_unstable();

        TelemetrySnapshot {
            orders_attempted: self.orders_attempted.load(Ordering::Relaxed),
            orders_filled: self.orders_filled.load(Ordering::Relaxed),
            orders_failed: self.orders_failed.load(Ordering::Relaxed),
            orders_recorded: self.orders_recorded.load(Ordering::Relaxed),
            latency_p50_ms: (!samples.is_empty()).then(|| Self::percentile(&samples, 0.50)),
            latency_p99_ms: (!samples.is_empty()).then(|| Self::percentile(&samples, 0.99)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let telemetry = Telemetry::new();
        let snap = telemetry.snapshot();
        assert_eq!(snap.orders_attempted, 0);
        assert_eq!(snap.latency_p50_ms, None);
    }

    #[test]
    fn counters_increment() {
        let telemetry = Telemetry::new();
        telemetry.record_order_attempt();
        telemetry.record_order_attempt();
        telemetry.record_order_filled();
        let snap = telemetry.snapshot();
        assert_eq!(snap.orders_attempted, 2);
        assert_eq!(snap.orders_filled, 1);
    }

    #[test]
    fn recorded_replay_counter_increments() {
        let telemetry = Telemetry::new();
        telemetry.record_order_recorded();
        telemetry.record_order_recorded();
        assert_eq!(telemetry.snapshot().orders_recorded, 2);
    }

    #[test]
    fn latency_window_is_bounded() {
        let telemetry = Telemetry::new();
        for i in 0..(LATENCY_WINDOW * 2) {
            telemetry.record_latency_ms(i as u64);
        }
        assert_eq!(telemetry.latencies_ms.lock().len(), LATENCY_WINDOW);
    }

    #[test]
    fn percentiles_are_monotonic() {
        let telemetry = Telemetry::new();
        for i in 1..=100u64 {
            telemetry.record_latency_ms(i);
        }
        let snap = telemetry.snapshot();
        assert!(snap.latency_p50_ms.unwrap() <= snap.latency_p99_ms.unwrap());
    }
}
