use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide request counters. Shared across requests, updated with
/// relaxed atomics only.
#[derive(Debug, Default)]
pub struct Metrics {
	requests: AtomicU64,
	strategy_failures: AtomicU64,
	fallbacks: AtomicU64,
	degraded: AtomicU64,
	total_latency_micros: AtomicU64,
}
impl Metrics {
	pub fn record_request(&self) {
		self.requests.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_strategy_failure(&self) {
		self.strategy_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_fallback(&self) {
		self.fallbacks.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_degraded(&self) {
		self.degraded.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_latency_micros(&self, micros: u64) {
		self.total_latency_micros.fetch_add(micros, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> MetricsSnapshot {
		MetricsSnapshot {
			requests: self.requests.load(Ordering::Relaxed),
			strategy_failures: self.strategy_failures.load(Ordering::Relaxed),
			fallbacks: self.fallbacks.load(Ordering::Relaxed),
			degraded: self.degraded.load(Ordering::Relaxed),
			total_latency_micros: self.total_latency_micros.load(Ordering::Relaxed),
			embedding_requests: triage_providers::embedding::request_count(),
			embedding_latency_micros: triage_providers::embedding::recorded_latency_micros(),
		}
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
	pub requests: u64,
	pub strategy_failures: u64,
	pub fallbacks: u64,
	pub degraded: u64,
	pub total_latency_micros: u64,
	pub embedding_requests: u64,
	pub embedding_latency_micros: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counters_accumulate_into_the_snapshot() {
		let metrics = Metrics::default();

		metrics.record_request();
		metrics.record_request();
		metrics.record_fallback();
		metrics.record_latency_micros(1_500);

		let snapshot = metrics.snapshot();

		assert_eq!(snapshot.requests, 2);
		assert_eq!(snapshot.fallbacks, 1);
		assert_eq!(snapshot.total_latency_micros, 1_500);
	}
}
