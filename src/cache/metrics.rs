// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for credential cache activity.
#[derive(Debug, Default)]
pub struct CredentialMetrics {
	interactive: AtomicU64,
	refreshes: AtomicU64,
	exchanges: AtomicU64,
	failures: AtomicU64,
	cache_hits: AtomicU64,
}
impl CredentialMetrics {
	/// Returns the number of successful interactive acquisitions.
	pub fn interactive_acquisitions(&self) -> u64 {
		self.interactive.load(Ordering::Relaxed)
	}

	/// Returns the number of successful refresh-token renewals.
	pub fn refreshes(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
	}

	/// Returns the number of successful storage exchanges.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Returns the number of failed upstream calls.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Returns the number of accesses served from cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	pub(crate) fn record_interactive(&self) {
		self.interactive.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh(&self) {
		self.refreshes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}
}
