//! Per-URL download cool-down.
//!
//! A URL that just failed is very likely to fail again immediately; hammering
//! it from every queued tile turns one dead host into a stall of the whole
//! download pool. Each failure arms (or doubles) a cool-down window for that
//! URL; while the window is open, download attempts are refused before any
//! socket work happens. The next success clears the entry.

use parking_lot::Mutex;
use std::{
	collections::HashMap,
	time::{Duration, Instant},
};

// opportunistic pruning threshold
const PRUNE_LIMIT: usize = 1024;

struct BackoffEntry {
	failures: u32,
	until: Instant,
}

/// Tracks recently failing URLs and the time their cool-down ends.
pub struct UrlBackoff {
	base: Duration,
	cap: Duration,
	entries: Mutex<HashMap<String, BackoffEntry>>,
}

impl UrlBackoff {
	/// Create a backoff table: the first failure of a URL arms `base`, each
	/// consecutive failure doubles the window up to `cap`.
	#[must_use]
	pub fn new(base: Duration, cap: Duration) -> UrlBackoff {
		UrlBackoff {
			base,
			cap: cap.max(base),
			entries: Mutex::new(HashMap::new()),
		}
	}

	/// Whether a download attempt against this URL should be skipped.
	#[must_use]
	pub fn should_wait(&self, url: &str) -> bool {
		self
			.entries
			.lock()
			.get(url)
			.is_some_and(|entry| entry.until > Instant::now())
	}

	/// Record a failed attempt, arming or extending the cool-down.
	pub fn arm(&self, url: &str) {
		let mut entries = self.entries.lock();
		if entries.len() >= PRUNE_LIMIT {
			let now = Instant::now();
			entries.retain(|_, entry| entry.until > now);
		}

		let entry = entries.entry(url.to_string()).or_insert(BackoffEntry {
			failures: 0,
			until: Instant::now(),
		});
		entry.failures += 1;
		let exponent = entry.failures.saturating_sub(1).min(16);
		let delay = self.base.saturating_mul(1 << exponent).min(self.cap);
		entry.until = Instant::now() + delay;
		log::debug!("backing off '{url}' for {delay:?} (failure #{})", entry.failures);
	}

	/// Record a success, forgetting the URL entirely.
	pub fn clear(&self, url: &str) {
		self.entries.lock().remove(url);
	}

	/// Number of tracked URLs.
	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}
