//! A byte-bounded in-memory tile cache.
//!
//! The highest-priority provider: a map from packed tile key to blob,
//! consulted synchronously before a request enters the asynchronous provider
//! chain. Eviction approximates LRU: every access stamps the entry with a
//! monotonically increasing counter, and when the byte budget is exceeded,
//! entries at or below the median stamp are dropped in one sweep.

use parking_lot::Mutex;
use std::collections::HashMap;
use tilepipe_core::Blob;

struct CacheInner {
	entries: HashMap<u64, (Blob, u64)>,
	bytes: u64,
	last_stamp: u64,
}

/// A thread-safe in-memory tile cache bounded by payload byte size.
pub struct MemoryTileCache {
	inner: Mutex<CacheInner>,
	max_bytes: u64,
}

impl MemoryTileCache {
	/// Create a cache holding at most `max_bytes` of tile payload.
	#[must_use]
	pub fn with_maximum_size(max_bytes: usize) -> MemoryTileCache {
		MemoryTileCache {
			inner: Mutex::new(CacheInner {
				entries: HashMap::new(),
				bytes: 0,
				last_stamp: 0,
			}),
			max_bytes: max_bytes as u64,
		}
	}

	/// Look up a tile, marking it most recently used.
	#[must_use]
	pub fn get(&self, key: u64) -> Option<Blob> {
		let mut inner = self.inner.lock();
		inner.last_stamp += 1;
		let stamp = inner.last_stamp;
		let entry = inner.entries.get_mut(&key)?;
		entry.1 = stamp;
		Some(entry.0.clone())
	}

	/// Insert a tile, evicting older entries if the byte budget is exceeded.
	/// A blob larger than the whole budget is not stored.
	pub fn put(&self, key: u64, blob: Blob) {
		if blob.len() > self.max_bytes {
			return;
		}
		let mut inner = self.inner.lock();
		inner.last_stamp += 1;
		let stamp = inner.last_stamp;
		if let Some((old, _)) = inner.entries.remove(&key) {
			inner.bytes -= old.len();
		}
		inner.bytes += blob.len();
		inner.entries.insert(key, (blob, stamp));
		while inner.bytes > self.max_bytes {
			Self::cleanup(&mut inner);
		}
	}

	/// Drop everything.
	pub fn clear(&self) {
		let mut inner = self.inner.lock();
		inner.entries.clear();
		inner.bytes = 0;
	}

	/// Number of cached tiles.
	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.lock().entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.inner.lock().entries.is_empty()
	}

	/// Total payload bytes currently held.
	#[must_use]
	pub fn bytes(&self) -> u64 {
		self.inner.lock().bytes
	}

	/// Remove every entry whose access stamp is at or below the median.
	fn cleanup(inner: &mut CacheInner) {
		let mut stamps: Vec<u64> = inner.entries.values().map(|e| e.1).collect();
		if stamps.is_empty() {
			return;
		}
		stamps.sort_unstable();
		let median = stamps[stamps.len() / 2];
		let mut freed = 0u64;
		inner.entries.retain(|_, entry| {
			if entry.1 <= median {
				freed += entry.0.len();
				false
			} else {
				true
			}
		});
		inner.bytes -= freed;
	}
}

impl std::fmt::Debug for MemoryTileCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = self.inner.lock();
		f.debug_struct("MemoryTileCache")
			.field("tiles", &inner.entries.len())
			.field("bytes", &inner.bytes)
			.field("max_bytes", &self.max_bytes)
			.finish()
	}
}
