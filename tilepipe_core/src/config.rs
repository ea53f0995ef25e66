//! Pipeline configuration
//!
//! One [`Config`] is constructed by the embedding application and passed down
//! to every component that needs it. There is no global configuration state.

use std::{sync::Arc, time::Duration};

/// Tuning knobs of the tile pipeline.
///
/// The defaults are sized for an interactive map consumer: small worker
/// pools, shallow queues that prefer freshly requested tiles, and a disk
/// cache in the hundreds of megabytes.
#[derive(Clone, Debug)]
pub struct Config {
	/// `User-Agent` sent with every tile download. Tile servers commonly
	/// require a meaningful value here.
	pub user_agent: String,

	/// Additional static headers sent with every tile download.
	pub http_headers: Vec<(String, String)>,

	/// Worker count of the download engine.
	pub download_workers: usize,

	/// Pending-queue capacity of the download engine.
	pub download_queue_size: usize,

	/// Worker count of the cache-store and archive engines.
	pub filesystem_workers: usize,

	/// Pending-queue capacity of the cache-store and archive engines.
	pub filesystem_queue_size: usize,

	/// Byte size of the in-memory tile cache.
	pub memory_cache_bytes: usize,

	/// Hard ceiling of the on-disk cache store. Exceeding it triggers
	/// size-based trimming.
	pub cache_max_bytes: u64,

	/// Trim target of the on-disk cache store: size-based trimming deletes
	/// rows until total size falls to or below this value.
	pub cache_trim_bytes: u64,

	/// When set, overrides every server-provided expiration: tiles expire
	/// this long after download.
	pub expiration_override: Option<Duration>,

	/// Added on top of server-provided expiration times.
	pub expiration_extension: Duration,

	/// Expiration applied when the server provides no caching headers.
	pub default_tile_ttl: Duration,

	/// Cool-down after the first failed download of a URL; doubles per
	/// consecutive failure.
	pub backoff_base: Duration,

	/// Upper bound of the per-URL cool-down window.
	pub backoff_cap: Duration,
}

impl Config {
	/// Wrap the configuration for shared ownership across the pipeline.
	#[must_use]
	pub fn arc(self) -> Arc<Self> {
		Arc::new(self)
	}
}

impl Default for Config {
	fn default() -> Self {
		Self {
			user_agent: format!("tilepipe/{}", env!("CARGO_PKG_VERSION")),
			http_headers: Vec::new(),
			download_workers: 2,
			download_queue_size: 40,
			filesystem_workers: 8,
			filesystem_queue_size: 40,
			memory_cache_bytes: 16 * 1024 * 1024,
			cache_max_bytes: 600 * 1024 * 1024,
			cache_trim_bytes: 500 * 1024 * 1024,
			expiration_override: None,
			expiration_extension: Duration::ZERO,
			default_tile_ttl: Duration::from_secs(7 * 24 * 60 * 60),
			backoff_base: Duration::from_secs(5),
			backoff_cap: Duration::from_secs(5 * 60),
		}
	}
}
