//! The provider chain coordinator.
//!
//! A [`TilePipeline`] answers tile requests by walking a fixed chain of
//! providers in priority order: the in-memory cache (checked synchronously,
//! since it does no I/O), then the SQLite cache store, then the bundled archive
//! files, then the network downloader. The first provider with bytes wins
//! and the chain stops; a provider holding only an *expired* copy returns it
//! for immediate display while the chain continues in the background to
//! refresh it.
//!
//! The coordinator keeps at most one logical request in flight per tile:
//! concurrent requests for the same coordinate attach their responders to
//! the existing flight instead of re-entering the chain.

mod providers;

pub use providers::{ArchiveLoader, CacheStoreLoader};

use crate::cache::{CacheStore, MemoryTileCache};
use crate::connectivity::{AlwaysOnline, ConnectivityCheck};
use crate::fetch::DownloadLoader;
use crate::queue::{JobOutcome, TileLoader, WorkQueue};
use anyhow::Result;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::{
	collections::{HashMap, hash_map::Entry},
	sync::Arc,
};
use tilepipe_container::TileArchiveTrait;
use tilepipe_core::{Blob, Config, TileCoord, TileSource};
use tokio::sync::mpsc;

/// One answer to a tile request.
///
/// A request is answered once with `stale: false`, or twice when a stale
/// copy was found: first the stale bytes (`stale: true`), then the outcome
/// of the background refresh. `blob: None` means the chain was exhausted
/// with nothing to show, and the renderer draws its placeholder.
#[derive(Clone, Debug)]
pub struct TileResponse {
	pub coord: TileCoord,
	pub blob: Option<Blob>,
	pub stale: bool,
}

/// Receives [`TileResponse`]s; may be invoked from worker tasks or, on
/// memory-cache hits, synchronously from the requesting thread.
pub type TileResponder = Arc<dyn Fn(TileResponse) + Send + Sync>;

struct Provider {
	queue: WorkQueue,
}

struct FlightState {
	responders: Vec<TileResponder>,
	stale_served: bool,
}

struct PipelineInner {
	source: Arc<ArcSwap<TileSource>>,
	memory_cache: MemoryTileCache,
	providers: Vec<Provider>,
	in_flight: Mutex<HashMap<u64, FlightState>>,
	connectivity: Arc<dyn ConnectivityCheck>,
}

/// Assembles a [`TilePipeline`].
pub struct TilePipelineBuilder {
	config: Arc<Config>,
	source: TileSource,
	store: Option<Arc<CacheStore>>,
	archives: Vec<Box<dyn TileArchiveTrait>>,
	connectivity: Arc<dyn ConnectivityCheck>,
	downloads: bool,
}

impl TilePipelineBuilder {
	/// Start a pipeline for one active tile source.
	#[must_use]
	pub fn new(config: Arc<Config>, source: TileSource) -> TilePipelineBuilder {
		TilePipelineBuilder {
			config,
			source,
			store: None,
			archives: Vec::new(),
			connectivity: Arc::new(AlwaysOnline),
			downloads: true,
		}
	}

	/// Attach the writable cache store. Downloads are persisted here, and
	/// the store is queried ahead of archives and the network.
	#[must_use]
	pub fn with_cache_store(mut self, store: Arc<CacheStore>) -> TilePipelineBuilder {
		self.store = Some(store);
		self
	}

	/// Attach read-only archives, queried after the cache store.
	#[must_use]
	pub fn with_archives(mut self, archives: Vec<Box<dyn TileArchiveTrait>>) -> TilePipelineBuilder {
		self.archives = archives;
		self
	}

	/// Inject the connectivity check used to skip network providers.
	#[must_use]
	pub fn with_connectivity(mut self, check: Arc<dyn ConnectivityCheck>) -> TilePipelineBuilder {
		self.connectivity = check;
		self
	}

	/// Disable the network provider entirely (offline-only pipeline).
	#[must_use]
	pub fn without_downloads(mut self) -> TilePipelineBuilder {
		self.downloads = false;
		self
	}

	/// Build the pipeline and spawn its worker pools.
	///
	/// Must be called inside a tokio runtime.
	///
	/// # Errors
	/// Returns an error if the HTTP client cannot be constructed.
	pub fn build(self) -> Result<TilePipeline> {
		let config = &self.config;
		let source = Arc::new(ArcSwap::from_pointee(self.source));
		let mut providers = Vec::new();

		if let Some(store) = &self.store {
			let loader: Arc<dyn TileLoader> = Arc::new(CacheStoreLoader::new(Arc::clone(store), Arc::clone(&source)));
			providers.push(Provider {
				queue: WorkQueue::new(loader, config.filesystem_workers, config.filesystem_queue_size),
			});
		}

		if !self.archives.is_empty() {
			let loader: Arc<dyn TileLoader> = Arc::new(ArchiveLoader::new(self.archives, Arc::clone(&source)));
			providers.push(Provider {
				queue: WorkQueue::new(loader, config.filesystem_workers, config.filesystem_queue_size),
			});
		}

		if self.downloads {
			let loader: Arc<dyn TileLoader> = Arc::new(DownloadLoader::new(
				Arc::clone(config),
				Arc::clone(&source),
				self.store.clone(),
			)?);
			providers.push(Provider {
				queue: WorkQueue::new(loader, config.download_workers, config.download_queue_size),
			});
		}

		Ok(TilePipeline {
			inner: Arc::new(PipelineInner {
				source,
				memory_cache: MemoryTileCache::with_maximum_size(config.memory_cache_bytes),
				providers,
				in_flight: Mutex::new(HashMap::new()),
				connectivity: self.connectivity,
			}),
		})
	}
}

/// The tile request coordinator, the upward interface of the pipeline.
pub struct TilePipeline {
	inner: Arc<PipelineInner>,
}

impl TilePipeline {
	/// Request a tile asynchronously. Never blocks.
	///
	/// The responder is invoked once with the final result, plus once more
	/// beforehand if a stale copy could be served immediately. Requests for
	/// coordinates outside the active source's zoom range resolve to an
	/// empty response right away.
	pub fn request_tile(&self, coord: TileCoord, responder: TileResponder) {
		let inner = &self.inner;

		if !inner.source.load().covers_zoom(&coord) {
			responder(TileResponse {
				coord,
				blob: None,
				stale: false,
			});
			return;
		}

		let key = coord.as_key();
		if let Some(blob) = inner.memory_cache.get(key) {
			log::trace!("{coord:?} served from memory");
			responder(TileResponse {
				coord,
				blob: Some(blob),
				stale: false,
			});
			return;
		}

		let first = {
			let mut in_flight = inner.in_flight.lock();
			match in_flight.entry(key) {
				Entry::Occupied(mut entry) => {
					entry.get_mut().responders.push(responder);
					false
				}
				Entry::Vacant(entry) => {
					entry.insert(FlightState {
						responders: vec![responder],
						stale_served: false,
					});
					true
				}
			}
		};

		if first {
			dispatch(inner, key, coord, 0);
		}
	}

	/// Channel-flavored [`request_tile`](Self::request_tile): responses
	/// arrive on the returned receiver.
	#[must_use]
	pub fn request_tile_stream(&self, coord: TileCoord) -> mpsc::UnboundedReceiver<TileResponse> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.request_tile(
			coord,
			Arc::new(move |response| {
				let _ = tx.send(response);
			}),
		);
		rx
	}

	/// The active tile source.
	#[must_use]
	pub fn source(&self) -> Arc<TileSource> {
		self.inner.source.load_full()
	}

	/// Swap the active tile source.
	///
	/// Takes effect atomically for every job claimed afterwards; jobs
	/// already being loaded finish against the old source and their results
	/// are dropped from the memory cache by the clear below. The memory
	/// cache is keyed by coordinate only, so it must not leak tiles of the
	/// previous source.
	pub fn set_source(&self, source: TileSource) {
		log::debug!("switching tile source to '{}'", source.name());
		self.inner.source.store(Arc::new(source));
		self.inner.memory_cache.clear();
	}

	/// Tiles currently held by the in-memory cache.
	#[must_use]
	pub fn memory_cache_len(&self) -> usize {
		self.inner.memory_cache.len()
	}

	/// Number of logical requests currently walking the provider chain.
	#[must_use]
	pub fn in_flight_count(&self) -> usize {
		self.inner.in_flight.lock().len()
	}

	/// Detach every provider engine: queued jobs are dropped silently,
	/// in-flight loads finish into the void. The pipeline is unusable
	/// afterwards; dropping it has the same effect.
	pub fn shutdown(&self) {
		for provider in &self.inner.providers {
			provider.queue.detach();
		}
		self.inner.in_flight.lock().clear();
	}
}

impl std::fmt::Debug for TilePipeline {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TilePipeline")
			.field("source", &self.inner.source.load().name())
			.field("providers", &self.inner.providers.len())
			.field("memory_cache", &self.inner.memory_cache)
			.field("in_flight", &self.inner.in_flight.lock().len())
			.finish()
	}
}

/// Submit the request to the next usable provider at or after `index`;
/// exhaustion resolves the flight.
fn dispatch(inner: &Arc<PipelineInner>, key: u64, coord: TileCoord, index: usize) {
	let mut index = index;
	loop {
		let Some(provider) = inner.providers.get(index) else {
			finish(inner, key, coord, None);
			return;
		};

		if provider.queue.loader().uses_network() && !inner.connectivity.network_available() {
			log::trace!("skipping offline network provider for {coord:?}");
			index += 1;
			continue;
		}

		let sink = {
			let inner = Arc::clone(inner);
			Box::new(move |outcome| on_provider_result(&inner, key, coord, index, outcome))
		};
		match provider.queue.submit(&coord, sink) {
			Ok(()) => return,
			Err(e) => {
				// detached engine mid-shutdown; treat as a failed provider
				log::warn!("provider {index} rejected {coord:?}: {e}");
				index += 1;
			}
		}
	}
}

fn on_provider_result(inner: &Arc<PipelineInner>, key: u64, coord: TileCoord, index: usize, outcome: JobOutcome) {
	match outcome {
		JobOutcome::Loaded(tile) if !tile.expired => {
			inner.memory_cache.put(key, tile.blob.clone());
			finish(inner, key, coord, Some(tile.blob));
		}
		JobOutcome::Loaded(tile) => {
			// stale hit: show it now, refresh from the rest of the chain
			serve_stale(inner, key, coord, tile.blob);
			dispatch(inner, key, coord, index + 1);
		}
		JobOutcome::Failed => dispatch(inner, key, coord, index + 1),
	}
}

/// Resolve the flight. An empty result after a stale serve is swallowed,
/// since the caller already holds displayable bytes.
fn finish(inner: &PipelineInner, key: u64, coord: TileCoord, blob: Option<Blob>) {
	let Some(state) = inner.in_flight.lock().remove(&key) else {
		return;
	};
	if blob.is_none() && state.stale_served {
		log::debug!("refresh of {coord:?} came up empty, keeping the stale tile");
		return;
	}
	let response = TileResponse {
		coord,
		blob,
		stale: false,
	};
	for responder in state.responders {
		responder(response.clone());
	}
}

/// Deliver stale bytes without resolving the flight.
fn serve_stale(inner: &PipelineInner, key: u64, coord: TileCoord, blob: Blob) {
	let responders: Vec<TileResponder> = {
		let mut in_flight = inner.in_flight.lock();
		let Some(state) = in_flight.get_mut(&key) else {
			return;
		};
		state.stale_served = true;
		state.responders.clone()
	};
	let response = TileResponse {
		coord,
		blob: Some(blob),
		stale: true,
	};
	for responder in responders {
		responder(response.clone());
	}
}
