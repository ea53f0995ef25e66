//! Loaders adapting the cache store and archive files to the work queue.

use crate::cache::CacheStore;
use crate::queue::{LoadResult, LoadedTile, TileLoader};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::{sync::Arc, time::SystemTime};
use tilepipe_container::TileArchiveTrait;
use tilepipe_core::{TileCoord, TileSource};

/// Loads tiles out of the writable SQLite cache store.
///
/// A record past its expiry is still returned, flagged expired, so the
/// coordinator can display it immediately while refreshing in the
/// background. Records without an expiry never go stale on their own.
pub struct CacheStoreLoader {
	store: Arc<CacheStore>,
	source: Arc<ArcSwap<TileSource>>,
}

impl CacheStoreLoader {
	#[must_use]
	pub fn new(store: Arc<CacheStore>, source: Arc<ArcSwap<TileSource>>) -> CacheStoreLoader {
		CacheStoreLoader { store, source }
	}
}

#[async_trait]
impl TileLoader for CacheStoreLoader {
	fn name(&self) -> &str {
		"cache-store"
	}

	async fn load_tile(&self, coord: &TileCoord) -> LoadResult {
		let source = self.source.load_full();
		match self.store.load(source.name(), coord) {
			Ok(Some(record)) => {
				let expired = record.expires.is_some_and(|when| when < SystemTime::now());
				Ok(Some(LoadedTile {
					blob: record.blob,
					expired,
				}))
			}
			Ok(None) => Ok(None),
			Err(e) => {
				// a single failed read fails this tile only
				log::warn!("cache store lookup of {coord:?} failed: {e:#}");
				Ok(None)
			}
		}
	}
}

/// Loads tiles out of the configured archive files, first hit wins.
pub struct ArchiveLoader {
	archives: Vec<Box<dyn TileArchiveTrait>>,
	source: Arc<ArcSwap<TileSource>>,
}

impl ArchiveLoader {
	#[must_use]
	pub fn new(archives: Vec<Box<dyn TileArchiveTrait>>, source: Arc<ArcSwap<TileSource>>) -> ArchiveLoader {
		ArchiveLoader { archives, source }
	}
}

#[async_trait]
impl TileLoader for ArchiveLoader {
	fn name(&self) -> &str {
		"archives"
	}

	async fn load_tile(&self, coord: &TileCoord) -> LoadResult {
		let source = self.source.load_full();
		for archive in &self.archives {
			match archive.get_tile(&source, coord) {
				Ok(Some(blob)) => {
					log::trace!("{coord:?} served from {} archive '{}'", archive.kind(), archive.name());
					return Ok(Some(LoadedTile::fresh(blob)));
				}
				Ok(None) => {}
				Err(e) => {
					log::warn!("archive '{}' failed reading {coord:?}: {e:#}", archive.name());
				}
			}
		}
		Ok(None)
	}
}
