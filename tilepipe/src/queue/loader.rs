//! The loader contract a provider plugs into its work queue.

use anyhow::Error;
use async_trait::async_trait;
use std::fmt::{self, Display};
use tilepipe_core::{Blob, TileCoord};

/// A tile payload produced by a loader, possibly past its freshness window.
#[derive(Clone, Debug)]
pub struct LoadedTile {
	pub blob: Blob,
	/// An expired tile is still returned to the caller for display, but the
	/// coordinator continues down the provider chain to refresh it.
	pub expired: bool,
}

impl LoadedTile {
	#[must_use]
	pub fn fresh(blob: Blob) -> LoadedTile {
		LoadedTile { blob, expired: false }
	}

	#[must_use]
	pub fn stale(blob: Blob) -> LoadedTile {
		LoadedTile { blob, expired: true }
	}
}

/// Signals that the loader's backing resource failed in a way that dooms
/// every queued job (unreachable host class), not just the current one.
///
/// The work queue reacts by failing its entire pending table at once instead
/// of grinding through jobs that would all hit the same wall.
#[derive(Debug)]
pub struct CantContinue(pub Error);

impl Display for CantContinue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "loader cannot continue: {}", self.0)
	}
}

impl std::error::Error for CantContinue {}

/// What a single load attempt produced.
///
/// `Ok(None)` covers both "this provider has no such tile" and "this attempt
/// failed": the distinction never crosses the asynchronous boundary; the
/// coordinator advances to the next provider either way.
pub type LoadResult = Result<Option<LoadedTile>, CantContinue>;

/// One provider's way of loading a tile: from memory, disk, archive file, or
/// the network. Selected by configuration, one implementation per kind.
#[async_trait]
pub trait TileLoader: Send + Sync + 'static {
	/// Short provider name, for logging.
	fn name(&self) -> &str;

	/// Whether loading goes over the network. Network providers are skipped
	/// entirely while connectivity is down.
	fn uses_network(&self) -> bool {
		false
	}

	/// Load one tile. Transient failures are logged by the implementation
	/// and reported as `Ok(None)`.
	async fn load_tile(&self, coord: &TileCoord) -> LoadResult;
}
