//! The archive contract shared by all container kinds.

use anyhow::Result;
use std::fmt::Debug;
use tilepipe_core::{Blob, TileCoord, TileSource};

/// An opened, read-only tile archive.
///
/// Implementations answer point lookups by tile coordinate. A tile that the
/// archive simply does not contain is `Ok(None)`, never an error; errors are
/// reserved for defective archives and I/O failures.
///
/// Underlying file and database handles are released when the reader is
/// dropped; dropping is idempotent and safe at any point.
pub trait TileArchiveTrait: Debug + Send + Sync {
	/// The archive's location, for logging.
	fn name(&self) -> &str;

	/// The container kind, e.g. `"zip"` or `"tilepack"`.
	fn kind(&self) -> &'static str;

	/// Fetch a single tile of `source` by coordinate.
	///
	/// Returns `Ok(None)` when the archive does not contain that tile.
	fn get_tile(&self, source: &TileSource, coord: &TileCoord) -> Result<Option<Blob>>;

	/// Box the reader for use behind the trait object.
	fn boxed(self) -> Box<dyn TileArchiveTrait>
	where
		Self: Sized + 'static,
	{
		Box::new(self)
	}
}
