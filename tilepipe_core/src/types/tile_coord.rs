//! Tile coordinates in an XYZ tile pyramid
//!
//! This module provides the [`TileCoord`] type for addressing a single tile by
//! `(zoom, x, y)`. A coordinate packs into a single sortable `u64` key that is
//! used throughout the pipeline: as the key of pending-work tables, of cache
//! tables, and of archive indices.
//!
//! # Examples
//!
//! ```
//! use tilepipe_core::TileCoord;
//!
//! let coord = TileCoord::new(5, 3, 7).unwrap();
//! assert_eq!(coord.zoom, 5);
//!
//! // The packed key round-trips
//! let key = coord.as_key();
//! assert_eq!(TileCoord::from_key(key).unwrap(), coord);
//! ```

use anyhow::{Result, ensure};
use std::fmt::{self, Debug};

/// The highest zoom level a packed key can represent.
///
/// The key layout reserves 29 bits each for x and y, so `x, y < 2^29`.
pub const MAX_ZOOM: u8 = 29;

/// A tile coordinate in an XYZ tile pyramid, with zoom level and x/y indices.
#[derive(Eq, PartialEq, Clone, Hash, Copy)]
pub struct TileCoord {
	/// The zoom level of the tile.
	pub zoom: u8,
	/// The x index of the tile.
	pub x: u32,
	/// The y index of the tile.
	pub y: u32,
}

impl TileCoord {
	/// Create a new `TileCoord` at the given `zoom` and tile indices `x`, `y`.
	///
	/// # Errors
	/// Returns an error if `zoom` > [`MAX_ZOOM`] or `x`/`y` are out of bounds
	/// for the zoom level.
	pub fn new(zoom: u8, x: u32, y: u32) -> Result<TileCoord> {
		ensure!(zoom <= MAX_ZOOM, "zoom ({zoom}) must be <= {MAX_ZOOM}");
		let max = 2u32.pow(u32::from(zoom));
		ensure!(x < max, "x ({x}) out of bounds for zoom {zoom}");
		ensure!(y < max, "y ({y}) out of bounds for zoom {zoom}");
		Ok(TileCoord { zoom, x, y })
	}

	/// Pack this coordinate into a single sortable `u64` key.
	///
	/// Layout: `zoom << 58 | x << 29 | y`. Keys of the same zoom level sort
	/// by x, then y.
	#[must_use]
	pub fn as_key(&self) -> u64 {
		(u64::from(self.zoom) << 58) | (u64::from(self.x) << 29) | u64::from(self.y)
	}

	/// Unpack a key produced by [`as_key`](Self::as_key).
	///
	/// # Errors
	/// Returns an error if the key does not describe a valid coordinate.
	pub fn from_key(key: u64) -> Result<TileCoord> {
		let zoom = (key >> 58) as u8;
		let x = ((key >> 29) & 0x1FFF_FFFF) as u32;
		let y = (key & 0x1FFF_FFFF) as u32;
		TileCoord::new(zoom, x, y)
	}

	/// Get the maximum valid x or y index for this tile's zoom level.
	///
	/// Returns `2^zoom - 1`.
	#[must_use]
	pub fn max_index(&self) -> u32 {
		(1u32 << self.zoom) - 1
	}

	/// Flip the y index vertically within the tile grid.
	///
	/// Converts between TMS (y increasing upward) and XYZ (y increasing
	/// downward) row addressing, which SQLite tile tables need.
	#[must_use]
	pub fn flipped_y(&self) -> TileCoord {
		TileCoord {
			zoom: self.zoom,
			x: self.x,
			y: self.max_index() - self.y,
		}
	}

	/// Return the coordinate of the covering tile at the parent zoom level.
	///
	/// # Errors
	/// Returns an error if the current zoom is 0.
	pub fn parent(&self) -> Result<TileCoord> {
		ensure!(self.zoom > 0, "cannot decrease zoom below 0");
		TileCoord::new(self.zoom - 1, self.x / 2, self.y / 2)
	}
}

/// Custom `Debug` format as `TileCoord(z, [x, y])` for readability.
impl Debug for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!("TileCoord({}, [{}, {}])", &self.zoom, &self.x, &self.y))
	}
}

/// Ordering by packed key: zoom first, then x, then y.
impl Ord for TileCoord {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.as_key().cmp(&other.as_key())
	}
}

impl PartialOrd for TileCoord {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}
