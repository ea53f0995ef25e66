//! Tile source descriptors
//!
//! A [`TileSource`] describes one logical tile layout: its name (used as the
//! discriminator in cache and archive tables), the URL templates of its
//! mirrors, its zoom bounds, tile size, and image format. The descriptor is
//! owned by configuration and read-only to the pipeline; the pipeline swaps
//! the *active* source atomically, so a descriptor itself never mutates.
//!
//! # Examples
//!
//! ```
//! use tilepipe_core::{TileCoord, TileFormat, TileSource};
//!
//! let source = TileSource::new(
//! 	"mapnik",
//! 	vec!["https://tile.example.org/{z}/{x}/{y}.png".to_string()],
//! 	0,
//! 	19,
//! 	256,
//! 	TileFormat::PNG,
//! )
//! .unwrap();
//!
//! let coord = TileCoord::new(5, 3, 7).unwrap();
//! assert_eq!(source.tile_url(&coord), "https://tile.example.org/5/3/7.png");
//! assert_eq!(source.tile_path(&coord), "mapnik/5/3/7.png");
//! ```

use crate::types::{TileCoord, TileFormat};
use anyhow::{Result, ensure};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Describes one tile source: naming, mirrors, zoom bounds, and format.
#[derive(Debug)]
pub struct TileSource {
	name: String,
	url_templates: Vec<String>,
	min_zoom: u8,
	max_zoom: u8,
	tile_size: u32,
	format: TileFormat,
	mirror_counter: AtomicUsize,
}

impl TileSource {
	/// Create a new source descriptor.
	///
	/// Each entry of `url_templates` is a full URL template containing the
	/// placeholders `{z}`, `{x}` and `{y}`. Multiple entries are treated as
	/// mirrors and rotated round-robin.
	///
	/// # Errors
	/// Returns an error if the name is empty, no template is given, a
	/// template is missing a placeholder, or the zoom bounds are inverted.
	pub fn new(
		name: &str,
		url_templates: Vec<String>,
		min_zoom: u8,
		max_zoom: u8,
		tile_size: u32,
		format: TileFormat,
	) -> Result<TileSource> {
		ensure!(!name.is_empty(), "tile source name must not be empty");
		ensure!(!url_templates.is_empty(), "tile source '{name}' has no URL template");
		for template in &url_templates {
			for placeholder in ["{z}", "{x}", "{y}"] {
				ensure!(
					template.contains(placeholder),
					"URL template '{template}' of source '{name}' is missing '{placeholder}'"
				);
			}
		}
		ensure!(
			min_zoom <= max_zoom,
			"source '{name}': min zoom ({min_zoom}) must be <= max zoom ({max_zoom})"
		);
		Ok(TileSource {
			name: name.to_string(),
			url_templates,
			min_zoom,
			max_zoom,
			tile_size,
			format,
			mirror_counter: AtomicUsize::new(0),
		})
	}

	/// The source name, used as the `provider` discriminator in tile tables.
	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn min_zoom(&self) -> u8 {
		self.min_zoom
	}

	#[must_use]
	pub fn max_zoom(&self) -> u8 {
		self.max_zoom
	}

	/// Edge length of one tile in pixels.
	#[must_use]
	pub fn tile_size(&self) -> u32 {
		self.tile_size
	}

	#[must_use]
	pub fn format(&self) -> TileFormat {
		self.format
	}

	/// Whether this source can provide tiles at the coordinate's zoom level.
	#[must_use]
	pub fn covers_zoom(&self, coord: &TileCoord) -> bool {
		coord.zoom >= self.min_zoom && coord.zoom <= self.max_zoom
	}

	/// Render the download URL for a tile, rotating across mirrors.
	#[must_use]
	pub fn tile_url(&self, coord: &TileCoord) -> String {
		let index = self.mirror_counter.fetch_add(1, Ordering::Relaxed) % self.url_templates.len();
		self.url_templates[index]
			.replace("{z}", &coord.zoom.to_string())
			.replace("{x}", &coord.x.to_string())
			.replace("{y}", &coord.y.to_string())
	}

	/// The relative entry path of a tile inside path-addressed archives:
	/// `{name}/{z}/{x}/{y}.{ext}`.
	#[must_use]
	pub fn tile_path(&self, coord: &TileCoord) -> String {
		format!(
			"{}/{}/{}/{}.{}",
			self.name,
			coord.zoom,
			coord.x,
			coord.y,
			self.format.extension()
		)
	}
}
