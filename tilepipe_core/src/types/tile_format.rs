//! Raster tile formats transported by the pipeline.

use anyhow::{Result, bail};
use std::fmt::{self, Display};

/// The image format of a tile source's payload.
///
/// The pipeline never decodes tile bytes; the format only determines the
/// filename extension used in URL templates and archive entry paths.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TileFormat {
	JPG,
	PNG,
	WEBP,
}

impl TileFormat {
	/// The filename extension, without the leading dot.
	#[must_use]
	pub fn extension(&self) -> &str {
		match self {
			TileFormat::JPG => "jpg",
			TileFormat::PNG => "png",
			TileFormat::WEBP => "webp",
		}
	}

	/// Parse an extension (with or without a leading dot).
	pub fn from_extension(extension: &str) -> Result<TileFormat> {
		Ok(match extension.trim_start_matches('.') {
			"jpg" | "jpeg" => TileFormat::JPG,
			"png" => TileFormat::PNG,
			"webp" => TileFormat::WEBP,
			other => bail!("unknown tile format extension '{other}'"),
		})
	}
}

impl Display for TileFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.extension())
	}
}
