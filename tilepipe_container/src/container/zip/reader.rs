//! Read tiles from a zip archive.
//!
//! Tiles are addressed by the entry path convention
//! `{source}/{z}/{x}/{y}.{ext}`, so one zip file can bundle several sources
//! side by side. The zip central directory already is an index by path, so
//! lookups go straight through [`zip::ZipArchive::by_name`] without scanning.

use crate::TileArchiveTrait;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::{
	fmt::Debug,
	fs::File,
	io::{BufReader, Read},
	path::Path,
};
use tilepipe_core::{Blob, TileCoord, TileSource};
use zip::{ZipArchive, result::ZipError};

/// Reader for zip tile archives.
pub struct ZipArchiveReader {
	name: String,
	// by_name needs &mut access to seek the inner reader
	archive: Mutex<ZipArchive<BufReader<File>>>,
}

impl ZipArchiveReader {
	/// Open a zip archive from a file path.
	///
	/// # Errors
	/// Returns an error if the file cannot be opened or is not a zip archive.
	pub fn open_path(path: &Path) -> Result<ZipArchiveReader> {
		log::debug!("open zip archive {path:?}");

		let file = File::open(path).with_context(|| format!("opening {path:?}"))?;
		let archive =
			ZipArchive::new(BufReader::new(file)).with_context(|| format!("reading zip central directory of {path:?}"))?;

		Ok(ZipArchiveReader {
			name: path.to_string_lossy().to_string(),
			archive: Mutex::new(archive),
		})
	}
}

impl TileArchiveTrait for ZipArchiveReader {
	fn name(&self) -> &str {
		&self.name
	}

	fn kind(&self) -> &'static str {
		"zip"
	}

	fn get_tile(&self, source: &TileSource, coord: &TileCoord) -> Result<Option<Blob>> {
		let entry_path = source.tile_path(coord);
		let mut archive = self.archive.lock();

		let mut entry = match archive.by_name(&entry_path) {
			Ok(entry) => entry,
			Err(ZipError::FileNotFound) => return Ok(None),
			Err(e) => return Err(e).with_context(|| format!("reading '{entry_path}' from '{}'", self.name)),
		};

		let mut bytes = Vec::with_capacity(entry.size() as usize);
		entry
			.read_to_end(&mut bytes)
			.with_context(|| format!("decompressing '{entry_path}' from '{}'", self.name))?;

		Ok(Some(Blob::from(bytes)))
	}
}

impl Debug for ZipArchiveReader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ZipArchiveReader").field("name", &self.name).finish()
	}
}
