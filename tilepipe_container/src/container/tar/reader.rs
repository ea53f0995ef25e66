//! Read tiles from a tar archive.
//!
//! Tar has no random-access index, so the archive is scanned once at open
//! time into a map from entry path to byte range; lookups afterwards are
//! positioned reads. Entries follow the same `{source}/{z}/{x}/{y}.{ext}`
//! path convention as zip archives; anything else in the archive is ignored.

use crate::TileArchiveTrait;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::{
	collections::HashMap,
	fmt::Debug,
	fs::File,
	io::{Read, Seek, SeekFrom},
	path::Path,
};
use tar::{Archive, EntryType};
use tilepipe_core::{Blob, TileCoord, TileSource};

struct FileRange {
	offset: u64,
	length: u64,
}

/// Reader for tar tile archives.
pub struct TarArchiveReader {
	name: String,
	file: Mutex<File>,
	tile_map: HashMap<String, FileRange>,
}

impl TarArchiveReader {
	/// Open a tar archive, scanning its entries into an in-memory index.
	///
	/// # Errors
	/// Returns an error if the file cannot be opened or its entry headers
	/// cannot be parsed.
	pub fn open_path(path: &Path) -> Result<TarArchiveReader> {
		log::debug!("open tar archive {path:?}");

		let mut file = File::open(path).with_context(|| format!("opening {path:?}"))?;
		let mut archive = Archive::new(&mut file);

		let mut tile_map = HashMap::new();
		for entry in archive.entries()? {
			let entry = entry?;
			if entry.header().entry_type() != EntryType::Regular {
				continue;
			}

			let entry_path = entry.path()?;
			let mut components: Vec<&str> = entry_path.iter().filter_map(|s| s.to_str()).collect();
			if components.first() == Some(&".") {
				components.remove(0);
			}
			// {source}/{z}/{x}/{y}.{ext}
			if components.len() != 4 {
				continue;
			}

			tile_map.insert(
				components.join("/"),
				FileRange {
					offset: entry.raw_file_position(),
					length: entry.size(),
				},
			);
		}
		drop(archive);

		log::debug!("indexed {} tar entries from {path:?}", tile_map.len());

		Ok(TarArchiveReader {
			name: path.to_string_lossy().to_string(),
			file: Mutex::new(file),
			tile_map,
		})
	}
}

impl TileArchiveTrait for TarArchiveReader {
	fn name(&self) -> &str {
		&self.name
	}

	fn kind(&self) -> &'static str {
		"tar"
	}

	fn get_tile(&self, source: &TileSource, coord: &TileCoord) -> Result<Option<Blob>> {
		let Some(range) = self.tile_map.get(&source.tile_path(coord)) else {
			return Ok(None);
		};

		let mut bytes = vec![0u8; range.length as usize];
		let mut file = self.file.lock();
		file.seek(SeekFrom::Start(range.offset))?;
		file
			.read_exact(&mut bytes)
			.with_context(|| format!("reading tile {coord:?} from '{}'", self.name))?;

		Ok(Some(Blob::from(bytes)))
	}
}

impl Debug for TarArchiveReader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TarArchiveReader")
			.field("name", &self.name)
			.field("tiles", &self.tile_map.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_fs::TempDir;
	use tar::{Builder, Header};
	use tilepipe_core::TileFormat;

	fn test_source() -> TileSource {
		TileSource::new(
			"mapnik",
			vec!["https://tile.example.org/{z}/{x}/{y}.png".to_string()],
			0,
			19,
			256,
			TileFormat::PNG,
		)
		.unwrap()
	}

	fn write_fixture(path: &Path, entries: &[(&str, &[u8])]) {
		let mut builder = Builder::new(File::create(path).unwrap());
		for (name, bytes) in entries {
			let mut header = Header::new_gnu();
			header.set_size(bytes.len() as u64);
			header.set_mode(0o644);
			header.set_cksum();
			builder.append_data(&mut header, name, *bytes).unwrap();
		}
		builder.finish().unwrap();
	}

	#[test]
	fn lookup_hit_and_miss() -> Result<()> {
		let dir = TempDir::new()?;
		let path = dir.path().join("tiles.tar");
		write_fixture(
			&path,
			&[
				("mapnik/5/3/7.png", b"tile537"),
				("mapnik/5/3/8.png", b"tile538"),
				("metadata.json", b"{}"),
			],
		);

		let reader = TarArchiveReader::open_path(&path)?;
		let source = test_source();

		assert_eq!(
			reader.get_tile(&source, &TileCoord::new(5, 3, 7)?)?.unwrap().as_slice(),
			b"tile537"
		);
		assert_eq!(
			reader.get_tile(&source, &TileCoord::new(5, 3, 8)?)?.unwrap().as_slice(),
			b"tile538"
		);
		assert!(reader.get_tile(&source, &TileCoord::new(5, 0, 0)?)?.is_none());

		Ok(())
	}

	#[test]
	fn dot_prefixed_entries_are_normalized() -> Result<()> {
		let dir = TempDir::new()?;
		let path = dir.path().join("tiles.tar");
		write_fixture(&path, &[("./mapnik/5/3/7.png", b"tile537")]);

		let reader = TarArchiveReader::open_path(&path)?;
		assert!(reader.get_tile(&test_source(), &TileCoord::new(5, 3, 7)?)?.is_some());
		Ok(())
	}
}
