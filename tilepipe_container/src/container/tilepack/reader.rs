//! Read tiles from a tilepack archive.
//!
//! The index is parsed eagerly into a key map at open time; tile lookups are
//! positioned reads against the data files.

use super::{MAGIC, VERSION, data_file_path};
use crate::TileArchiveTrait;
use anyhow::{Context, Result, ensure};
use byteorder::{BE, ReadBytesExt};
use parking_lot::Mutex;
use std::{
	collections::HashMap,
	fmt::Debug,
	fs::File,
	io::{BufReader, Read, Seek, SeekFrom},
	path::Path,
};
use tilepipe_core::{Blob, TileCoord, TileSource};

struct PackEntry {
	file: u16,
	offset: u64,
	length: u32,
}

/// Reader for tilepack archives.
pub struct TilepackReader {
	name: String,
	source_name: String,
	index: HashMap<u64, PackEntry>,
	// ordinal-1 indexed, open for the lifetime of the reader
	data_files: Vec<Mutex<File>>,
}

impl TilepackReader {
	/// Open a tilepack archive by its index file path.
	///
	/// # Errors
	/// Returns an error if the index is missing, malformed, of an unsupported
	/// version, or references data files that cannot be opened.
	pub fn open_path(path: &Path) -> Result<TilepackReader> {
		log::debug!("open tilepack archive {path:?}");

		let mut reader = BufReader::new(File::open(path).with_context(|| format!("opening {path:?}"))?);

		let mut magic = [0u8; 8];
		reader.read_exact(&mut magic)?;
		ensure!(&magic == MAGIC, "{path:?} is not a tilepack index");

		let version = reader.read_u16::<BE>()?;
		ensure!(version == VERSION, "unsupported tilepack version {version}");

		let name_length = reader.read_u16::<BE>()? as usize;
		let mut name_bytes = vec![0u8; name_length];
		reader.read_exact(&mut name_bytes)?;
		let source_name = String::from_utf8(name_bytes).context("tilepack source name is not UTF-8")?;

		let file_count = reader.read_u16::<BE>()?;
		ensure!(file_count > 0, "tilepack {path:?} declares no data files");

		let entry_count = reader.read_u32::<BE>()?;
		let mut index = HashMap::with_capacity(entry_count as usize);
		for _ in 0..entry_count {
			let key = reader.read_u64::<BE>()?;
			let entry = PackEntry {
				file: reader.read_u16::<BE>()?,
				offset: reader.read_u64::<BE>()?,
				length: reader.read_u32::<BE>()?,
			};
			ensure!(
				entry.file >= 1 && entry.file <= file_count,
				"tilepack entry references data file {} of {file_count}",
				entry.file
			);
			index.insert(key, entry);
		}

		let mut data_files = Vec::with_capacity(file_count as usize);
		for ordinal in 1..=file_count {
			let data_path = data_file_path(path, ordinal);
			data_files.push(Mutex::new(
				File::open(&data_path).with_context(|| format!("opening tilepack data file {data_path:?}"))?,
			));
		}

		Ok(TilepackReader {
			name: path.to_string_lossy().to_string(),
			source_name,
			index,
			data_files,
		})
	}

	/// The source this archive was packed for.
	#[must_use]
	pub fn source_name(&self) -> &str {
		&self.source_name
	}
}

impl TileArchiveTrait for TilepackReader {
	fn name(&self) -> &str {
		&self.name
	}

	fn kind(&self) -> &'static str {
		"tilepack"
	}

	fn get_tile(&self, source: &TileSource, coord: &TileCoord) -> Result<Option<Blob>> {
		if source.name() != self.source_name {
			return Ok(None);
		}
		let Some(entry) = self.index.get(&coord.as_key()) else {
			return Ok(None);
		};

		let mut bytes = vec![0u8; entry.length as usize];
		let mut file = self.data_files[usize::from(entry.file) - 1].lock();
		file.seek(SeekFrom::Start(entry.offset))?;
		file
			.read_exact(&mut bytes)
			.with_context(|| format!("reading tile {coord:?} from '{}'", self.name))?;

		Ok(Some(Blob::from(bytes)))
	}
}

impl Debug for TilepackReader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TilepackReader")
			.field("name", &self.name)
			.field("source", &self.source_name)
			.field("tiles", &self.index.len())
			.field("data_files", &self.data_files.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::super::TilepackBuilder;
	use super::*;
	use assert_fs::TempDir;
	use tilepipe_core::TileFormat;

	fn test_source(name: &str) -> TileSource {
		TileSource::new(
			name,
			vec!["https://tile.example.org/{z}/{x}/{y}.png".to_string()],
			0,
			19,
			256,
			TileFormat::PNG,
		)
		.unwrap()
	}

	#[test]
	fn round_trip_across_data_files() -> Result<()> {
		let dir = TempDir::new()?;
		let path = dir.path().join("world.tilepack");

		// 8-byte rollover forces one data file per tile
		let mut builder = TilepackBuilder::new(&path, "mapnik")?.with_max_data_file_bytes(8);
		let tiles = [
			(TileCoord::new(5, 3, 7)?, b"tile-537".as_slice()),
			(TileCoord::new(5, 3, 8)?, b"tile-538".as_slice()),
			(TileCoord::new(9, 274, 167)?, b"tile-274-167".as_slice()),
		];
		for (coord, bytes) in &tiles {
			builder.add_tile(coord, &Blob::from(*bytes))?;
		}
		builder.finish()?;

		let reader = TilepackReader::open_path(&path)?;
		assert_eq!(reader.source_name(), "mapnik");
		assert_eq!(reader.data_files.len(), 3);

		let source = test_source("mapnik");
		for (coord, bytes) in &tiles {
			assert_eq!(reader.get_tile(&source, coord)?.unwrap().as_slice(), *bytes);
		}
		assert!(reader.get_tile(&source, &TileCoord::new(5, 0, 0)?)?.is_none());

		Ok(())
	}

	#[test]
	fn foreign_source_misses() -> Result<()> {
		let dir = TempDir::new()?;
		let path = dir.path().join("world.tilepack");

		let mut builder = TilepackBuilder::new(&path, "mapnik")?;
		builder.add_tile(&TileCoord::new(1, 0, 0)?, &Blob::from(b"t"))?;
		builder.finish()?;

		let reader = TilepackReader::open_path(&path)?;
		assert!(reader.get_tile(&test_source("topo"), &TileCoord::new(1, 0, 0)?)?.is_none());
		Ok(())
	}

	#[test]
	fn rejects_wrong_magic() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("world.tilepack");
		std::fs::write(&path, b"NOTAPACKxxxxxxxxxxxx").unwrap();
		let err = TilepackReader::open_path(&path).unwrap_err();
		assert!(err.to_string().contains("not a tilepack index"));
	}
}
