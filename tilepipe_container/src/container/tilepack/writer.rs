//! Write tilepack archives.

use super::{MAGIC, VERSION, data_file_path};
use anyhow::{Result, ensure};
use byteorder::{BE, WriteBytesExt};
use std::{
	fs::File,
	io::{BufWriter, Write},
	path::{Path, PathBuf},
};
use tilepipe_core::{Blob, TileCoord};

const DEFAULT_MAX_DATA_FILE_BYTES: u64 = 64 * 1024 * 1024;

struct IndexEntry {
	key: u64,
	file: u16,
	offset: u64,
	length: u32,
}

/// Builder producing a tilepack archive: tile data is appended to numbered
/// data files (rolling over at a size threshold), and [`finish`](Self::finish)
/// writes the index file.
pub struct TilepackBuilder {
	index_path: PathBuf,
	source_name: String,
	max_data_file_bytes: u64,
	entries: Vec<IndexEntry>,
	current: BufWriter<File>,
	current_ordinal: u16,
	current_offset: u64,
}

impl TilepackBuilder {
	/// Start a new tilepack at `path` (the index file path) for tiles of the
	/// named source.
	///
	/// # Errors
	/// Returns an error if the source name is empty or the first data file
	/// cannot be created.
	pub fn new(path: &Path, source_name: &str) -> Result<TilepackBuilder> {
		ensure!(!source_name.is_empty(), "tilepack source name must not be empty");

		let first = File::create(data_file_path(path, 1))?;
		Ok(TilepackBuilder {
			index_path: path.to_path_buf(),
			source_name: source_name.to_string(),
			max_data_file_bytes: DEFAULT_MAX_DATA_FILE_BYTES,
			entries: Vec::new(),
			current: BufWriter::new(first),
			current_ordinal: 1,
			current_offset: 0,
		})
	}

	/// Change the data file rollover threshold.
	#[must_use]
	pub fn with_max_data_file_bytes(mut self, max: u64) -> TilepackBuilder {
		self.max_data_file_bytes = max.max(1);
		self
	}

	/// Append one tile. Re-adding a key overwrites the earlier entry in the
	/// index (the stale bytes stay in the data file).
	///
	/// # Errors
	/// Returns an error on I/O failure or when the archive would exceed
	/// 65535 data files.
	pub fn add_tile(&mut self, coord: &TileCoord, blob: &Blob) -> Result<()> {
		if self.current_offset > 0 && self.current_offset + blob.len() > self.max_data_file_bytes {
			self.roll_over()?;
		}

		self.current.write_all(blob.as_slice())?;
		let key = coord.as_key();
		self.entries.retain(|e| e.key != key);
		self.entries.push(IndexEntry {
			key,
			file: self.current_ordinal,
			offset: self.current_offset,
			length: blob.len() as u32,
		});
		self.current_offset += blob.len();
		Ok(())
	}

	fn roll_over(&mut self) -> Result<()> {
		ensure!(self.current_ordinal < u16::MAX, "tilepack data file limit reached");
		self.current.flush()?;
		self.current_ordinal += 1;
		self.current = BufWriter::new(File::create(data_file_path(&self.index_path, self.current_ordinal))?);
		self.current_offset = 0;
		Ok(())
	}

	/// Flush the data files and write the index.
	///
	/// # Errors
	/// Returns an error on I/O failure.
	pub fn finish(mut self) -> Result<()> {
		self.current.flush()?;

		let mut writer = BufWriter::new(File::create(&self.index_path)?);
		writer.write_all(MAGIC)?;
		writer.write_u16::<BE>(VERSION)?;
		writer.write_u16::<BE>(self.source_name.len() as u16)?;
		writer.write_all(self.source_name.as_bytes())?;
		writer.write_u16::<BE>(self.current_ordinal)?;
		writer.write_u32::<BE>(self.entries.len() as u32)?;
		for entry in &self.entries {
			writer.write_u64::<BE>(entry.key)?;
			writer.write_u16::<BE>(entry.file)?;
			writer.write_u64::<BE>(entry.offset)?;
			writer.write_u32::<BE>(entry.length)?;
		}
		writer.flush()?;

		log::debug!(
			"wrote tilepack {:?}: {} tiles in {} data files",
			self.index_path,
			self.entries.len(),
			self.current_ordinal
		);
		Ok(())
	}
}
