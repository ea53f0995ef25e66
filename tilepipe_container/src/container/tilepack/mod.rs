//! The tilepack container: a chunked multi-file tile archive.
//!
//! A tilepack consists of an index file (`world.tilepack`) and one or more
//! numbered data files next to it (`world.tilepack-1`, `world.tilepack-2`,
//! ...). The index maps packed tile keys to `(data file, offset, length)`
//! triples; tile bytes live only in the data files, so very large archives
//! can be split across filesystem-friendly chunks.
//!
//! Index layout (all integers big-endian):
//!
//! ```text
//! magic           8 bytes  "TILEPACK"
//! version         u16      currently 1
//! source name     u16 length + UTF-8 bytes
//! data file count u16
//! entry count     u32
//! entries         entry count × (key u64, file u16, offset u64, length u32)
//! ```
//!
//! Data file ordinals are 1-based.

mod reader;
mod writer;

pub use reader::TilepackReader;
pub use writer::TilepackBuilder;

pub(crate) const MAGIC: &[u8; 8] = b"TILEPACK";
pub(crate) const VERSION: u16 = 1;

/// Derive the path of a data file from the index path and a 1-based ordinal.
pub(crate) fn data_file_path(index_path: &std::path::Path, ordinal: u16) -> std::path::PathBuf {
	let mut name = index_path.as_os_str().to_os_string();
	name.push(format!("-{ordinal}"));
	std::path::PathBuf::from(name)
}
