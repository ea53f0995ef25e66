//! Open a tile archive by file extension.
//!
//! The registry maps an archive file's extension to the matching reader
//! implementation. An unregistered extension is a configuration error: it is
//! reported once and never retried, since no amount of retrying will teach
//! the registry a new container kind.

use crate::{SqliteArchiveReader, TarArchiveReader, TileArchiveTrait, TilepackReader, ZipArchiveReader};
use anyhow::{Context, Result, bail, ensure};
use std::{ffi::OsStr, path::Path};

/// Open an archive file, dispatching on its extension.
///
/// Recognized extensions: `zip`, `sqlite`, `db`, `tar`, `tilepack`.
///
/// # Errors
/// Returns an error if the path does not exist, the extension is unknown, or
/// the matching reader fails to open the file.
pub fn open_archive(path: &Path) -> Result<Box<dyn TileArchiveTrait>> {
	ensure!(path.exists(), "archive path {path:?} does not exist");

	let extension = path.extension().and_then(OsStr::to_str).unwrap_or("");
	let reader = match extension {
		"zip" => ZipArchiveReader::open_path(path)?.boxed(),
		"sqlite" | "db" => SqliteArchiveReader::open_path(path)?.boxed(),
		"tar" => TarArchiveReader::open_path(path)?.boxed(),
		"tilepack" => TilepackReader::open_path(path)?.boxed(),
		_ => bail!("unknown archive extension '{extension}' for {path:?}"),
	};

	log::debug!("opened {} archive {path:?}", reader.kind());
	Ok(reader)
}

/// Open every archive in a directory, skipping unrecognized files.
///
/// Files whose extension is not registered are logged and ignored, so a
/// directory of mixed content can be pointed at wholesale.
pub fn open_archives_in_dir(dir: &Path) -> Result<Vec<Box<dyn TileArchiveTrait>>> {
	ensure!(dir.is_dir(), "archive directory {dir:?} does not exist");

	let mut archives = Vec::new();
	for entry in std::fs::read_dir(dir).with_context(|| format!("reading archive directory {dir:?}"))? {
		let path = entry?.path();
		if !path.is_file() {
			continue;
		}
		match open_archive(&path) {
			Ok(archive) => archives.push(archive),
			Err(e) => log::debug!("skipping {path:?}: {e}"),
		}
	}
	Ok(archives)
}
