//! Read tiles from a SQLite tile database.
//!
//! The database carries a single `tiles` table of the same shape the cache
//! store writes: `(key INTEGER, provider TEXT, tile BLOB)`, where `key` is
//! the packed tile index. Lookups try `(key, provider)` first and fall back
//! to key-only, because archives produced for exactly one source are often
//! written without a provider value.

use crate::TileArchiveTrait;
use anyhow::{Context, Result, ensure};
use r2d2::Pool;
use r2d2_sqlite::{SqliteConnectionManager, rusqlite::OptionalExtension};
use std::{fmt::Debug, path::Path};
use tilepipe_core::{Blob, TileCoord, TileSource};

/// Reader for SQLite tile archives.
pub struct SqliteArchiveReader {
	name: String,
	pool: Pool<SqliteConnectionManager>,
}

impl SqliteArchiveReader {
	/// Open a SQLite tile database from a file path.
	///
	/// # Errors
	/// Returns an error if the file does not exist, cannot be opened, or has
	/// no `tiles` table.
	pub fn open_path(path: &Path) -> Result<SqliteArchiveReader> {
		log::debug!("open sqlite archive {path:?}");

		ensure!(path.exists(), "file {path:?} does not exist");

		let manager = SqliteConnectionManager::file(path).with_flags(
			r2d2_sqlite::rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | r2d2_sqlite::rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
		);
		let pool = Pool::builder().max_size(4).build(manager)?;

		let reader = SqliteArchiveReader {
			name: path.to_string_lossy().to_string(),
			pool,
		};

		let count: i64 = reader
			.pool
			.get()?
			.query_row(
				"SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'tiles'",
				[],
				|row| row.get(0),
			)
			.with_context(|| format!("probing {path:?}"))?;
		ensure!(count == 1, "{path:?} has no 'tiles' table");

		Ok(reader)
	}
}

impl TileArchiveTrait for SqliteArchiveReader {
	fn name(&self) -> &str {
		&self.name
	}

	fn kind(&self) -> &'static str {
		"sqlite"
	}

	fn get_tile(&self, source: &TileSource, coord: &TileCoord) -> Result<Option<Blob>> {
		let key = coord.as_key() as i64;
		let conn = self.pool.get()?;

		let mut stmt = conn.prepare_cached("SELECT tile FROM tiles WHERE key = ?1 AND provider = ?2")?;
		let row: Option<Vec<u8>> = stmt
			.query_row((key, source.name()), |row| row.get(0))
			.optional()
			.with_context(|| format!("querying tile {coord:?} in '{}'", self.name))?;

		if let Some(bytes) = row {
			return Ok(Some(Blob::from(bytes)));
		}

		// single-source archives may leave the provider column empty
		let mut stmt = conn.prepare_cached("SELECT tile FROM tiles WHERE key = ?1")?;
		let row: Option<Vec<u8>> = stmt
			.query_row([key], |row| row.get(0))
			.optional()
			.with_context(|| format!("querying tile {coord:?} in '{}'", self.name))?;

		Ok(row.map(Blob::from))
	}
}

impl Debug for SqliteArchiveReader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SqliteArchiveReader").field("name", &self.name).finish()
	}
}
