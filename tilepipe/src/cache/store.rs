//! The writable on-disk tile cache, backed by a single SQLite database.
//!
//! One `tiles` table holds every cached download:
//! `(key INTEGER, provider TEXT, tile BLOB, expires INTEGER,
//! PRIMARY KEY (key, provider))`. The packed tile key plus the source name
//! form the uniqueness constraint, so saving a tile again replaces the
//! earlier record. `expires` is epoch milliseconds; `NULL` means the record
//! never expires on its own.
//!
//! Disk usage is bounded by a two-phase sweep: first every expired record is
//! reaped, then, while the total payload still exceeds the hard ceiling,
//! records are trimmed in order of soonest expiry until the size falls to
//! the trim target. The sweep runs once when the store is opened and can be
//! re-triggered at any time.

use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::{SqliteConnectionManager, rusqlite::OptionalExtension, rusqlite::params};
use std::{
	fmt::Debug,
	path::Path,
	time::{Duration, SystemTime, UNIX_EPOCH},
};
use tilepipe_core::{Blob, Config, TileCoord};

const TRIM_BATCH: usize = 256;

/// One cached record: tile bytes plus the expiry stored alongside them.
#[derive(Debug)]
pub struct CachedTile {
	pub blob: Blob,
	pub expires: Option<SystemTime>,
}

/// What one cleanup sweep did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
	/// Records deleted because their expiry had passed.
	pub reaped: usize,
	/// Records deleted to get back under the size ceiling.
	pub trimmed: usize,
	/// Total payload bytes after the sweep.
	pub bytes_after: u64,
}

/// The SQLite-backed filesystem cache store.
pub struct CacheStore {
	name: String,
	pool: Pool<SqliteConnectionManager>,
	max_bytes: u64,
	trim_bytes: u64,
}

impl CacheStore {
	/// Open (or create) the cache database and run an initial cleanup sweep.
	///
	/// # Errors
	/// Returns an error if the database cannot be opened or the schema
	/// cannot be created.
	pub fn open_path(path: &Path, config: &Config) -> Result<CacheStore> {
		log::debug!("open cache store {path:?}");

		let manager = SqliteConnectionManager::file(path);
		let pool = Pool::builder().max_size(10).build(manager)?;

		pool.get()?.execute_batch(
			"CREATE TABLE IF NOT EXISTS tiles (key INTEGER, provider TEXT, tile BLOB, expires INTEGER, PRIMARY KEY (key, provider));
			CREATE INDEX IF NOT EXISTS expires_index ON tiles (expires);",
		)?;

		let store = CacheStore {
			name: path.to_string_lossy().to_string(),
			pool,
			max_bytes: config.cache_max_bytes,
			trim_bytes: config.cache_trim_bytes.min(config.cache_max_bytes),
		};

		let report = store.run_cleanup(SystemTime::now())?;
		if report.reaped + report.trimmed > 0 {
			log::info!(
				"cache store '{}': reaped {} expired and trimmed {} records on startup",
				store.name,
				report.reaped,
				report.trimmed
			);
		}

		Ok(store)
	}

	/// Insert a tile, replacing any existing record for the same
	/// `(source, tile)` pair.
	pub fn save(&self, source_name: &str, coord: &TileCoord, blob: &Blob, expires: Option<SystemTime>) -> Result<()> {
		log::trace!("save {coord:?} for '{source_name}'");
		self
			.pool
			.get()?
			.execute(
				"INSERT OR REPLACE INTO tiles (key, provider, tile, expires) VALUES (?1, ?2, ?3, ?4)",
				params![coord.as_key() as i64, source_name, blob.as_slice(), expires.map(to_millis)],
			)
			.with_context(|| format!("saving tile {coord:?} to '{}'", self.name))?;
		Ok(())
	}

	/// Point lookup of bytes and expiry.
	pub fn load(&self, source_name: &str, coord: &TileCoord) -> Result<Option<CachedTile>> {
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare_cached("SELECT tile, expires FROM tiles WHERE key = ?1 AND provider = ?2")?;
		let row: Option<(Vec<u8>, Option<i64>)> = stmt
			.query_row(params![coord.as_key() as i64, source_name], |row| {
				Ok((row.get(0)?, row.get(1)?))
			})
			.optional()
			.with_context(|| format!("loading tile {coord:?} from '{}'", self.name))?;

		Ok(row.map(|(bytes, expires)| CachedTile {
			blob: Blob::from(bytes),
			expires: expires.map(from_millis),
		}))
	}

	/// Fetch only the stored expiry, avoiding the blob read when a caller
	/// merely decides freshness.
	pub fn expiration(&self, source_name: &str, coord: &TileCoord) -> Result<Option<SystemTime>> {
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare_cached("SELECT expires FROM tiles WHERE key = ?1 AND provider = ?2")?;
		let row: Option<Option<i64>> = stmt
			.query_row(params![coord.as_key() as i64, source_name], |row| row.get(0))
			.optional()?;
		Ok(row.flatten().map(from_millis))
	}

	/// Whether a record exists for the pair, expired or not.
	pub fn contains(&self, source_name: &str, coord: &TileCoord) -> Result<bool> {
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare_cached("SELECT 1 FROM tiles WHERE key = ?1 AND provider = ?2")?;
		let row: Option<i64> = stmt
			.query_row(params![coord.as_key() as i64, source_name], |row| row.get(0))
			.optional()?;
		Ok(row.is_some())
	}

	/// Delete one record. Returns whether a record was there.
	pub fn remove(&self, source_name: &str, coord: &TileCoord) -> Result<bool> {
		let deleted = self.pool.get()?.execute(
			"DELETE FROM tiles WHERE key = ?1 AND provider = ?2",
			params![coord.as_key() as i64, source_name],
		)?;
		Ok(deleted > 0)
	}

	/// Delete every record of one source. Returns the number deleted.
	pub fn purge(&self, source_name: &str) -> Result<usize> {
		let deleted = self
			.pool
			.get()?
			.execute("DELETE FROM tiles WHERE provider = ?1", params![source_name])?;
		log::debug!("purged {deleted} records of '{source_name}' from '{}'", self.name);
		Ok(deleted)
	}

	/// Number of stored records.
	pub fn row_count(&self) -> Result<u64> {
		let count: i64 = self.pool.get()?.query_row("SELECT count(*) FROM tiles", [], |row| row.get(0))?;
		Ok(count as u64)
	}

	/// Total payload bytes across all records.
	pub fn total_size(&self) -> Result<u64> {
		let sum: Option<i64> = self
			.pool
			.get()?
			.query_row("SELECT SUM(LENGTH(tile)) FROM tiles", [], |row| row.get(0))?;
		Ok(sum.unwrap_or(0) as u64)
	}

	/// The two-phase sweep: reap expired records, then trim by size.
	///
	/// Trimming deletes records in order of soonest expiry (records without
	/// an expiry last) until total size is at or below the trim target. A
	/// record with an expiry in the future is only ever deleted by this
	/// second phase.
	pub fn run_cleanup(&self, now: SystemTime) -> Result<CleanupReport> {
		let mut report = CleanupReport::default();

		report.reaped = self
			.pool
			.get()?
			.execute(
				"DELETE FROM tiles WHERE expires IS NOT NULL AND expires < ?1",
				params![to_millis(now)],
			)
			.with_context(|| format!("reaping expired tiles in '{}'", self.name))?;

		let mut size = self.total_size()?;
		if size > self.max_bytes {
			log::debug!(
				"cache store '{}' holds {size} bytes (ceiling {}), trimming to {}",
				self.name,
				self.max_bytes,
				self.trim_bytes
			);
			while size > self.trim_bytes {
				let trimmed = self.trim_batch(&mut size)?;
				if trimmed == 0 {
					break;
				}
				report.trimmed += trimmed;
			}
		}

		report.bytes_after = size;
		Ok(report)
	}

	/// Delete up to one batch of records in soonest-expiry order, updating
	/// `size` as payload bytes are freed. Returns the number deleted.
	fn trim_batch(&self, size: &mut u64) -> Result<usize> {
		let mut conn = self.pool.get()?;

		let victims: Vec<(i64, String, u64)> = {
			let mut stmt = conn.prepare_cached(
				"SELECT key, provider, LENGTH(tile) FROM tiles ORDER BY (expires IS NULL), expires ASC LIMIT ?1",
			)?;
			let rows = stmt.query_map(params![TRIM_BATCH as i64], |row| {
				Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)? as u64))
			})?;
			rows.collect::<std::result::Result<_, _>>()?
		};

		if victims.is_empty() {
			return Ok(0);
		}

		let transaction = conn.transaction()?;
		let mut deleted = 0;
		for (key, provider, length) in victims {
			if *size <= self.trim_bytes {
				break;
			}
			transaction.execute(
				"DELETE FROM tiles WHERE key = ?1 AND provider = ?2",
				params![key, provider],
			)?;
			*size = size.saturating_sub(length);
			deleted += 1;
		}
		transaction.commit()?;
		Ok(deleted)
	}
}

impl Debug for CacheStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CacheStore")
			.field("name", &self.name)
			.field("max_bytes", &self.max_bytes)
			.field("trim_bytes", &self.trim_bytes)
			.finish()
	}
}

fn to_millis(time: SystemTime) -> i64 {
	time.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

fn from_millis(millis: i64) -> SystemTime {
	UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}
