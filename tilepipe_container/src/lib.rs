//! Tilepipe containers: read tiles out of packaged archive files.
//!
//! This crate exposes the archive side of the tile pipeline:
//! - [`TileArchiveTrait`], the object-safe contract every container kind
//!   implements: a point lookup returning raw tile bytes or "absent",
//! - one reader per container kind: zip, SQLite tile database, tar, and the
//!   chunked multi-file [`tilepack`](crate::TilepackReader) format,
//! - [`open_archive`], which picks the reader from the file extension,
//! - [`TilepackBuilder`] to produce tilepack archives.
//!
//! Archives are strictly read-only; the writable cache store lives in the
//! `tilepipe` crate.
//!
//! # Quick start
//! ```rust,no_run
//! use tilepipe_container::open_archive;
//! use tilepipe_core::{TileCoord, TileFormat, TileSource};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let archive = open_archive(Path::new("/absolute/path/to/world.zip"))?;
//! let source = TileSource::new(
//! 	"mapnik",
//! 	vec!["https://tile.example.org/{z}/{x}/{y}.png".to_string()],
//! 	0,
//! 	19,
//! 	256,
//! 	TileFormat::PNG,
//! )?;
//! let tile = archive.get_tile(&source, &TileCoord::new(5, 3, 7)?)?;
//! # Ok(())
//! # }
//! ```

mod container;
/// Re-exports the archive readers, the tilepack builder, and [`open_archive`].
pub use container::*;

mod types;
/// Re-exports the archive trait.
pub use types::*;
