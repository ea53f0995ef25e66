//! Tilepipe: an asynchronous fetching and caching pipeline for map tiles.
//!
//! A tile request walks a fixed chain of providers in priority order
//! (in-memory cache, SQLite cache store, bundled archive files, network
//! download) and resolves with the first provider that has bytes. Every
//! I/O provider runs behind its own bounded [`queue::WorkQueue`]: a small
//! worker pool over a pending table that deduplicates requests per tile,
//! prefers the most recently requested tile, and sheds the oldest entries
//! under overload. Successful downloads are persisted with an expiration
//! derived from the HTTP caching headers; expired records are still served
//! while a background refresh runs.
//!
//! # Quick start
//! ```rust,no_run
//! use std::sync::Arc;
//! use tilepipe::{Config, TileCoord, TileFormat, TilePipelineBuilder, TileSource};
//! use tilepipe::cache::CacheStore;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default().arc();
//! let source = TileSource::new(
//! 	"mapnik",
//! 	vec!["https://tile.example.org/{z}/{x}/{y}.png".to_string()],
//! 	0,
//! 	19,
//! 	256,
//! 	TileFormat::PNG,
//! )?;
//!
//! let store = Arc::new(CacheStore::open_path("/tmp/tiles.sqlite".as_ref(), &config)?);
//! let pipeline = TilePipelineBuilder::new(config, source)
//! 	.with_cache_store(store)
//! 	.build()?;
//!
//! pipeline.request_tile(
//! 	TileCoord::new(5, 3, 7)?,
//! 	Arc::new(|response| {
//! 		match response.blob {
//! 			Some(blob) => println!("got {} bytes (stale: {})", blob.len(), response.stale),
//! 			None => println!("no tile available"),
//! 		}
//! 	}),
//! );
//! # Ok(())
//! # }
//! ```

pub mod cache;

pub mod connectivity;

pub mod fetch;

pub mod pipeline;

pub mod queue;

pub use pipeline::{TilePipeline, TilePipelineBuilder, TileResponder, TileResponse};
pub use tilepipe_core::{Blob, Config, TileCoord, TileFormat, TileSource};
