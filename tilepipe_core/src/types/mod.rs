//! Leaf data types passed through the pipeline.

mod blob;
mod tile_coord;
mod tile_format;

pub use blob::Blob;
pub use tile_coord::TileCoord;
pub use tile_format::TileFormat;
