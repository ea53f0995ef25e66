//! Core types for the tilepipe pipeline: tile coordinates, blobs, formats,
//! tile source descriptors, and configuration.

pub mod config;

pub mod source;

pub mod types;

pub use config::Config;
pub use source::TileSource;
pub use types::*;
