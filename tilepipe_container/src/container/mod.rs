mod getters;
mod sqlite;
mod tar;
mod tilepack;
mod zip;

pub use getters::{open_archive, open_archives_in_dir};
pub use sqlite::SqliteArchiveReader;
pub use tar::TarArchiveReader;
pub use tilepack::{TilepackBuilder, TilepackReader};
pub use zip::ZipArchiveReader;
