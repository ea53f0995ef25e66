mod reader;

pub use reader::SqliteArchiveReader;
