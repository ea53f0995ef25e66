mod reader;

pub use reader::ZipArchiveReader;
