//! Network tile acquisition: the downloader, URL backoff, and the
//! expiration policy applied to HTTP caching headers.

mod backoff;
mod downloader;
mod expiration;

pub use backoff::UrlBackoff;
pub use downloader::DownloadLoader;
pub use expiration::compute_expiration;
