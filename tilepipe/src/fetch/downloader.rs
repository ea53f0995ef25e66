//! The network tile loader.
//!
//! Downloads one tile per job over HTTP GET, following redirects itself (the
//! client's automatic redirect handling is disabled so the hop count stays
//! bounded and loggable), computing the cache expiration from the response
//! headers, and handing successful payloads to the cache store without
//! waiting for the write.

use crate::cache::CacheStore;
use crate::fetch::{UrlBackoff, compute_expiration};
use crate::queue::{CantContinue, LoadResult, LoadedTile, TileLoader};
use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use reqwest::{Client, Response, Url, header, redirect};
use std::{
	sync::Arc,
	time::{Duration, SystemTime},
};
use tilepipe_core::{Blob, Config, TileCoord, TileSource};

/// More redirect hops than this aborts the download; rare, but misconfigured
/// servers do produce redirect loops.
const MAX_REDIRECTS: u32 = 3;

/// The provider loader that fetches tiles over HTTP.
pub struct DownloadLoader {
	client: Client,
	config: Arc<Config>,
	source: Arc<ArcSwap<TileSource>>,
	backoff: UrlBackoff,
	store: Option<Arc<CacheStore>>,
}

impl DownloadLoader {
	/// Create the loader. `store` is where successful downloads are
	/// persisted; pass `None` to fetch without caching to disk.
	///
	/// # Errors
	/// Returns an error if the HTTP client cannot be constructed.
	pub fn new(
		config: Arc<Config>,
		source: Arc<ArcSwap<TileSource>>,
		store: Option<Arc<CacheStore>>,
	) -> Result<DownloadLoader> {
		let client = Client::builder()
			.tcp_keepalive(Duration::from_secs(600))
			.redirect(redirect::Policy::none())
			.use_rustls_tls()
			.build()?;

		let backoff = UrlBackoff::new(config.backoff_base, config.backoff_cap);

		Ok(DownloadLoader {
			client,
			config,
			source,
			backoff,
			store,
		})
	}

	/// Issue the GET, following up to [`MAX_REDIRECTS`] redirect hops.
	///
	/// `Ok(None)` is a failed attempt (bad status, redirect loop, empty
	/// body); `Err` is a transport-level failure.
	async fn download(&self, mut url: Url) -> Result<Option<(Blob, SystemTime)>> {
		for _hop in 0..=MAX_REDIRECTS {
			let mut request = self
				.client
				.get(url.clone())
				.header(header::USER_AGENT, self.config.user_agent.as_str());
			for (name, value) in &self.config.http_headers {
				request = request.header(name.as_str(), value.as_str());
			}

			let response = request.send().await?;
			let status = response.status();

			if status.is_redirection() {
				let Some(location) = response.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()) else {
					log::debug!("redirect without Location from '{url}'");
					return Ok(None);
				};
				// join() also resolves relative Location values
				url = url.join(location).with_context(|| format!("resolving redirect '{location}'"))?;
				log::debug!("following redirect to '{url}'");
				continue;
			}

			if !status.is_success() {
				log::debug!("download of '{url}' failed with status {status}");
				return Ok(None);
			}

			let cache_control = header_string(&response, header::CACHE_CONTROL);
			let expires_header = header_string(&response, header::EXPIRES);
			let expires = compute_expiration(
				&self.config,
				cache_control.as_deref(),
				expires_header.as_deref(),
				SystemTime::now(),
			);

			let bytes = response.bytes().await?;
			if bytes.is_empty() {
				// some servers answer 200 with an empty body for missing tiles
				log::debug!("empty body from '{url}'");
				return Ok(None);
			}

			return Ok(Some((Blob::from(bytes.as_ref()), expires)));
		}

		log::warn!("aborting download: more than {MAX_REDIRECTS} redirects ending at '{url}'");
		Ok(None)
	}

	/// Hand the payload to the cache store on a spawned task; the download
	/// result does not wait for the disk write.
	fn persist(&self, source: &TileSource, coord: &TileCoord, blob: &Blob, expires: SystemTime) {
		let Some(store) = &self.store else {
			return;
		};
		let store = Arc::clone(store);
		let source_name = source.name().to_string();
		let coord = *coord;
		let blob = blob.clone();
		tokio::spawn(async move {
			if let Err(e) = store.save(&source_name, &coord, &blob, Some(expires)) {
				log::warn!("failed to persist tile {coord:?} for '{source_name}': {e:#}");
			}
		});
	}
}

#[async_trait]
impl TileLoader for DownloadLoader {
	fn name(&self) -> &str {
		"downloader"
	}

	fn uses_network(&self) -> bool {
		true
	}

	async fn load_tile(&self, coord: &TileCoord) -> LoadResult {
		let source = self.source.load_full();
		if !source.covers_zoom(coord) {
			return Ok(None);
		}

		let url_string = source.tile_url(coord);
		let url = match Url::parse(&url_string) {
			Ok(url) => url,
			Err(e) => {
				// configuration error: permanent not-found, no backoff bookkeeping
				log::warn!("malformed tile URL '{url_string}': {e}");
				return Ok(None);
			}
		};

		if self.backoff.should_wait(&url_string) {
			log::trace!("skipping '{url_string}', still cooling down");
			return Ok(None);
		}

		match self.download(url).await {
			Ok(Some((blob, expires))) => {
				self.backoff.clear(&url_string);
				self.persist(&source, coord, &blob, expires);
				Ok(Some(LoadedTile::fresh(blob)))
			}
			Ok(None) => {
				self.backoff.arm(&url_string);
				Ok(None)
			}
			Err(e) => {
				self.backoff.arm(&url_string);
				if is_cant_continue(&e) {
					Err(CantContinue(e))
				} else {
					log::warn!("download of '{url_string}' failed: {e:#}");
					Ok(None)
				}
			}
		}
	}
}

fn header_string(response: &Response, name: header::HeaderName) -> Option<String> {
	response
		.headers()
		.get(name)
		.and_then(|value| value.to_str().ok())
		.map(str::to_string)
}

/// A connect-level failure affects every queued download, not just this one.
fn is_cant_continue(error: &anyhow::Error) -> bool {
	error
		.downcast_ref::<reqwest::Error>()
		.is_some_and(|e| e.is_connect() || e.is_timeout())
}

#[cfg(test)]
mod tests {
	use super::*;
	use tilepipe_core::TileFormat;

	fn loader_for(template: &str) -> DownloadLoader {
		let source = TileSource::new("mapnik", vec![template.to_string()], 3, 10, 256, TileFormat::PNG).unwrap();
		DownloadLoader::new(
			Config::default().arc(),
			Arc::new(ArcSwap::from_pointee(source)),
			None,
		)
		.unwrap()
	}

	#[tokio::test]
	async fn zoom_outside_the_source_range_is_a_miss() {
		let loader = loader_for("https://tile.example.org/{z}/{x}/{y}.png");
		let result = loader.load_tile(&TileCoord::new(2, 0, 0).unwrap()).await;
		assert!(matches!(result, Ok(None)));
	}

	#[tokio::test]
	async fn malformed_url_is_a_permanent_miss() {
		let loader = loader_for("not a url at all {z}/{x}/{y}");
		let result = loader.load_tile(&TileCoord::new(5, 3, 7).unwrap()).await;
		assert!(matches!(result, Ok(None)));
		// configuration errors do not arm the backoff
		assert!(loader.backoff.is_empty());
	}

	#[tokio::test]
	async fn refused_connection_escalates_to_cannot_continue() {
		// grab a port nothing listens on
		let port = {
			let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
			listener.local_addr().unwrap().port()
		};
		let loader = loader_for(&format!("http://127.0.0.1:{port}/{{z}}/{{x}}/{{y}}.png"));

		let result = loader.load_tile(&TileCoord::new(5, 3, 7).unwrap()).await;
		assert!(matches!(result, Err(CantContinue(_))));
		// and the URL is cooling down
		assert_eq!(loader.backoff.len(), 1);
	}
}
