//! Integration tests walking the whole provider chain: memory cache, SQLite
//! cache store, archives, and a local HTTP tile server.

use anyhow::Result;
use assert_fs::TempDir;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tilepipe::cache::CacheStore;
use tilepipe::connectivity::ConnectivityCheck;
use tilepipe::{Blob, Config, TileCoord, TileFormat, TilePipelineBuilder, TileResponse, TileSource};

mod support;
use support::TestServer;

fn test_config() -> Config {
	Config {
		// keep download retreat windows short so failing tests fail fast
		backoff_base: Duration::from_millis(50),
		backoff_cap: Duration::from_millis(200),
		..Config::default()
	}
}

fn source_for(server: &TestServer, prefix: &str) -> TileSource {
	TileSource::new(
		"mapnik",
		vec![format!("http://{}/{prefix}/{{z}}/{{x}}/{{y}}.png", server.addr())],
		0,
		19,
		256,
		TileFormat::PNG,
	)
	.unwrap()
}

fn offline_source() -> TileSource {
	TileSource::new(
		"mapnik",
		vec!["http://192.0.2.1/{z}/{x}/{y}.png".to_string()],
		0,
		19,
		256,
		TileFormat::PNG,
	)
	.unwrap()
}

fn open_store(dir: &TempDir, config: &Config) -> Arc<CacheStore> {
	Arc::new(CacheStore::open_path(&dir.path().join("cache.sqlite"), config).unwrap())
}

async fn next_response(rx: &mut tokio::sync::mpsc::UnboundedReceiver<TileResponse>) -> TileResponse {
	tokio::time::timeout(Duration::from_secs(10), rx.recv())
		.await
		.expect("timed out waiting for a tile response")
		.expect("response channel closed")
}

/// Poll until the store holds a record for the coordinate, or give up.
async fn wait_for_persistence(store: &CacheStore, source: &str, coord: &TileCoord, bytes: &[u8]) {
	for _ in 0..200 {
		if let Some(record) = store.load(source, coord).unwrap() {
			if record.blob.as_slice() == bytes {
				return;
			}
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("tile {coord:?} was never persisted");
}

#[tokio::test]
async fn fresh_disk_record_short_circuits_the_network() -> Result<()> {
	support::init_logging();
	let server = TestServer::serving_tiles(b"from-network");
	let dir = TempDir::new()?;
	let config = test_config().arc();
	let store = open_store(&dir, &config);

	let coord = TileCoord::new(5, 3, 7)?;
	store.save(
		"mapnik",
		&coord,
		&Blob::from(b"from-disk"),
		Some(SystemTime::now() + Duration::from_secs(3600)),
	)?;

	let pipeline = TilePipelineBuilder::new(Arc::clone(&config), source_for(&server, "tiles"))
		.with_cache_store(store)
		.build()?;

	let mut rx = pipeline.request_tile_stream(coord);
	let response = next_response(&mut rx).await;
	assert_eq!(response.blob.unwrap().as_slice(), b"from-disk");
	assert!(!response.stale);

	// the network provider was never invoked
	assert_eq!(server.hits(), 0);
	Ok(())
}

#[tokio::test]
async fn download_persists_and_feeds_the_memory_cache() -> Result<()> {
	support::init_logging();
	let server = TestServer::serving_tiles_with_max_age(b"fresh-bytes", 60);
	let dir = TempDir::new()?;
	let config = test_config().arc();
	let store = open_store(&dir, &config);

	let pipeline = TilePipelineBuilder::new(Arc::clone(&config), source_for(&server, "tiles"))
		.with_cache_store(Arc::clone(&store))
		.build()?;

	let coord = TileCoord::new(5, 3, 7)?;
	let mut rx = pipeline.request_tile_stream(coord);
	let response = next_response(&mut rx).await;
	assert_eq!(response.blob.unwrap().as_slice(), b"fresh-bytes");
	assert_eq!(server.hits(), 1);

	// fire-and-forget persistence lands with the max-age expiry applied
	wait_for_persistence(&store, "mapnik", &coord, b"fresh-bytes").await;
	let expires = store.expiration("mapnik", &coord)?.expect("expiry was stored");
	let ttl = expires.duration_since(SystemTime::now()).unwrap_or_default();
	assert!(ttl > Duration::from_secs(50) && ttl <= Duration::from_secs(70), "ttl was {ttl:?}");

	// the second request is a memory-cache hit, no further network traffic
	assert_eq!(pipeline.memory_cache_len(), 1);
	let mut rx = pipeline.request_tile_stream(coord);
	let response = next_response(&mut rx).await;
	assert_eq!(response.blob.unwrap().as_slice(), b"fresh-bytes");
	assert_eq!(server.hits(), 1);
	Ok(())
}

#[tokio::test]
async fn expired_record_is_served_stale_then_refreshed() -> Result<()> {
	support::init_logging();
	let server = TestServer::serving_tiles_with_max_age(b"refreshed", 60);
	let dir = TempDir::new()?;
	let config = test_config().arc();
	let store = open_store(&dir, &config);

	let coord = TileCoord::new(5, 3, 7)?;
	store.save(
		"mapnik",
		&coord,
		&Blob::from(b"stale-bytes"),
		Some(SystemTime::now() - Duration::from_secs(60)),
	)?;

	let pipeline = TilePipelineBuilder::new(Arc::clone(&config), source_for(&server, "tiles"))
		.with_cache_store(Arc::clone(&store))
		.build()?;

	let mut rx = pipeline.request_tile_stream(coord);

	// the stale bytes come back immediately for display...
	let first = next_response(&mut rx).await;
	assert!(first.stale);
	assert_eq!(first.blob.unwrap().as_slice(), b"stale-bytes");

	// ...and the background refresh delivers the fresh tile
	let second = next_response(&mut rx).await;
	assert!(!second.stale);
	assert_eq!(second.blob.unwrap().as_slice(), b"refreshed");
	assert_eq!(server.hits(), 1);

	// the refreshed payload replaces the expired record
	wait_for_persistence(&store, "mapnik", &coord, b"refreshed").await;
	Ok(())
}

#[tokio::test]
async fn exhausted_chain_resolves_empty() -> Result<()> {
	support::init_logging();
	let server = TestServer::serving_status(404);
	let dir = TempDir::new()?;
	let config = test_config().arc();

	let pipeline = TilePipelineBuilder::new(Arc::clone(&config), source_for(&server, "tiles"))
		.with_cache_store(open_store(&dir, &config))
		.build()?;

	let mut rx = pipeline.request_tile_stream(TileCoord::new(5, 3, 7)?);
	let response = next_response(&mut rx).await;
	assert!(response.blob.is_none());
	assert!(!response.stale);
	assert_eq!(server.hits(), 1);
	Ok(())
}

#[tokio::test]
async fn redirects_are_followed_to_the_tile() -> Result<()> {
	support::init_logging();
	let server = TestServer::redirecting_once("/tiles", "/moved", b"behind-redirect");
	let config = test_config().arc();

	let pipeline = TilePipelineBuilder::new(Arc::clone(&config), source_for(&server, "tiles")).build()?;

	let mut rx = pipeline.request_tile_stream(TileCoord::new(5, 3, 7)?);
	let response = next_response(&mut rx).await;
	assert_eq!(response.blob.unwrap().as_slice(), b"behind-redirect");
	assert_eq!(server.hits(), 2);
	Ok(())
}

#[tokio::test]
async fn a_redirect_loop_is_bounded_and_fails() -> Result<()> {
	support::init_logging();
	let server = TestServer::redirect_loop();
	let config = test_config().arc();

	let pipeline = TilePipelineBuilder::new(Arc::clone(&config), source_for(&server, "tiles")).build()?;

	let mut rx = pipeline.request_tile_stream(TileCoord::new(5, 3, 7)?);
	let response = next_response(&mut rx).await;
	assert!(response.blob.is_none());

	// the initial request plus exactly three followed hops
	assert_eq!(server.hits(), 4);
	Ok(())
}

#[tokio::test]
async fn concurrent_requests_for_one_tile_coalesce() -> Result<()> {
	support::init_logging();
	let server = TestServer::serving_tiles_slowly(b"slow-tile", Duration::from_millis(200));
	let config = test_config().arc();

	let pipeline = TilePipelineBuilder::new(Arc::clone(&config), source_for(&server, "tiles")).build()?;

	let coord = TileCoord::new(5, 3, 7)?;
	let mut rx_a = pipeline.request_tile_stream(coord);
	let mut rx_b = pipeline.request_tile_stream(coord);
	assert_eq!(pipeline.in_flight_count(), 1);

	let a = next_response(&mut rx_a).await;
	let b = next_response(&mut rx_b).await;
	assert_eq!(a.blob.unwrap().as_slice(), b"slow-tile");
	assert_eq!(b.blob.unwrap().as_slice(), b"slow-tile");

	// one logical request, one download
	assert_eq!(server.hits(), 1);
	Ok(())
}

struct Offline;

impl ConnectivityCheck for Offline {
	fn network_available(&self) -> bool {
		false
	}
}

#[tokio::test]
async fn network_provider_is_skipped_while_offline() -> Result<()> {
	support::init_logging();
	let dir = TempDir::new()?;
	let config = test_config().arc();

	let pipeline = TilePipelineBuilder::new(Arc::clone(&config), offline_source())
		.with_cache_store(open_store(&dir, &config))
		.with_connectivity(Arc::new(Offline))
		.build()?;

	// empty store + skipped network: the chain exhausts without touching
	// the unroutable host, so this resolves quickly instead of timing out
	let started = std::time::Instant::now();
	let mut rx = pipeline.request_tile_stream(TileCoord::new(5, 3, 7)?);
	let response = next_response(&mut rx).await;
	assert!(response.blob.is_none());
	assert!(started.elapsed() < Duration::from_secs(5));
	Ok(())
}

#[tokio::test]
async fn archives_serve_between_store_and_network() -> Result<()> {
	support::init_logging();
	let dir = TempDir::new()?;
	let config = test_config().arc();

	// pack an archive holding the requested tile
	let archive_path = dir.path().join("bundle.tilepack");
	let coord = TileCoord::new(5, 3, 7)?;
	let mut builder = tilepipe_container::TilepackBuilder::new(&archive_path, "mapnik")?;
	builder.add_tile(&coord, &Blob::from(b"from-archive"))?;
	builder.finish()?;

	let pipeline = TilePipelineBuilder::new(Arc::clone(&config), offline_source())
		.with_cache_store(open_store(&dir, &config))
		.with_archives(vec![tilepipe_container::open_archive(&archive_path)?])
		.without_downloads()
		.build()?;

	let mut rx = pipeline.request_tile_stream(coord);
	let response = next_response(&mut rx).await;
	assert_eq!(response.blob.unwrap().as_slice(), b"from-archive");

	// tiles the archive lacks exhaust the chain
	let mut rx = pipeline.request_tile_stream(TileCoord::new(5, 0, 0)?);
	assert!(next_response(&mut rx).await.blob.is_none());
	Ok(())
}

#[tokio::test]
async fn source_swap_redirects_subsequent_fetches() -> Result<()> {
	support::init_logging();
	let server = TestServer::serving_by_prefix(vec![
		("/old".to_string(), b"old-style".to_vec()),
		("/new".to_string(), b"new-style".to_vec()),
	]);
	let config = test_config().arc();

	let pipeline = TilePipelineBuilder::new(Arc::clone(&config), source_for(&server, "old")).build()?;

	let coord = TileCoord::new(5, 3, 7)?;
	let mut rx = pipeline.request_tile_stream(coord);
	assert_eq!(next_response(&mut rx).await.blob.unwrap().as_slice(), b"old-style");

	pipeline.set_source(source_for(&server, "new"));
	assert_eq!(pipeline.memory_cache_len(), 0, "source swap clears the memory cache");

	let mut rx = pipeline.request_tile_stream(coord);
	assert_eq!(next_response(&mut rx).await.blob.unwrap().as_slice(), b"new-style");
	Ok(())
}

#[tokio::test]
async fn out_of_range_zoom_resolves_empty_without_a_flight() -> Result<()> {
	support::init_logging();
	let config = test_config().arc();
	let source = TileSource::new(
		"mapnik",
		vec!["http://192.0.2.1/{z}/{x}/{y}.png".to_string()],
		5,
		10,
		256,
		TileFormat::PNG,
	)?;
	let pipeline = TilePipelineBuilder::new(Arc::clone(&config), source).build()?;

	let mut rx = pipeline.request_tile_stream(TileCoord::new(2, 0, 0)?);
	let response = next_response(&mut rx).await;
	assert!(response.blob.is_none());
	assert_eq!(pipeline.in_flight_count(), 0);
	Ok(())
}
