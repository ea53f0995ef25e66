//! Compute a cached tile's expiration from HTTP response headers.

use std::time::SystemTime;
use tilepipe_core::Config;

/// Compute the expiration timestamp of a freshly downloaded tile.
///
/// Precedence, highest first:
/// 1. the configured override duration,
/// 2. `Cache-Control: max-age` plus the configured extension,
/// 3. the `Expires` header plus the configured extension,
/// 4. now plus the default TTL.
#[must_use]
pub fn compute_expiration(
	config: &Config,
	cache_control: Option<&str>,
	expires: Option<&str>,
	now: SystemTime,
) -> SystemTime {
	if let Some(override_duration) = config.expiration_override {
		return now + override_duration;
	}

	let extension = config.expiration_extension;

	if let Some(max_age) = cache_control.and_then(max_age_seconds) {
		return now + std::time::Duration::from_secs(max_age) + extension;
	}

	if let Some(header) = expires {
		match httpdate::parse_http_date(header) {
			Ok(when) => return when + extension,
			Err(_) => log::debug!("unparseable Expires header: '{header}'"),
		}
	}

	now + config.default_tile_ttl
}

/// Extract the `max-age` directive from a `Cache-Control` header value.
fn max_age_seconds(header: &str) -> Option<u64> {
	header
		.split(',')
		.find_map(|part| part.trim().strip_prefix("max-age=")?.parse().ok())
}
