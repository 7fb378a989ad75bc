//! Environment-driven service configuration and internal tuning constants.

// std
use std::{env, fmt::Display, str::FromStr};
// crates.io
use url::Url;
// self
use crate::_prelude::*;

/// TTL for cached endpoint configuration.
pub const ENDPOINT_CACHE_TTL: Duration = Duration::from_secs(60);
/// TTL for cached owner quota.
pub const QUOTA_CACHE_TTL: Duration = Duration::from_secs(30);
/// Time trigger for batch flushes, measured from the most recent enqueue.
pub const BATCH_FLUSH_INTERVAL: Duration = Duration::from_millis(100);
/// Size trigger for batch flushes.
pub const BATCH_MAX_SIZE: usize = 50;
/// Maximum inbound webhook body accepted at the edge (100 KiB).
pub const MAX_BODY_SIZE: usize = 100 * 1024;
/// Maximum store response size the receiver will decode (1 MiB).
pub const MAX_STORE_RESPONSE_SIZE: u64 = 1_048_576;
/// Maximum captured body size the store will persist (1 MiB).
pub const MAX_CAPTURE_BODY_SIZE: usize = 1_048_576;
/// Maximum request JSON accepted by the store surface.
pub const MAX_STORE_INBOUND_SIZE: usize = 16 * 1_048_576;
/// Maximum number of requests in one capture batch.
pub const MAX_BATCH_LEN: usize = 100;
/// Timeout for receiver→store HTTP calls.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on the post-signal flush wait before the process exits.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
/// Requests deleted per endpoint per cleanup pass.
pub const CLEANUP_BATCH_SIZE: usize = 100;
/// Cadence of the store maintenance jobs.
pub const JOB_INTERVAL: Duration = Duration::from_secs(60);

/// Receiver service configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct ReceiverConfig {
	/// Store base URL for `/capture-batch`, `/quota`, and `/endpoint-info`.
	pub store_site_url: Url,
	/// Shared bearer secret presented on every store call.
	pub shared_secret: Option<String>,
	/// Listen port.
	pub port: u16,
}
impl ReceiverConfig {
	/// Read the receiver configuration from the environment.
	pub fn from_env() -> Result<Self> {
		Ok(Self {
			store_site_url: Url::parse(&required("STORE_SITE_URL")?)?,
			shared_secret: optional("CAPTURE_SHARED_SECRET"),
			port: parsed_or("PORT", 3001)?,
		})
	}
}

/// Store service configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct StoreConfig {
	/// Shared bearer secret; the store fails closed when unset.
	pub shared_secret: Option<String>,
	/// Listen port.
	pub port: u16,
	/// Free-tier request cap per billing period.
	pub free_request_limit: i64,
	/// Pro-tier request cap per billing period.
	pub pro_request_limit: i64,
	/// Lifetime applied on ephemeral endpoint creation.
	pub ephemeral_ttl_ms: i64,
	/// Billing period length applied on rollover.
	pub billing_period_ms: i64,
}
impl StoreConfig {
	/// Read the store configuration from the environment.
	pub fn from_env() -> Result<Self> {
		Ok(Self {
			shared_secret: optional("CAPTURE_SHARED_SECRET"),
			port: parsed_or("PORT", 3210)?,
			free_request_limit: parsed_or("FREE_REQUEST_LIMIT", 500)?,
			pro_request_limit: parsed_or("PRO_REQUEST_LIMIT", 500_000)?,
			ephemeral_ttl_ms: parsed_or("EPHEMERAL_TTL_MS", 600_000)?,
			billing_period_ms: parsed_or("BILLING_PERIOD_MS", 2_592_000_000)?,
		})
	}
}
impl Default for StoreConfig {
	fn default() -> Self {
		Self {
			shared_secret: None,
			port: 3210,
			free_request_limit: 500,
			pro_request_limit: 500_000,
			ephemeral_ttl_ms: 600_000,
			billing_period_ms: 2_592_000_000,
		}
	}
}

fn required(key: &'static str) -> Result<String> {
	env::var(key).map_err(|_| Error::Config { field: key, reason: "Must be set.".into() })
}

fn optional(key: &'static str) -> Option<String> {
	env::var(key).ok().filter(|value| !value.is_empty())
}

fn parsed_or<T>(key: &'static str, default: T) -> Result<T>
where
	T: FromStr,
	T::Err: Display,
{
	match env::var(key) {
		Ok(raw) => raw.trim().parse().map_err(|err| Error::Config {
			field: key,
			reason: format!("Invalid value: {err}."),
		}),
		Err(_) => Ok(default),
	}
}
