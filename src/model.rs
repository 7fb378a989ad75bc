//! Wire and data types shared by the receiver and the store.

// std
use std::collections::HashMap;
// crates.io
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Millisecond unix timestamp.
pub type Millis = i64;

/// Sentinel quota value denoting an unenforced budget.
pub const UNLIMITED_QUOTA: i64 = -1;
/// Maximum slug length.
pub const SLUG_MAX_LEN: usize = 50;

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> Millis {
	Utc::now().timestamp_millis()
}

/// Whether `slug` matches `^[A-Za-z0-9_-]{1,50}$`.
pub fn is_valid_slug(slug: &str) -> bool {
	!slug.is_empty()
		&& slug.len() <= SLUG_MAX_LEN
		&& slug.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Response pre-configured on an endpoint, emitted synchronously at the edge.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockResponse {
	/// Status to emit; values outside `100..=599` fall back to 200 at emission.
	pub status: u16,
	/// Body emitted verbatim.
	#[serde(default)]
	pub body: String,
	/// Response headers; filtered before emission.
	#[serde(default)]
	pub headers: HashMap<String, String>,
}

/// A captured webhook request as shipped to the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
	/// HTTP method observed at the edge.
	pub method: String,
	/// Request path below the slug, always `/`-prefixed.
	pub path: String,
	/// Request headers, verbatim.
	#[serde(default)]
	pub headers: HashMap<String, String>,
	/// Request body as text.
	#[serde(default)]
	pub body: String,
	/// Query parameters, verbatim.
	#[serde(default)]
	pub query_params: HashMap<String, String>,
	/// Sender address derived from proxy headers or the socket peer.
	#[serde(default)]
	pub ip: String,
	/// Arrival time assigned by the receiver.
	pub received_at: Millis,
}

/// Endpoint configuration as returned by `/endpoint-info`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointInfo {
	/// Opaque endpoint identifier.
	pub endpoint_id: String,
	/// Owning user, when any.
	#[serde(default)]
	pub owner_id: Option<String>,
	/// Whether the endpoint is anonymous and bounded-lifetime.
	pub is_ephemeral: bool,
	/// Expiry instant; `None` means the endpoint does not expire.
	#[serde(default)]
	pub expires_at: Option<Millis>,
	/// Configured mock response, when any.
	#[serde(default)]
	pub mock_response: Option<MockResponse>,
}
impl EndpointInfo {
	/// Whether the endpoint is past its expiry at `now` (the expiry instant itself counts).
	pub fn is_expired(&self, now: Millis) -> bool {
		self.expires_at.map(|at| now >= at).unwrap_or(false)
	}
}

/// Remaining-budget projection as returned by `/quota`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaInfo {
	/// Owner whose budget backs the slug; `None` for ephemeral or owner-less endpoints.
	pub owner_id: Option<String>,
	/// Remaining requests in the period; may be ≤ 0, `-1` means unenforced.
	pub remaining: i64,
	/// Period request limit; `-1` means unenforced.
	pub limit: i64,
	/// End of the current billing period.
	#[serde(default)]
	pub period_end: Option<Millis>,
}

/// Body of a `/capture-batch` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureBatch {
	/// Target endpoint slug.
	pub slug: String,
	/// Captured requests in arrival order.
	pub requests: Vec<CapturedRequest>,
}

/// Body of a single `/capture` call; `receivedAt` is assigned server-side.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSingle {
	/// Target endpoint slug.
	pub slug: String,
	/// HTTP method observed by the caller.
	pub method: String,
	/// Request path, `/`-prefixed.
	pub path: String,
	/// Request headers.
	#[serde(default)]
	pub headers: HashMap<String, String>,
	/// Request body as text.
	#[serde(default)]
	pub body: String,
	/// Query parameters.
	#[serde(default)]
	pub query_params: HashMap<String, String>,
	/// Sender address.
	#[serde(default)]
	pub ip: String,
}

/// Reply body of `/capture-batch`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureBatchReply {
	/// Present and `true` when rows were inserted.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub success: Option<bool>,
	/// Error kind when the batch was not persisted.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Number of rows inserted.
	#[serde(default)]
	pub inserted: u64,
}

/// Reply body of the single `/capture` action.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReply {
	/// Present and `true` when the row was inserted.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub success: Option<bool>,
	/// Error kind when the capture was rejected.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// The endpoint's configured mock response, for non-batching callers.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mock_response: Option<MockResponse>,
}

/// Error reply shape shared by the store actions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorReply {
	/// Machine-readable error kind.
	pub error: String,
}

/// Store reply envelope distinguishing the success and error shapes.
///
/// The error shape is tried first so that `{"error": …}` never half-matches a
/// success payload whose fields are all optional.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum StoreReply<T> {
	/// `{error: kind}`.
	Err(ErrorReply),
	/// The action-specific success shape.
	Ok(T),
}
