//! Capture-pipeline validation and persistence.

// std
use std::collections::HashMap;
// self
use crate::{
	config,
	model::{CapturedRequest, MockResponse, now_ms},
	store::{
		db::{Db, RequestDraft},
		usage::UsageScheduler,
	},
};

/// Methods accepted for captured requests.
const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];
const MAX_PATH_LEN: usize = 2048;
const MAX_IP_LEN: usize = 45;
const MAX_HEADER_COUNT: usize = 100;
const MAX_QUERY_PARAM_COUNT: usize = 100;

/// Validation failure kinds, surfaced as `{error: kind}` replies.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureErrorKind {
	InvalidMethod,
	InvalidPath,
	InvalidIp,
	InvalidHeaders,
	InvalidQueryParams,
	BodyTooLarge,
}
impl CaptureErrorKind {
	/// Wire representation of the kind.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::InvalidMethod => "invalid_method",
			Self::InvalidPath => "invalid_path",
			Self::InvalidIp => "invalid_ip",
			Self::InvalidHeaders => "invalid_headers",
			Self::InvalidQueryParams => "invalid_query_params",
			Self::BodyTooLarge => "body_too_large",
		}
	}
}

/// Outcome of a capture persistence attempt.
#[derive(Clone, Debug)]
pub enum CaptureOutcome {
	/// Rows were inserted.
	Inserted {
		/// Number of rows persisted.
		count: usize,
		/// The endpoint's configured mock response, for non-batching callers.
		mock_response: Option<MockResponse>,
	},
	/// The slug is unknown.
	NotFound,
	/// The endpoint is past its expiry.
	Expired,
}

/// Validate one captured request against the store's limits.
pub fn validate_request(request: &CapturedRequest) -> Result<(), CaptureErrorKind> {
	if !ALLOWED_METHODS.contains(&request.method.as_str()) {
		return Err(CaptureErrorKind::InvalidMethod);
	}
	if request.path.is_empty() || request.path.len() > MAX_PATH_LEN {
		return Err(CaptureErrorKind::InvalidPath);
	}
	if request.ip.len() > MAX_IP_LEN {
		return Err(CaptureErrorKind::InvalidIp);
	}
	if request.headers.len() > MAX_HEADER_COUNT {
		return Err(CaptureErrorKind::InvalidHeaders);
	}
	if request.query_params.len() > MAX_QUERY_PARAM_COUNT {
		return Err(CaptureErrorKind::InvalidQueryParams);
	}
	if request.body.len() > config::MAX_CAPTURE_BODY_SIZE {
		return Err(CaptureErrorKind::BodyTooLarge);
	}

	Ok(())
}

/// Derive the content type from captured headers, case-insensitively.
pub fn content_type(headers: &HashMap<String, String>) -> Option<String> {
	headers
		.iter()
		.find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
		.map(|(_, value)| value.clone())
}

/// Persist a batch for `slug` and schedule the owner's usage increment.
///
/// The increment runs after the insert, on the owner's serial queue, so the
/// counter write never contends with captures landing on the owner's other
/// endpoints.
pub async fn capture_batch(
	db: &Db,
	usage: &UsageScheduler,
	slug: &str,
	requests: Vec<CapturedRequest>,
) -> CaptureOutcome {
	let now = now_ms();
	let Some(endpoint) = db.endpoint_by_slug(slug).await else {
		return CaptureOutcome::NotFound;
	};

	if let Some(at) = endpoint.expires_at
		&& now >= at
	{
		return CaptureOutcome::Expired;
	}

	let drafts = requests
		.into_iter()
		.map(|request| RequestDraft {
			content_type: content_type(&request.headers),
			size: request.body.len() as u64,
			method: request.method,
			path: request.path,
			headers: request.headers,
			body: request.body,
			query_params: request.query_params,
			ip: request.ip,
			received_at: request.received_at,
		})
		.collect::<Vec<_>>();
	let inserted = db.insert_requests(&endpoint.id, drafts).await;

	if let Some(owner_id) = endpoint.owner_id.as_deref()
		&& inserted > 0
	{
		usage.schedule(owner_id, inserted as i64).await;
	}

	CaptureOutcome::Inserted { count: inserted, mock_response: endpoint.mock_response }
}
