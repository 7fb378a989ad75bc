//! The store's authenticated HTTP surface.

// std
use std::sync::Arc;
// crates.io
use axum::{
	Json,
	body::Bytes,
	extract::{Query, State},
	http::{HeaderMap, StatusCode, header::AUTHORIZATION},
	response::{IntoResponse, Response},
};
use serde::Deserialize;
use subtle::ConstantTimeEq;
// self
use crate::{
	config,
	model::{
		CaptureBatch, CaptureBatchReply, CaptureReply, CaptureSingle, CapturedRequest,
		is_valid_slug, now_ms,
	},
	store::{
		capture::{self, CaptureErrorKind, CaptureOutcome},
		db::Db,
		usage::UsageScheduler,
	},
};

/// Shared store state.
#[derive(Clone, Debug)]
pub struct StoreState {
	/// System of record.
	pub db: Arc<Db>,
	/// Deferred usage accounting.
	pub usage: Arc<UsageScheduler>,
	/// Shared bearer secret; requests fail closed when unset.
	pub shared_secret: Option<String>,
}

/// Query shape shared by `/quota` and `/endpoint-info`.
#[derive(Debug, Deserialize)]
pub struct SlugQuery {
	/// Target endpoint slug.
	pub slug: String,
}

/// `POST /capture-batch`.
pub async fn capture_batch(
	State(state): State<StoreState>,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	if let Err(denied) = authorize(&state, &headers) {
		return denied;
	}

	let batch = match serde_json::from_slice::<CaptureBatch>(&body) {
		Ok(batch) => batch,
		Err(err) => {
			tracing::debug!(error = %err, "rejecting malformed capture batch");

			return error_reply(StatusCode::BAD_REQUEST, "invalid_json");
		},
	};

	if !is_valid_slug(&batch.slug) {
		return error_reply(StatusCode::BAD_REQUEST, "invalid_slug");
	}
	if batch.requests.len() > config::MAX_BATCH_LEN {
		return error_reply(StatusCode::BAD_REQUEST, "batch_too_large");
	}
	if let Some(kind) = batch.requests.iter().find_map(|request| {
		capture::validate_request(request).err()
	}) {
		// Validation failures void the whole batch; the receiver already
		// answered its sender, so there is nothing to renegotiate.
		tracing::warn!(
			slug = %batch.slug,
			kind = kind.as_str(),
			count = batch.requests.len(),
			"capture batch failed validation"
		);

		return error_reply(StatusCode::BAD_REQUEST, "invalid_requests");
	}

	match capture::capture_batch(&state.db, &state.usage, &batch.slug, batch.requests).await {
		CaptureOutcome::Inserted { count, .. } => Json(CaptureBatchReply {
			success: Some(true),
			error: None,
			inserted: count as u64,
		})
		.into_response(),
		CaptureOutcome::NotFound => batch_error("not_found"),
		CaptureOutcome::Expired => batch_error("expired"),
	}
}

/// `POST /capture` — the single, non-batched path.
pub async fn capture(
	State(state): State<StoreState>,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	if let Err(denied) = authorize(&state, &headers) {
		return denied;
	}

	let single = match serde_json::from_slice::<CaptureSingle>(&body) {
		Ok(single) => single,
		Err(err) => {
			tracing::debug!(error = %err, "rejecting malformed capture");

			return error_reply(StatusCode::BAD_REQUEST, "invalid_json");
		},
	};

	if !is_valid_slug(&single.slug) {
		return error_reply(StatusCode::BAD_REQUEST, "invalid_slug");
	}

	let request = CapturedRequest {
		method: single.method,
		path: single.path,
		headers: single.headers,
		body: single.body,
		query_params: single.query_params,
		ip: single.ip,
		received_at: now_ms(),
	};

	if let Err(kind) = capture::validate_request(&request) {
		let status = match kind {
			CaptureErrorKind::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
			_ => StatusCode::BAD_REQUEST,
		};

		return error_reply(status, kind.as_str());
	}

	match capture::capture_batch(&state.db, &state.usage, &single.slug, vec![request]).await {
		CaptureOutcome::Inserted { mock_response, .. } => Json(CaptureReply {
			success: Some(true),
			error: None,
			mock_response,
		})
		.into_response(),
		CaptureOutcome::NotFound => error_reply(StatusCode::OK, "not_found"),
		CaptureOutcome::Expired => error_reply(StatusCode::OK, "expired"),
	}
}

/// `GET /quota?slug=`.
pub async fn quota(
	State(state): State<StoreState>,
	headers: HeaderMap,
	Query(query): Query<SlugQuery>,
) -> Response {
	if let Err(denied) = authorize(&state, &headers) {
		return denied;
	}
	if !is_valid_slug(&query.slug) {
		return error_reply(StatusCode::BAD_REQUEST, "invalid_slug");
	}

	match state.db.quota_for_slug(&query.slug).await {
		Some(info) => Json(info).into_response(),
		None => error_reply(StatusCode::OK, "not_found"),
	}
}

/// `GET /endpoint-info?slug=`.
pub async fn endpoint_info(
	State(state): State<StoreState>,
	headers: HeaderMap,
	Query(query): Query<SlugQuery>,
) -> Response {
	if let Err(denied) = authorize(&state, &headers) {
		return denied;
	}
	if !is_valid_slug(&query.slug) {
		return error_reply(StatusCode::BAD_REQUEST, "invalid_slug");
	}

	match state.db.endpoint_info_for_slug(&query.slug).await {
		Some(info) => Json(info).into_response(),
		None => error_reply(StatusCode::OK, "not_found"),
	}
}

/// Bearer-secret check: fail closed when the secret is unset, constant-time
/// comparison when it is.
fn authorize(state: &StoreState, headers: &HeaderMap) -> Result<(), Response> {
	let Some(secret) = state.shared_secret.as_deref() else {
		return Err(error_reply(StatusCode::INTERNAL_SERVER_ERROR, "server_misconfiguration"));
	};
	let presented = headers
		.get(AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.strip_prefix("Bearer "));

	match presented {
		Some(token) if bool::from(token.as_bytes().ct_eq(secret.as_bytes())) => Ok(()),
		_ => Err(error_reply(StatusCode::UNAUTHORIZED, "unauthorized")),
	}
}

fn error_reply(status: StatusCode, kind: &str) -> Response {
	(status, Json(serde_json::json!({ "error": kind }))).into_response()
}

fn batch_error(kind: &str) -> Response {
	Json(CaptureBatchReply { success: None, error: Some(kind.to_string()), inserted: 0 })
		.into_response()
}
