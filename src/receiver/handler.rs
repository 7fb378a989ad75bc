//! Edge ingest: resolve the endpoint, admit against quota, buffer, respond.

// std
use std::{collections::HashMap, net::SocketAddr};
// crates.io
use axum::{
	Json,
	body::{Body, Bytes},
	extract::{ConnectInfo, Path, Query, State},
	http::{HeaderMap, Method, StatusCode},
	response::{IntoResponse, Response},
};
use http::{HeaderName, HeaderValue};
// self
use crate::{
	cache::{endpoint::EndpointLookup, quota::QuotaDecision},
	model::{CapturedRequest, MockResponse, is_valid_slug, now_ms},
	receiver::AppState,
};

/// Response headers never forwarded from mock responses.
const BLOCKED_RESPONSE_HEADERS: &[&str] =
	&["set-cookie", "strict-transport-security", "content-security-policy", "x-frame-options"];

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
	Json(serde_json::json!({ "status": "ok" }))
}

/// `ANY /w/{slug}` — ingest with an empty trailing path.
pub async fn ingest_root(
	state: State<AppState>,
	method: Method,
	Path(slug): Path<String>,
	peer: ConnectInfo<SocketAddr>,
	headers: HeaderMap,
	query: Query<HashMap<String, String>>,
	body: Bytes,
) -> Response {
	ingest(state, method, Path((slug, String::new())), peer, headers, query, body).await
}

/// `ANY /w/{slug}/{*path}` — the main capture route.
///
/// All store I/O stays off this path: both lookups are answered from cache
/// and the capture is buffered, so the sender only ever waits on memory.
pub async fn ingest(
	State(state): State<AppState>,
	method: Method,
	Path((slug, path)): Path<(String, String)>,
	ConnectInfo(peer): ConnectInfo<SocketAddr>,
	headers: HeaderMap,
	Query(query): Query<HashMap<String, String>>,
	body: Bytes,
) -> Response {
	// Anything outside the slug alphabet cannot exist; skip the store round trip.
	if !is_valid_slug(&slug) {
		return (StatusCode::NOT_FOUND, "Endpoint not found").into_response();
	}

	let now = now_ms();
	let endpoint = match state.endpoints.get(&slug).await {
		Ok(EndpointLookup::Found(info)) => info,
		Ok(EndpointLookup::NotFound) =>
			return (StatusCode::NOT_FOUND, "Endpoint not found").into_response(),
		Err(err) => {
			tracing::error!(%slug, error = %err, "endpoint lookup failed with no cached entry");

			return (StatusCode::INTERNAL_SERVER_ERROR, "Upstream unavailable").into_response();
		},
	};

	if endpoint.is_expired(now) {
		return (StatusCode::GONE, "Endpoint expired").into_response();
	}
	if state.quotas.check_and_consume(&slug).await == QuotaDecision::Exhausted {
		return (StatusCode::TOO_MANY_REQUESTS, "Quota exceeded").into_response();
	}

	let captured = CapturedRequest {
		method: method.as_str().to_string(),
		path: normalize_path(&path),
		headers: collect_headers(&headers),
		body: String::from_utf8_lossy(&body).into_owned(),
		query_params: query,
		ip: client_ip(&headers, peer),
		received_at: now,
	};

	state.batcher.add(&slug, captured).await;

	match endpoint.mock_response.as_ref() {
		Some(mock) => build_mock_response(mock),
		None => (StatusCode::OK, "OK").into_response(),
	}
}

fn normalize_path(path: &str) -> String {
	if path.is_empty() {
		"/".to_string()
	} else if path.starts_with('/') {
		path.to_string()
	} else {
		format!("/{path}")
	}
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
	// Verbatim capture; values that are not valid UTF-8 are skipped.
	headers
		.iter()
		.filter_map(|(name, value)| {
			value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
		})
		.collect()
}

fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
	if let Some(ip) = header_str(headers, "x-real-ip") {
		return ip.trim().to_string();
	}
	if let Some(forwarded) = header_str(headers, "x-forwarded-for")
		&& let Some(first) = forwarded.split(',').next()
	{
		return first.trim().to_string();
	}

	peer.ip().to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|value| value.to_str().ok())
}

fn build_mock_response(mock: &MockResponse) -> Response {
	let status = if (100..=599).contains(&mock.status) {
		StatusCode::from_u16(mock.status).unwrap_or(StatusCode::OK)
	} else {
		StatusCode::OK
	};
	let mut builder = http::Response::builder().status(status);

	for (name, value) in &mock.headers {
		// Header injection guard: CR/LF-bearing names or values never leave.
		if name.contains(['\r', '\n']) || value.contains(['\r', '\n']) {
			continue;
		}
		if BLOCKED_RESPONSE_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
			continue;
		}
		if let (Ok(name), Ok(value)) =
			(HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str()))
		{
			builder = builder.header(name, value);
		}
	}

	builder
		.body(Body::from(mock.body.clone()))
		.unwrap_or_else(|_| (StatusCode::OK, "OK").into_response())
}
