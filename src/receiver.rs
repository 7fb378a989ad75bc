//! The edge receiver service: ingest fast path, caches, batcher, shutdown.

pub mod batcher;
pub mod client;
pub mod handler;

// std
use std::{future::Future, net::SocketAddr};
// crates.io
use axum::{
	Router,
	extract::DefaultBodyLimit,
	routing::{any, get},
};
use tower_http::cors::CorsLayer;
// self
use crate::{
	_prelude::*,
	cache::{endpoint::EndpointCache, quota::QuotaCache},
	config::{self, ReceiverConfig},
	receiver::{batcher::RequestBatcher, client::StoreClient},
};

/// The receiver's long-lived singletons, shared by every route.
#[derive(Clone, Debug)]
pub struct AppState {
	/// Endpoint configuration cache.
	pub endpoints: EndpointCache,
	/// Owner quota cache.
	pub quotas: QuotaCache,
	/// Per-slug request batcher.
	pub batcher: RequestBatcher,
}
impl AppState {
	/// Wire the receiver singletons from configuration.
	pub fn new(config: &ReceiverConfig) -> Result<Self> {
		let client = Arc::new(StoreClient::new(
			config.store_site_url.clone(),
			config.shared_secret.clone(),
		)?);

		Ok(Self {
			endpoints: EndpointCache::new(client.clone()),
			quotas: QuotaCache::new(client.clone()),
			batcher: RequestBatcher::new(client),
		})
	}
}

/// Build the receiver router.
pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(handler::health))
		.route("/w/{slug}", any(handler::ingest_root))
		.route("/w/{slug}/{*path}", any(handler::ingest))
		.layer(CorsLayer::permissive())
		.layer(DefaultBodyLimit::max(config::MAX_BODY_SIZE))
		.with_state(state)
}

/// Serve the receiver until `shutdown` resolves, then flush pending batches.
///
/// The listener closes first; captures accepted before that point are shipped
/// within the shutdown timeout or logged as abandoned.
pub async fn serve(
	config: ReceiverConfig,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
	let state = AppState::new(&config)?;
	let batcher = state.batcher.clone();
	let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
	let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;

	tracing::info!(port = config.port, "receiver listening");

	axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

	batcher.shutdown(config::SHUTDOWN_TIMEOUT).await;

	Ok(())
}
