//! The store service: capture pipeline, quota projection, maintenance jobs.

pub mod api;
pub mod capture;
pub mod db;
pub mod jobs;
pub mod usage;

// std
use std::future::Future;
// crates.io
use axum::{
	Router,
	extract::DefaultBodyLimit,
	routing::{get, post},
};
// self
use crate::{
	_prelude::*,
	config::{self, StoreConfig},
	store::{api::StoreState, db::Db, usage::UsageScheduler},
};

/// Build the store router.
pub fn router(state: StoreState) -> Router {
	Router::new()
		.route("/capture", post(api::capture))
		.route("/capture-batch", post(api::capture_batch))
		.route("/quota", get(api::quota))
		.route("/endpoint-info", get(api::endpoint_info))
		.layer(DefaultBodyLimit::max(config::MAX_STORE_INBOUND_SIZE))
		.with_state(state)
}

/// Serve the store until `shutdown` resolves, with the maintenance jobs
/// running alongside.
pub async fn serve(
	config: StoreConfig,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
	let db = Db::new(config.clone());
	let usage = UsageScheduler::new(db.clone());
	let state =
		StoreState { db: db.clone(), usage, shared_secret: config.shared_secret.clone() };
	let maintenance = tokio::spawn(jobs::run(db));
	let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;

	tracing::info!(port = config.port, "store listening");

	axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await?;

	maintenance.abort();

	Ok(())
}
