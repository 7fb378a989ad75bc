//! Store service entrypoint.

// crates.io
use tracing_subscriber::EnvFilter;
// self
use webhook_capture::{Result, config::StoreConfig, store};

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

	store::serve(StoreConfig::from_env()?, shutdown_signal()).await
}

async fn shutdown_signal() {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{SignalKind, signal};

		let mut terminate = match signal(SignalKind::terminate()) {
			Ok(terminate) => terminate,
			Err(err) => {
				tracing::warn!(error = %err, "sigterm handler unavailable");

				let _ = tokio::signal::ctrl_c().await;

				return;
			},
		};

		tokio::select! {
			_ = tokio::signal::ctrl_c() => {},
			_ = terminate.recv() => {},
		}
	}
	#[cfg(not(unix))]
	{
		let _ = tokio::signal::ctrl_c().await;
	}

	tracing::info!("shutdown signal received");
}
