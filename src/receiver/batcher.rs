//! Per-slug request batching with size and time flush triggers.

// std
use std::collections::HashMap;
// crates.io
use tokio::{sync::Mutex, task::JoinHandle, time};
use tokio_util::task::TaskTracker;
// self
use crate::{_prelude::*, config, model::CapturedRequest, receiver::client::StoreClient};

#[derive(Debug, Default)]
struct PendingBatch {
	requests: Vec<CapturedRequest>,
	timer: Option<JoinHandle<()>>,
}

/// Buffers captured requests per slug and ships them in batches.
///
/// A buffer flushes when it reaches [`config::BATCH_MAX_SIZE`] or when
/// [`config::BATCH_FLUSH_INTERVAL`] elapses after the most recent enqueue;
/// the timer restarts on every enqueue so bursts coalesce. Dispatches run in
/// the background and are tracked so shutdown can wait for them; a failed
/// dispatch drops its batch, since replaying against the store would
/// double-insert.
#[derive(Clone, Debug)]
pub struct RequestBatcher {
	client: Arc<StoreClient>,
	pending: Arc<Mutex<HashMap<String, PendingBatch>>>,
	dispatches: TaskTracker,
}
impl RequestBatcher {
	/// Build a batcher shipping through the given store client.
	pub fn new(client: Arc<StoreClient>) -> Self {
		Self { client, pending: Default::default(), dispatches: TaskTracker::new() }
	}

	/// Queue one captured request; never blocks on store I/O.
	pub async fn add(&self, slug: &str, request: CapturedRequest) {
		let mut pending = self.pending.lock().await;
		let batch = pending.entry(slug.to_string()).or_default();

		batch.requests.push(request);

		if let Some(timer) = batch.timer.take() {
			timer.abort();
		}

		if batch.requests.len() >= config::BATCH_MAX_SIZE {
			let requests = std::mem::take(&mut batch.requests);

			self.dispatch(slug.to_string(), requests);
		} else {
			let batcher = self.clone();
			let slug = slug.to_string();

			batch.timer = Some(tokio::spawn(async move {
				time::sleep(config::BATCH_FLUSH_INTERVAL).await;
				batcher.flush_slug(&slug).await;
			}));
		}
	}

	/// Flush the pending buffer for one slug, if any.
	pub async fn flush_slug(&self, slug: &str) {
		let detached = {
			let mut pending = self.pending.lock().await;

			match pending.get_mut(slug) {
				Some(batch) if !batch.requests.is_empty() => {
					if let Some(timer) = batch.timer.take() {
						timer.abort();
					}

					Some(std::mem::take(&mut batch.requests))
				},
				_ => None,
			}
		};

		if let Some(requests) = detached {
			self.dispatch(slug.to_string(), requests);
		}
	}

	/// Enqueue every pending buffer for dispatch.
	pub async fn flush_all(&self) {
		let detached = {
			let mut pending = self.pending.lock().await;
			let mut detached = Vec::new();

			for (slug, batch) in pending.iter_mut() {
				if let Some(timer) = batch.timer.take() {
					timer.abort();
				}
				if !batch.requests.is_empty() {
					detached.push((slug.clone(), std::mem::take(&mut batch.requests)));
				}
			}

			detached
		};

		for (slug, requests) in detached {
			self.dispatch(slug, requests);
		}
	}

	/// Flush everything and wait for in-flight dispatches, bounded by `timeout`.
	pub async fn shutdown(&self, timeout: Duration) {
		self.flush_all().await;
		self.dispatches.close();

		if time::timeout(timeout, self.dispatches.wait()).await.is_err() {
			tracing::warn!("shutdown deadline lapsed with batch dispatches outstanding");
		}
	}

	fn dispatch(&self, slug: String, requests: Vec<CapturedRequest>) {
		let client = self.client.clone();

		self.dispatches.spawn(async move {
			let count = requests.len();

			match client.capture_batch(&slug, requests).await {
				Ok(reply) =>
					tracing::debug!(%slug, count, inserted = reply.inserted, "batch shipped"),
				Err(err) =>
					tracing::warn!(%slug, count, error = %err, "batch dropped after dispatch failure"),
			}
		});
	}
}
