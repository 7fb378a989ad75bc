//! Single-flight TTL slot shared by the receiver caches.

// std
use std::future::Future;
// crates.io
use tokio::sync::{Mutex, RwLock};
// self
use crate::_prelude::*;

#[derive(Clone, Debug)]
struct Cached<T> {
	value: T,
	fetched_at: Instant,
}

/// Per-key cache slot enforcing the single-flight refresh discipline.
///
/// At most one refresh is in flight per slot; concurrent readers queue on the
/// guard and pick up the winner's result on re-check. A failed refresh falls
/// back to the previous value when one exists, however stale.
#[derive(Debug, Default)]
pub struct Slot<T> {
	value: RwLock<Option<Cached<T>>>,
	single_flight: Mutex<()>,
}
impl<T> Slot<T>
where
	T: Clone,
{
	/// Create an empty slot.
	pub fn new() -> Self {
		Self { value: RwLock::new(None), single_flight: Mutex::new(()) }
	}

	/// Return a value no older than `ttl`, refreshing through `fetch` at most
	/// once across concurrent callers.
	pub async fn get_or_refresh<F, Fut>(&self, ttl: Duration, fetch: F) -> Result<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		if let Some(value) = self.fresh(ttl).await {
			return Ok(value);
		}

		let _guard = self.single_flight.lock().await;

		// Whoever held the guard first may already have refreshed.
		if let Some(value) = self.fresh(ttl).await {
			return Ok(value);
		}

		match fetch().await {
			Ok(value) => {
				*self.value.write().await =
					Some(Cached { value: value.clone(), fetched_at: Instant::now() });

				Ok(value)
			},
			Err(err) => {
				let mut guard = self.value.write().await;

				if let Some(cached) = guard.as_mut() {
					// Re-stamp on failure: the upstream gets one retry per
					// TTL, not one per caller queued on the guard.
					cached.fetched_at = Instant::now();

					tracing::warn!(error = %err, "refresh failed, serving stale entry");

					Ok(cached.value.clone())
				} else {
					Err(err)
				}
			},
		}
	}

	/// Mutate the cached value in place under the writer lock.
	pub async fn with_value_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
		self.value.write().await.as_mut().map(|cached| f(&mut cached.value))
	}

	async fn fresh(&self, ttl: Duration) -> Option<T> {
		self.value
			.read()
			.await
			.as_ref()
			.filter(|cached| cached.fetched_at.elapsed() < ttl)
			.map(|cached| cached.value.clone())
	}
}
