//! Owner quota cache with local decrement and fail-open lookups.

// std
use std::collections::HashMap;
// crates.io
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	cache::slot::Slot,
	config,
	model::{Millis, UNLIMITED_QUOTA},
	receiver::client::StoreClient,
};

/// Cached remaining-budget entry for a slug.
///
/// The entry is advisory: the store never re-checks quota on write, so
/// over-admission is bounded by the cache TTL times the ingest rate.
#[derive(Clone, Debug)]
pub struct QuotaEntry {
	/// Owner whose budget backs this slug, when any.
	pub owner_id: Option<String>,
	/// Remaining requests, decremented locally between refreshes.
	pub remaining: i64,
	/// Period request limit.
	pub limit: i64,
	/// End of the current billing period.
	pub period_end: Option<Millis>,
	/// Whether the slug is exempt from quota enforcement.
	pub is_unlimited: bool,
}

/// Admission decision for one inbound request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaDecision {
	/// Budget remains, or quota is unenforced; the request proceeds.
	Allowed,
	/// The cached budget is spent; reject with 429.
	Exhausted,
}

/// Slug-keyed quota cache.
#[derive(Clone, Debug)]
pub struct QuotaCache {
	client: Arc<StoreClient>,
	slots: Arc<RwLock<HashMap<String, Arc<Slot<QuotaEntry>>>>>,
	ttl: Duration,
}
impl QuotaCache {
	/// Build a cache backed by the given store client.
	pub fn new(client: Arc<StoreClient>) -> Self {
		Self { client, slots: Default::default(), ttl: config::QUOTA_CACHE_TTL }
	}

	/// Check and consume one unit of budget for `slug`.
	///
	/// Lookup failures admit the request: quota enforcement must never block
	/// ingest. The check and the decrement happen under one writer lock, so a
	/// budget of one admits exactly one of two concurrent requests.
	pub async fn check_and_consume(&self, slug: &str) -> QuotaDecision {
		let slot = self.slot(slug).await;
		let client = self.client.clone();
		let slug_owned = slug.to_string();
		let refreshed = slot
			.get_or_refresh(self.ttl, move || async move {
				match client.quota(&slug_owned).await? {
					Some(info) => Ok(QuotaEntry {
						owner_id: info.owner_id,
						remaining: info.remaining,
						limit: info.limit,
						period_end: info.period_end,
						is_unlimited: info.remaining == UNLIMITED_QUOTA,
					}),
					// The store answers `not_found` for slugs it cannot meter.
					None => Ok(QuotaEntry {
						owner_id: None,
						remaining: UNLIMITED_QUOTA,
						limit: UNLIMITED_QUOTA,
						period_end: None,
						is_unlimited: true,
					}),
				}
			})
			.await;

		if let Err(err) = refreshed {
			tracing::warn!(slug, error = %err, "quota lookup failed, failing open");

			return QuotaDecision::Allowed;
		}

		slot.with_value_mut(|entry| {
			if entry.is_unlimited {
				QuotaDecision::Allowed
			} else if entry.remaining > 0 {
				entry.remaining -= 1;

				QuotaDecision::Allowed
			} else {
				QuotaDecision::Exhausted
			}
		})
		.await
		.unwrap_or(QuotaDecision::Allowed)
	}

	async fn slot(&self, slug: &str) -> Arc<Slot<QuotaEntry>> {
		if let Some(slot) = self.slots.read().await.get(slug) {
			return slot.clone();
		}

		self.slots
			.write()
			.await
			.entry(slug.to_string())
			.or_insert_with(|| Arc::new(Slot::new()))
			.clone()
	}
}
