//! Endpoint configuration cache with single-flight refresh.

// std
use std::collections::HashMap;
// crates.io
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	cache::slot::Slot,
	config,
	model::EndpointInfo,
	receiver::client::StoreClient,
};

/// Outcome of an endpoint lookup; negative results are cached too, so an
/// unknown-slug flood costs one upstream call per TTL window.
#[derive(Clone, Debug)]
pub enum EndpointLookup {
	/// The endpoint exists with this configuration.
	Found(Arc<EndpointInfo>),
	/// The store does not know the slug.
	NotFound,
}

/// Slug-keyed endpoint configuration cache.
#[derive(Clone, Debug)]
pub struct EndpointCache {
	client: Arc<StoreClient>,
	slots: Arc<RwLock<HashMap<String, Arc<Slot<EndpointLookup>>>>>,
	ttl: Duration,
}
impl EndpointCache {
	/// Build a cache backed by the given store client.
	pub fn new(client: Arc<StoreClient>) -> Self {
		Self { client, slots: Default::default(), ttl: config::ENDPOINT_CACHE_TTL }
	}

	/// Resolve the endpoint configuration for `slug`.
	///
	/// Errors surface only when the store is unreachable and no previous
	/// entry exists; otherwise a stale entry is served.
	pub async fn get(&self, slug: &str) -> Result<EndpointLookup> {
		let slot = self.slot(slug).await;
		let client = self.client.clone();
		let slug = slug.to_string();

		slot.get_or_refresh(self.ttl, move || async move {
			match client.endpoint_info(&slug).await? {
				Some(info) => Ok(EndpointLookup::Found(Arc::new(info))),
				None => Ok(EndpointLookup::NotFound),
			}
		})
		.await
	}

	async fn slot(&self, slug: &str) -> Arc<Slot<EndpointLookup>> {
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
