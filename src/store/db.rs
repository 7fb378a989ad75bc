//! In-process storage engine: tables, indexes, and primitive mutations.

// std
use std::{
	collections::{BTreeMap, HashMap},
	fmt::Write,
};
// crates.io
use rand::Rng;
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	config::StoreConfig,
	model::{EndpointInfo, Millis, MockResponse, QuotaInfo, UNLIMITED_QUOTA, is_valid_slug, now_ms},
};

/// Billing plan for an owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Plan {
	/// Free tier.
	Free,
	/// Paid tier.
	Pro,
}

/// A capture endpoint record.
#[derive(Clone, Debug)]
pub struct Endpoint {
	/// Opaque identifier.
	pub id: String,
	/// Globally unique URL-safe identifier.
	pub slug: String,
	/// Owning user; `None` only for ephemeral endpoints.
	pub owner_id: Option<String>,
	/// Display name.
	pub name: Option<String>,
	/// Response emitted synchronously at the edge.
	pub mock_response: Option<MockResponse>,
	/// Whether the endpoint is anonymous and bounded-lifetime.
	pub is_ephemeral: bool,
	/// Expiry instant for ephemeral endpoints.
	pub expires_at: Option<Millis>,
	/// Denormalized row counter; advisory.
	pub request_count: u64,
}

/// A persisted captured-request row.
#[derive(Clone, Debug)]
pub struct RequestRecord {
	/// Opaque identifier.
	pub id: String,
	/// Owning endpoint.
	pub endpoint_id: String,
	/// HTTP method.
	pub method: String,
	/// Request path.
	pub path: String,
	/// Request headers.
	pub headers: HashMap<String, String>,
	/// Request body as text.
	pub body: String,
	/// Query parameters.
	pub query_params: HashMap<String, String>,
	/// Content type derived from the headers.
	pub content_type: Option<String>,
	/// Sender address.
	pub ip: String,
	/// Body size in bytes.
	pub size: u64,
	/// Arrival time at the edge.
	pub received_at: Millis,
}

/// Row fields computed by the capture pipeline; the engine assigns identity.
#[derive(Clone, Debug)]
pub struct RequestDraft {
	/// HTTP method.
	pub method: String,
	/// Request path.
	pub path: String,
	/// Request headers.
	pub headers: HashMap<String, String>,
	/// Request body as text.
	pub body: String,
	/// Query parameters.
	pub query_params: HashMap<String, String>,
	/// Content type derived from the headers.
	pub content_type: Option<String>,
	/// Sender address.
	pub ip: String,
	/// Body size in bytes.
	pub size: u64,
	/// Arrival time at the edge.
	pub received_at: Millis,
}

/// An owner (user) record.
#[derive(Clone, Debug)]
pub struct Owner {
	/// Opaque identifier.
	pub id: String,
	/// Sign-in address.
	pub email: String,
	/// Billing plan.
	pub plan: Plan,
	/// Request cap for the current period.
	pub request_limit: i64,
	/// Requests consumed in the current period.
	pub requests_used: i64,
	/// Start of the current billing period.
	pub period_start: Option<Millis>,
	/// End of the current billing period.
	pub period_end: Option<Millis>,
	/// Whether the subscription lapses instead of renewing.
	pub cancel_at_period_end: bool,
	/// Upstream billing status.
	pub subscription_status: Option<String>,
}

type RequestRows = BTreeMap<(Millis, u64), RequestRecord>;

#[derive(Debug, Default)]
struct Tables {
	endpoints: HashMap<String, Endpoint>,
	endpoints_by_slug: HashMap<String, String>,
	endpoints_by_expiry: BTreeMap<(Millis, String), ()>,
	requests: HashMap<String, RequestRows>,
	owners: HashMap<String, Owner>,
	seq: u64,
}

/// The store's system of record.
///
/// One writer lock serializes mutations; batch inserts for a slug land
/// atomically and in order. The owner counter is never written from a
/// capture mutation — it is advanced by the usage scheduler so concurrent
/// bursts across an owner's endpoints do not contend.
#[derive(Debug)]
pub struct Db {
	config: StoreConfig,
	tables: RwLock<Tables>,
}
impl Db {
	/// Build an empty store.
	pub fn new(config: StoreConfig) -> Arc<Self> {
		Arc::new(Self { config, tables: RwLock::new(Tables::default()) })
	}

	/// Service configuration this store was built with.
	pub fn config(&self) -> &StoreConfig {
		&self.config
	}

	/// Create an owner record; used on first sign-in.
	pub async fn create_owner(&self, email: &str, plan: Plan) -> Owner {
		let limit = match plan {
			Plan::Free => self.config.free_request_limit,
			Plan::Pro => self.config.pro_request_limit,
		};
		let now = now_ms();
		let (period_start, period_end) = match plan {
			Plan::Free => (None, None),
			Plan::Pro => (Some(now), Some(now + self.config.billing_period_ms)),
		};
		let owner = Owner {
			id: generate_id("usr"),
			email: email.to_string(),
			plan,
			request_limit: limit,
			requests_used: 0,
			period_start,
			period_end,
			cancel_at_period_end: false,
			subscription_status: (plan == Plan::Pro).then(|| "active".to_string()),
		};

		self.tables.write().await.owners.insert(owner.id.clone(), owner.clone());

		owner
	}

	/// Create an owned endpoint.
	pub async fn create_endpoint(&self, slug: &str, owner_id: &str) -> Result<Endpoint> {
		self.insert_endpoint(slug, Some(owner_id.to_string()), false, None).await
	}

	/// Create an anonymous endpoint that expires after the configured TTL.
	pub async fn create_ephemeral_endpoint(&self, slug: &str) -> Result<Endpoint> {
		let expires_at = now_ms() + self.config.ephemeral_ttl_ms;

		self.insert_endpoint(slug, None, true, Some(expires_at)).await
	}

	async fn insert_endpoint(
		&self,
		slug: &str,
		owner_id: Option<String>,
		is_ephemeral: bool,
		expires_at: Option<Millis>,
	) -> Result<Endpoint> {
		if !is_valid_slug(slug) {
			return Err(Error::Validation {
				field: "slug",
				reason: "Must match ^[A-Za-z0-9_-]{1,50}$.".into(),
			});
		}

		let mut tables = self.tables.write().await;

		if tables.endpoints_by_slug.contains_key(slug) {
			return Err(Error::Validation { field: "slug", reason: "Already taken.".into() });
		}

		let endpoint = Endpoint {
			id: generate_id("ep"),
			slug: slug.to_string(),
			owner_id,
			name: None,
			mock_response: None,
			is_ephemeral,
			expires_at,
			request_count: 0,
		};

		tables.endpoints_by_slug.insert(endpoint.slug.clone(), endpoint.id.clone());

		if let Some(at) = endpoint.expires_at {
			tables.endpoints_by_expiry.insert((at, endpoint.id.clone()), ());
		}

		tables.endpoints.insert(endpoint.id.clone(), endpoint.clone());

		Ok(endpoint)
	}

	/// Update owner-editable endpoint fields.
	pub async fn configure_endpoint(
		&self,
		slug: &str,
		name: Option<String>,
		mock_response: Option<MockResponse>,
	) -> Result<()> {
		if let Some(mock) = &mock_response
			&& !(100..=599).contains(&mock.status)
		{
			return Err(Error::Validation {
				field: "mock_response.status",
				reason: "Must be within 100..=599.".into(),
			});
		}

		let mut tables = self.tables.write().await;
		let Some(id) = tables.endpoints_by_slug.get(slug).cloned() else {
			return Err(Error::Validation { field: "slug", reason: "Unknown endpoint.".into() });
		};

		if let Some(endpoint) = tables.endpoints.get_mut(&id) {
			if name.is_some() {
				endpoint.name = name;
			}

			endpoint.mock_response = mock_response;
		}

		Ok(())
	}

	/// Look up an endpoint by slug.
	pub async fn endpoint_by_slug(&self, slug: &str) -> Option<Endpoint> {
		let tables = self.tables.read().await;
		let id = tables.endpoints_by_slug.get(slug)?;

		tables.endpoints.get(id).cloned()
	}

	/// The `/endpoint-info` projection for a slug.
	pub async fn endpoint_info_for_slug(&self, slug: &str) -> Option<EndpointInfo> {
		self.endpoint_by_slug(slug).await.map(|endpoint| EndpointInfo {
			endpoint_id: endpoint.id,
			owner_id: endpoint.owner_id,
			is_ephemeral: endpoint.is_ephemeral,
			expires_at: endpoint.expires_at,
			mock_response: endpoint.mock_response,
		})
	}

	/// The `/quota` projection for a slug.
	///
	/// Ephemeral and owner-less endpoints — and endpoints whose owner record
	/// is missing — report an unenforced budget.
	pub async fn quota_for_slug(&self, slug: &str) -> Option<QuotaInfo> {
		let tables = self.tables.read().await;
		let id = tables.endpoints_by_slug.get(slug)?;
		let endpoint = tables.endpoints.get(id)?;
		let Some(owner) = endpoint.owner_id.as_ref().and_then(|owner| tables.owners.get(owner))
		else {
			return Some(QuotaInfo {
				owner_id: None,
				remaining: UNLIMITED_QUOTA,
				limit: UNLIMITED_QUOTA,
				period_end: None,
			});
		};

		Some(QuotaInfo {
			owner_id: Some(owner.id.clone()),
			remaining: owner.request_limit - owner.requests_used,
			limit: owner.request_limit,
			period_end: owner.period_end,
		})
	}

	/// Insert prepared rows for an endpoint, preserving input order.
	pub async fn insert_requests(&self, endpoint_id: &str, drafts: Vec<RequestDraft>) -> usize {
		let mut tables = self.tables.write().await;

		if !tables.endpoints.contains_key(endpoint_id) {
			return 0;
		}

		let inserted = drafts.len();

		for draft in drafts {
			tables.seq += 1;

			let seq = tables.seq;
			let record = RequestRecord {
				id: generate_id("req"),
				endpoint_id: endpoint_id.to_string(),
				method: draft.method,
				path: draft.path,
				headers: draft.headers,
				body: draft.body,
				query_params: draft.query_params,
				content_type: draft.content_type,
				ip: draft.ip,
				size: draft.size,
				received_at: draft.received_at,
			};

			tables
				.requests
				.entry(endpoint_id.to_string())
				.or_default()
				.insert((record.received_at, seq), record);
		}

		if let Some(endpoint) = tables.endpoints.get_mut(endpoint_id) {
			endpoint.request_count += inserted as u64;
		}

		inserted
	}

	/// Newest-first page of rows for an endpoint.
	pub async fn recent_requests(&self, endpoint_id: &str, limit: usize) -> Vec<RequestRecord> {
		let tables = self.tables.read().await;

		tables
			.requests
			.get(endpoint_id)
			.map(|rows| rows.values().rev().take(limit).cloned().collect())
			.unwrap_or_default()
	}

	/// Atomic read-modify-write of `requests_used`.
	///
	/// A free owner whose period lapsed is rolled forward first, so lapsed
	/// free accounts re-activate on their next capture instead of through
	/// the period-reset job.
	pub async fn increment_usage(&self, owner_id: &str, count: i64) {
		let now = now_ms();
		let mut tables = self.tables.write().await;

		if let Some(owner) = tables.owners.get_mut(owner_id) {
			if owner.plan == Plan::Free
				&& let Some(end) = owner.period_end
				&& end < now
			{
				owner.period_start = Some(now);
				owner.period_end = Some(now + self.config.billing_period_ms);
				owner.requests_used = 0;
			}

			owner.requests_used += count;
		}
	}

	/// Look up an owner record.
	pub async fn owner(&self, owner_id: &str) -> Option<Owner> {
		self.tables.read().await.owners.get(owner_id).cloned()
	}

	/// Apply `mutate` to an owner record; returns whether it existed.
	pub async fn update_owner(&self, owner_id: &str, mutate: impl FnOnce(&mut Owner)) -> bool {
		let mut tables = self.tables.write().await;

		match tables.owners.get_mut(owner_id) {
			Some(owner) => {
				mutate(owner);

				true
			},
			None => false,
		}
	}

	/// Owners whose billing period ended before `now`, oldest first.
	pub async fn owners_past_period_end(&self, now: Millis, limit: usize) -> Vec<Owner> {
		let tables = self.tables.read().await;
		let mut lapsed = tables
			.owners
			.values()
			.filter(|owner| owner.period_end.map(|end| end < now).unwrap_or(false))
			.cloned()
			.collect::<Vec<_>>();

		lapsed.sort_by_key(|owner| owner.period_end);
		lapsed.truncate(limit);

		lapsed
	}

	/// Endpoints past their expiry at `now`, soonest-expired first.
	pub async fn expired_endpoints(&self, now: Millis, limit: usize) -> Vec<String> {
		let tables = self.tables.read().await;

		tables
			.endpoints_by_expiry
			.keys()
			.take_while(|(at, _)| *at <= now)
			.take(limit)
			.map(|(_, id)| id.clone())
			.collect()
	}

	/// Re-point an endpoint's expiry, keeping the expiry index coherent.
	pub async fn set_endpoint_expiry(&self, endpoint_id: &str, expires_at: Option<Millis>) {
		let mut tables = self.tables.write().await;
		let Some(endpoint) = tables.endpoints.get_mut(endpoint_id) else {
			return;
		};
		let previous = endpoint.expires_at;

		endpoint.expires_at = expires_at;

		if let Some(at) = previous {
			tables.endpoints_by_expiry.remove(&(at, endpoint_id.to_string()));
		}
		if let Some(at) = expires_at {
			tables.endpoints_by_expiry.insert((at, endpoint_id.to_string()), ());
		}
	}

	/// Delete up to `limit` rows of an endpoint; returns the count removed.
	pub async fn delete_requests(&self, endpoint_id: &str, limit: usize) -> usize {
		let mut tables = self.tables.write().await;
		let Some(rows) = tables.requests.get_mut(endpoint_id) else {
			return 0;
		};
		let keys = rows.keys().take(limit).cloned().collect::<Vec<_>>();

		for key in &keys {
			rows.remove(key);
		}

		if rows.is_empty() {
			tables.requests.remove(endpoint_id);
		}

		keys.len()
	}

	/// Delete an endpoint and its index entries.
	pub async fn delete_endpoint(&self, endpoint_id: &str) {
		let mut tables = self.tables.write().await;

		if let Some(endpoint) = tables.endpoints.remove(endpoint_id) {
			tables.endpoints_by_slug.remove(&endpoint.slug);

			if let Some(at) = endpoint.expires_at {
				tables.endpoints_by_expiry.remove(&(at, endpoint.id));
			}
		}

		tables.requests.remove(endpoint_id);
	}
}

fn generate_id(prefix: &str) -> String {
	let bytes: [u8; 12] = rand::rng().random();
	let mut id = String::with_capacity(prefix.len() + 1 + bytes.len() * 2);

	id.push_str(prefix);
	id.push('_');

	for byte in bytes {
		let _ = write!(id, "{byte:02x}");
	}

	id
}
