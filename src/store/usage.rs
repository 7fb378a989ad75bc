//! Deferred per-owner usage accounting.

// std
use std::collections::HashMap;
// crates.io
use tokio::sync::{Mutex, mpsc};
// self
use crate::{_prelude::*, store::db::Db};

/// Serializes `requests_used` increments per owner through message passing.
///
/// Each owner gets a dedicated consumer task on first use; increments apply
/// in submission order, so concurrent bursts across the owner's endpoints
/// never contend on the counter and capture mutations never block on it.
#[derive(Debug)]
pub struct UsageScheduler {
	db: Arc<Db>,
	senders: Mutex<HashMap<String, mpsc::UnboundedSender<i64>>>,
}
impl UsageScheduler {
	/// Build a scheduler applying increments against `db`.
	pub fn new(db: Arc<Db>) -> Arc<Self> {
		Arc::new(Self { db, senders: Mutex::new(HashMap::new()) })
	}

	/// Queue `count` usage units for `owner_id`.
	pub async fn schedule(&self, owner_id: &str, count: i64) {
		let mut senders = self.senders.lock().await;
		let sender = senders.entry(owner_id.to_string()).or_insert_with(|| {
			let (tx, mut rx) = mpsc::unbounded_channel();
			let db = self.db.clone();
			let owner = owner_id.to_string();

			tokio::spawn(async move {
				while let Some(count) = rx.recv().await {
					db.increment_usage(&owner, count).await;
				}
			});

			tx
		});

		if sender.send(count).is_err() {
			tracing::warn!(owner = owner_id, count, "usage consumer gone, increment dropped");
		}
	}
}
