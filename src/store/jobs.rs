//! Store maintenance: expired-endpoint cleanup and billing-period reset.

// crates.io
use tokio::time;
// self
use crate::{
	_prelude::*,
	config,
	model::{Millis, now_ms},
	store::db::{Db, Plan},
};

/// Expired endpoints and lapsed owners examined per pass.
const SCAN_LIMIT: usize = 100;

/// Summary of one cleanup pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupStats {
	/// Endpoints fully drained and deleted.
	pub endpoints_deleted: usize,
	/// Request rows deleted across all endpoints.
	pub requests_deleted: usize,
}

/// One cleanup pass over endpoints past their expiry.
///
/// Rows are deleted in batches of [`config::CLEANUP_BATCH_SIZE`]; the
/// endpoint itself goes only once a batch comes back short, which signals no
/// rows remain. Re-running converges, so a partially drained endpoint is
/// picked up again on the next pass.
pub async fn cleanup_expired(db: &Db, now: Millis) -> CleanupStats {
	let mut stats = CleanupStats::default();

	for endpoint_id in db.expired_endpoints(now, SCAN_LIMIT).await {
		let deleted = db.delete_requests(&endpoint_id, config::CLEANUP_BATCH_SIZE).await;

		stats.requests_deleted += deleted;

		if deleted < config::CLEANUP_BATCH_SIZE {
			db.delete_endpoint(&endpoint_id).await;

			stats.endpoints_deleted += 1;
		}
	}

	if stats != CleanupStats::default() {
		tracing::info!(
			endpoints = stats.endpoints_deleted,
			requests = stats.requests_deleted,
			"cleanup pass finished"
		);
	}

	stats
}

/// One pass over owners whose billing period lapsed.
///
/// Pro owners marked to cancel are downgraded; the rest roll forward one
/// billing interval with a zeroed counter. Free owners are skipped — their
/// lapsed periods re-activate lazily on the next capture.
pub async fn reset_lapsed_periods(db: &Db, now: Millis) -> usize {
	let free_limit = db.config().free_request_limit;
	let billing_period = db.config().billing_period_ms;
	let mut touched = 0;

	for owner in db.owners_past_period_end(now, SCAN_LIMIT).await {
		if owner.plan != Plan::Pro {
			continue;
		}

		if owner.cancel_at_period_end {
			db.update_owner(&owner.id, |owner| {
				owner.plan = Plan::Free;
				owner.request_limit = free_limit;
				owner.requests_used = 0;
				owner.period_start = None;
				owner.period_end = None;
				owner.cancel_at_period_end = false;
				owner.subscription_status = Some("canceled".into());
			})
			.await;

			tracing::info!(owner = %owner.id, "pro subscription lapsed, downgraded");
		} else if let Some(end) = owner.period_end {
			db.update_owner(&owner.id, |owner| {
				owner.period_start = Some(end);
				owner.period_end = Some(end + billing_period);
				owner.requests_used = 0;
			})
			.await;
		}

		touched += 1;
	}

	touched
}

/// Run both maintenance jobs on a fixed cadence.
pub async fn run(db: Arc<Db>) {
	let mut ticker = time::interval(config::JOB_INTERVAL);

	loop {
		ticker.tick().await;

		let now = now_ms();

		cleanup_expired(&db, now).await;
		reset_lapsed_periods(&db, now).await;
	}
}
