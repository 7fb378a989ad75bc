//! Store surface tests over a real listener.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use serde_json::{Value, json};
use webhook_capture::{
	config::StoreConfig,
	model::{MockResponse, now_ms},
	store::{
		self,
		api::StoreState,
		db::{Db, Plan},
		usage::UsageScheduler,
	},
};

const SECRET: &str = "store-secret";

async fn spawn_store(secret: Option<&str>) -> (String, Arc<Db>) {
	let config = StoreConfig { shared_secret: secret.map(str::to_string), ..Default::default() };
	let db = Db::new(config.clone());
	let usage = UsageScheduler::new(db.clone());
	let state =
		StoreState { db: db.clone(), usage, shared_secret: config.shared_secret.clone() };
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
	let addr = listener.local_addr().expect("addr");
	let app = store::router(state);

	tokio::spawn(async move {
		let _ = axum::serve(listener, app).await;
	});

	(format!("http://{addr}"), db)
}

fn batch_request(path: &str, received_at: i64) -> Value {
	json!({
		"method": "POST",
		"path": path,
		"headers": { "Content-Type": "application/json" },
		"body": "{}",
		"queryParams": {},
		"ip": "203.0.113.7",
		"receivedAt": received_at,
	})
}

#[tokio::test]
async fn an_unset_secret_fails_closed() {
	let _ = tracing_subscriber::fmt::try_init();

	let (base, _db) = spawn_store(None).await;
	let response = reqwest::Client::new()
		.get(format!("{base}/quota?slug=abc"))
		.bearer_auth("anything")
		.send()
		.await
		.expect("request");

	assert_eq!(response.status().as_u16(), 500);
	assert_eq!(
		response.json::<Value>().await.expect("json"),
		json!({ "error": "server_misconfiguration" })
	);
}

#[tokio::test]
async fn a_wrong_or_missing_secret_is_unauthorized() {
	let _ = tracing_subscriber::fmt::try_init();

	let (base, _db) = spawn_store(Some(SECRET)).await;
	let client = reqwest::Client::new();
	let wrong = client
		.get(format!("{base}/quota?slug=abc"))
		.bearer_auth("wrong")
		.send()
		.await
		.expect("request");

	assert_eq!(wrong.status().as_u16(), 401);

	let missing =
		client.get(format!("{base}/quota?slug=abc")).send().await.expect("request");

	assert_eq!(missing.status().as_u16(), 401);
	assert_eq!(missing.json::<Value>().await.expect("json"), json!({ "error": "unauthorized" }));
}

#[tokio::test]
async fn endpoint_info_projects_the_record() {
	let _ = tracing_subscriber::fmt::try_init();

	let (base, db) = spawn_store(Some(SECRET)).await;

	db.create_ephemeral_endpoint("hook").await.expect("create");
	db.configure_endpoint(
		"hook",
		None,
		Some(MockResponse { status: 201, body: "made it".into(), headers: Default::default() }),
	)
	.await
	.expect("configure");

	let client = reqwest::Client::new();
	let info = client
		.get(format!("{base}/endpoint-info?slug=hook"))
		.bearer_auth(SECRET)
		.send()
		.await
		.expect("request")
		.json::<Value>()
		.await
		.expect("json");

	assert_eq!(info["isEphemeral"], true);
	assert_eq!(info["ownerId"], Value::Null);
	assert_eq!(info["mockResponse"]["status"], 201);
	assert!(info["expiresAt"].as_i64().expect("expiry") > now_ms());

	let missing = client
		.get(format!("{base}/endpoint-info?slug=ghost"))
		.bearer_auth(SECRET)
		.send()
		.await
		.expect("request")
		.json::<Value>()
		.await
		.expect("json");

	assert_eq!(missing, json!({ "error": "not_found" }));
}

#[tokio::test]
async fn quota_reports_owned_and_unlimited_budgets() {
	let _ = tracing_subscriber::fmt::try_init();

	let (base, db) = spawn_store(Some(SECRET)).await;
	let owner = db.create_owner("a@example.com", Plan::Free).await;

	db.create_endpoint("owned", &owner.id).await.expect("create owned");
	db.create_ephemeral_endpoint("anon").await.expect("create anon");

	let client = reqwest::Client::new();
	let owned = client
		.get(format!("{base}/quota?slug=owned"))
		.bearer_auth(SECRET)
		.send()
		.await
		.expect("request")
		.json::<Value>()
		.await
		.expect("json");

	assert_eq!(owned["ownerId"], json!(owner.id));
	assert_eq!(owned["remaining"], 500);
	assert_eq!(owned["limit"], 500);

	let anon = client
		.get(format!("{base}/quota?slug=anon"))
		.bearer_auth(SECRET)
		.send()
		.await
		.expect("request")
		.json::<Value>()
		.await
		.expect("json");

	assert_eq!(anon["remaining"], -1);
	assert_eq!(anon["ownerId"], Value::Null);
}

#[tokio::test]
async fn capture_batch_inserts_everything_in_order() {
	let _ = tracing_subscriber::fmt::try_init();

	let (base, db) = spawn_store(Some(SECRET)).await;
	let endpoint = db.create_ephemeral_endpoint("hook").await.expect("create");
	let reply = reqwest::Client::new()
		.post(format!("{base}/capture-batch"))
		.bearer_auth(SECRET)
		.json(&json!({
			"slug": "hook",
			"requests": [batch_request("/a", 1), batch_request("/b", 2), batch_request("/c", 3)],
		}))
		.send()
		.await
		.expect("request")
		.json::<Value>()
		.await
		.expect("json");

	assert_eq!(reply, json!({ "success": true, "inserted": 3 }));

	let rows = db.recent_requests(&endpoint.id, 10).await;

	assert_eq!(rows.len(), 3);
	assert_eq!(rows[0].path, "/c");
	assert_eq!(rows[2].path, "/a");
	assert_eq!(rows[0].received_at, 3);
	assert_eq!(rows[0].size, 2);
	assert_eq!(rows[0].content_type.as_deref(), Some("application/json"));
	assert_eq!(db.endpoint_by_slug("hook").await.expect("endpoint").request_count, 3);
}

#[tokio::test]
async fn the_batch_boundary_is_exact() {
	let _ = tracing_subscriber::fmt::try_init();

	let (base, db) = spawn_store(Some(SECRET)).await;

	db.create_ephemeral_endpoint("hook").await.expect("create");

	let client = reqwest::Client::new();
	let full = (0..100).map(|i| batch_request("/x", i)).collect::<Vec<_>>();
	let accepted = client
		.post(format!("{base}/capture-batch"))
		.bearer_auth(SECRET)
		.json(&json!({ "slug": "hook", "requests": full }))
		.send()
		.await
		.expect("request");

	assert_eq!(accepted.status().as_u16(), 200);
	assert_eq!(accepted.json::<Value>().await.expect("json")["inserted"], 100);

	let oversized = (0..101).map(|i| batch_request("/x", i)).collect::<Vec<_>>();
	let rejected = client
		.post(format!("{base}/capture-batch"))
		.bearer_auth(SECRET)
		.json(&json!({ "slug": "hook", "requests": oversized }))
		.send()
		.await
		.expect("request");

	assert_eq!(rejected.status().as_u16(), 400);
	assert_eq!(
		rejected.json::<Value>().await.expect("json"),
		json!({ "error": "batch_too_large" })
	);
}

#[tokio::test]
async fn unknown_and_expired_slugs_report_zero_inserted() {
	let _ = tracing_subscriber::fmt::try_init();

	let (base, db) = spawn_store(Some(SECRET)).await;
	let client = reqwest::Client::new();
	let unknown = client
		.post(format!("{base}/capture-batch"))
		.bearer_auth(SECRET)
		.json(&json!({ "slug": "ghost", "requests": [batch_request("/a", 1)] }))
		.send()
		.await
		.expect("request")
		.json::<Value>()
		.await
		.expect("json");

	assert_eq!(unknown, json!({ "error": "not_found", "inserted": 0 }));

	let endpoint = db.create_ephemeral_endpoint("stale").await.expect("create");

	db.set_endpoint_expiry(&endpoint.id, Some(now_ms() - 1)).await;

	let expired = client
		.post(format!("{base}/capture-batch"))
		.bearer_auth(SECRET)
		.json(&json!({ "slug": "stale", "requests": [batch_request("/a", 1)] }))
		.send()
		.await
		.expect("request")
		.json::<Value>()
		.await
		.expect("json");

	assert_eq!(expired, json!({ "error": "expired", "inserted": 0 }));
}

#[tokio::test]
async fn an_invalid_request_voids_the_batch() {
	let _ = tracing_subscriber::fmt::try_init();

	let (base, db) = spawn_store(Some(SECRET)).await;
	let endpoint = db.create_ephemeral_endpoint("hook").await.expect("create");
	let mut bad = batch_request("/b", 2);

	bad["method"] = json!("TRACE");

	let response = reqwest::Client::new()
		.post(format!("{base}/capture-batch"))
		.bearer_auth(SECRET)
		.json(&json!({ "slug": "hook", "requests": [batch_request("/a", 1), bad] }))
		.send()
		.await
		.expect("request");

	assert_eq!(response.status().as_u16(), 400);
	assert_eq!(
		response.json::<Value>().await.expect("json"),
		json!({ "error": "invalid_requests" })
	);
	assert!(db.recent_requests(&endpoint.id, 10).await.is_empty());
}

#[tokio::test]
async fn single_captures_validate_and_return_the_mock() {
	let _ = tracing_subscriber::fmt::try_init();

	let (base, db) = spawn_store(Some(SECRET)).await;

	db.create_ephemeral_endpoint("hook").await.expect("create");
	db.configure_endpoint(
		"hook",
		None,
		Some(MockResponse { status: 202, body: "ok".into(), headers: Default::default() }),
	)
	.await
	.expect("configure");

	let client = reqwest::Client::new();
	let accepted = client
		.post(format!("{base}/capture"))
		.bearer_auth(SECRET)
		.json(&json!({ "slug": "hook", "method": "GET", "path": "/ping" }))
		.send()
		.await
		.expect("request")
		.json::<Value>()
		.await
		.expect("json");

	assert_eq!(accepted["success"], true);
	assert_eq!(accepted["mockResponse"]["status"], 202);

	let bad_method = client
		.post(format!("{base}/capture"))
		.bearer_auth(SECRET)
		.json(&json!({ "slug": "hook", "method": "TRACE", "path": "/ping" }))
		.send()
		.await
		.expect("request");

	assert_eq!(bad_method.status().as_u16(), 400);
	assert_eq!(
		bad_method.json::<Value>().await.expect("json"),
		json!({ "error": "invalid_method" })
	);

	let oversized = client
		.post(format!("{base}/capture"))
		.bearer_auth(SECRET)
		.json(&json!({
			"slug": "hook",
			"method": "POST",
			"path": "/ping",
			"body": "b".repeat(1_048_577),
		}))
		.send()
		.await
		.expect("request");

	assert_eq!(oversized.status().as_u16(), 413);
	assert_eq!(
		oversized.json::<Value>().await.expect("json"),
		json!({ "error": "body_too_large" })
	);

	let garbage = client
		.post(format!("{base}/capture"))
		.bearer_auth(SECRET)
		.body("not json")
		.send()
		.await
		.expect("request");

	assert_eq!(garbage.status().as_u16(), 400);
	assert_eq!(
		garbage.json::<Value>().await.expect("json"),
		json!({ "error": "invalid_json" })
	);
}

#[tokio::test]
async fn usage_accounting_converges_after_captures() {
	let _ = tracing_subscriber::fmt::try_init();

	let (base, db) = spawn_store(Some(SECRET)).await;
	let owner = db.create_owner("a@example.com", Plan::Free).await;

	db.create_endpoint("owned", &owner.id).await.expect("create");

	let requests = (0..5).map(|i| batch_request("/n", i)).collect::<Vec<_>>();
	let reply = reqwest::Client::new()
		.post(format!("{base}/capture-batch"))
		.bearer_auth(SECRET)
		.json(&json!({ "slug": "owned", "requests": requests }))
		.send()
		.await
		.expect("request")
		.json::<Value>()
		.await
		.expect("json");

	assert_eq!(reply["inserted"], 5);

	for _ in 0..100 {
		if db.owner(&owner.id).await.map(|owner| owner.requests_used) == Some(5) {
			let quota = reqwest::Client::new()
				.get(format!("{base}/quota?slug=owned"))
				.bearer_auth(SECRET)
				.send()
				.await
				.expect("request")
				.json::<Value>()
				.await
				.expect("json");

			assert_eq!(quota["remaining"], 495);

			return;
		}

		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	panic!("requests_used never reached 5");
}
