//! HTTP client for the receiver's store-facing calls.

// crates.io
use reqwest::{Client, RequestBuilder};
use url::Url;
// self
use crate::{
	_prelude::*,
	config,
	model::{CaptureBatch, CaptureBatchReply, CapturedRequest, EndpointInfo, QuotaInfo, StoreReply},
};

/// Client for the store's authenticated HTTP actions.
#[derive(Debug)]
pub struct StoreClient {
	client: Client,
	base: Url,
	secret: Option<String>,
}
impl StoreClient {
	/// Build a client for the store at `base`.
	pub fn new(base: Url, secret: Option<String>) -> Result<Self> {
		let client = Client::builder()
			.timeout(config::HTTP_TIMEOUT)
			.user_agent(format!("webhook-capture/{}", env!("CARGO_PKG_VERSION")))
			.build()?;

		Ok(Self { client, base, secret })
	}

	/// Fetch endpoint configuration; `Ok(None)` when the slug is unknown.
	pub async fn endpoint_info(&self, slug: &str) -> Result<Option<EndpointInfo>> {
		match self.fetch_json::<EndpointInfo>("endpoint-info", slug).await? {
			StoreReply::Ok(info) => Ok(Some(info)),
			StoreReply::Err(reply) if reply.error == "not_found" => Ok(None),
			StoreReply::Err(reply) =>
				Err(Error::Cache(format!("Unexpected endpoint-info reply: {}.", reply.error))),
		}
	}

	/// Fetch the remaining-budget projection; `Ok(None)` when the slug is unknown.
	pub async fn quota(&self, slug: &str) -> Result<Option<QuotaInfo>> {
		match self.fetch_json::<QuotaInfo>("quota", slug).await? {
			StoreReply::Ok(info) => Ok(Some(info)),
			StoreReply::Err(reply) if reply.error == "not_found" => Ok(None),
			StoreReply::Err(reply) =>
				Err(Error::Cache(format!("Unexpected quota reply: {}.", reply.error))),
		}
	}

	/// Ship a batch of captured requests for `slug`.
	pub async fn capture_batch(
		&self,
		slug: &str,
		requests: Vec<CapturedRequest>,
	) -> Result<CaptureBatchReply> {
		let url = self.base.join("capture-batch")?;
		let body = CaptureBatch { slug: slug.to_string(), requests };
		let response = self.authorize(self.client.post(url.clone())).json(&body).send().await?;
		let status = response.status();

		if !status.is_success() {
			let body = response.text().await.ok();

			return Err(Error::Store { status, url, body });
		}

		Ok(response.json().await?)
	}

	async fn fetch_json<T>(&self, action: &str, slug: &str) -> Result<StoreReply<T>>
	where
		T: serde::de::DeserializeOwned,
	{
		let mut url = self.base.join(action)?;

		url.query_pairs_mut().append_pair("slug", slug);

		let response = self.authorize(self.client.get(url.clone())).send().await?;
		let status = response.status();

		if !status.is_success() {
			let body = response.text().await.ok();

			return Err(Error::Store { status, url, body });
		}
		if let Some(length) = response.content_length()
			&& length > config::MAX_STORE_RESPONSE_SIZE
		{
			return Err(Error::Validation {
				field: "store_response",
				reason: format!("Advertised size {length} bytes exceeds the response guard."),
			});
		}

		let bytes = response.bytes().await?;

		if bytes.len() as u64 > config::MAX_STORE_RESPONSE_SIZE {
			return Err(Error::Validation {
				field: "store_response",
				reason: format!("Response size {} bytes exceeds the response guard.", bytes.len()),
			});
		}

		Ok(serde_json::from_slice(&bytes)?)
	}

	fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
		match &self.secret {
			Some(secret) => request.bearer_auth(secret),
			None => request,
		}
	}
}
