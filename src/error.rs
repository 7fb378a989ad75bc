//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the webhook capture crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Http(#[from] http::Error),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Cache error: {0}")]
	Cache(String),
	#[error("Configuration error for {field}: {reason}")]
	Config { field: &'static str, reason: String },
	#[error("Store HTTP status {status} from {url}: {body:?}")]
	Store { status: http::StatusCode, url: url::Url, body: Option<String> },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
