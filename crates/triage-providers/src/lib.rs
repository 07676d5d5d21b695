pub mod embedding;
pub mod llm;
pub mod logstore;
pub mod rerank;
pub mod websearch;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Maps a transport or status failure onto the retryable/fatal split:
/// timeouts, connection failures, and 5xx responses are transient; 401/403
/// are authentication failures; everything else is permanent.
pub(crate) fn classify_http_error(err: reqwest::Error) -> Error {
	if err.is_timeout() || err.is_connect() {
		return Error::Transient { message: err.to_string() };
	}

	if let Some(status) = err.status() {
		if status.is_server_error() {
			return Error::Transient { message: err.to_string() };
		}
		if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
			return Error::Auth { message: err.to_string() };
		}
	}

	Error::Reqwest(err)
}
