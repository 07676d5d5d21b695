use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::{Duration, Instant},
};

use rand::Rng;
use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result, classify_http_error};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 250;
const BACKOFF_CAP_MS: u64 = 4_000;
const MAX_INPUT_CHARS: usize = 32_000;

static REQUEST_COUNT: AtomicU64 = AtomicU64::new(0);
static LATENCY_MICROS: AtomicU64 = AtomicU64::new(0);

/// Embeds a batch of texts. Transient upstream failures are retried with full
/// jitter (base 250 ms, cap 4 s, three attempts); invalid input and
/// authentication failures are not.
pub async fn embed(
	cfg: &triage_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	for (index, text) in texts.iter().enumerate() {
		if text.trim().is_empty() {
			return Err(Error::InvalidInput {
				message: format!("Embedding input {index} is empty."),
			});
		}
		if text.len() > MAX_INPUT_CHARS {
			return Err(Error::InvalidInput {
				message: format!("Embedding input {index} exceeds {MAX_INPUT_CHARS} characters."),
			});
		}
	}

	let client = Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.build()
		.map_err(Error::Reqwest)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let mut last_error = None;

	for attempt in 0..MAX_ATTEMPTS {
		if attempt > 0 {
			tokio::time::sleep(backoff_delay(attempt)).await;
		}

		let started = Instant::now();
		let result = request_embeddings(&client, &url, cfg, texts).await;

		REQUEST_COUNT.fetch_add(1, Ordering::Relaxed);
		LATENCY_MICROS.fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);

		match result {
			Ok(vectors) => return Ok(vectors),
			Err(err) if err.is_retryable() => {
				tracing::warn!(attempt, error = %err, "Embedding request failed; retrying.");

				last_error = Some(err);
			},
			Err(err) => return Err(err),
		}
	}

	Err(last_error.unwrap_or(Error::Transient {
		message: "Embedding provider exhausted retries.".to_string(),
	}))
}

/// Total embedding requests issued by this process.
pub fn request_count() -> u64 {
	REQUEST_COUNT.load(Ordering::Relaxed)
}

/// Cumulative embedding call latency in microseconds.
pub fn recorded_latency_micros() -> u64 {
	LATENCY_MICROS.load(Ordering::Relaxed)
}

async fn request_embeddings(
	client: &Client,
	url: &str,
	cfg: &triage_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await
		.map_err(classify_http_error)?;
	let json: Value =
		res.error_for_status().map_err(classify_http_error)?.json().await.map_err(Error::Reqwest)?;

	parse_embedding_response(json)
}

/// Full jitter: a uniform draw from zero up to the exponential ceiling.
fn backoff_delay(attempt: u32) -> Duration {
	let ceiling = BACKOFF_BASE_MS.saturating_mul(2_u64.saturating_pow(attempt - 1));
	let capped = ceiling.min(BACKOFF_CAP_MS);
	let jittered = rand::thread_rng().gen_range(0..=capped);

	Duration::from_millis(jittered)
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse { message: "Embedding item missing embedding array.".to_string() }
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_embeddings_in_index_order() {
		let json = serde_json::json!({
			"data": [
				{ "index": 1, "embedding": [2.0, 3.0] },
				{ "index": 0, "embedding": [0.5, 1.5] }
			]
		});
		let parsed = parse_embedding_response(json).expect("parse failed");

		assert_eq!(parsed.len(), 2);
		assert_eq!(parsed[0], vec![0.5, 1.5]);
		assert_eq!(parsed[1], vec![2.0, 3.0]);
	}

	#[test]
	fn backoff_stays_under_the_cap() {
		for attempt in 1..8 {
			assert!(backoff_delay(attempt) <= Duration::from_millis(BACKOFF_CAP_MS));
		}
	}

	#[tokio::test]
	async fn empty_input_is_rejected_without_a_request() {
		let cfg = triage_config::EmbeddingProviderConfig {
			provider_id: "embed".to_string(),
			api_base: "http://localhost:1".to_string(),
			api_key: "key".to_string(),
			path: "/embeddings".to_string(),
			model: "model".to_string(),
			dimensions: 3,
			timeout_ms: 50,
			default_headers: serde_json::Map::new(),
		};
		let before = request_count();
		let err = embed(&cfg, &["  ".to_string()]).await.expect_err("Expected input rejection.");

		assert!(matches!(err, Error::InvalidInput { .. }));
		assert_eq!(request_count(), before);
	}
}
