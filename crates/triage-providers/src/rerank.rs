use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result, classify_http_error};

/// Scores `docs` against `query` with the configured relevance model and
/// returns one score per document, aligned by index and clamped to `[0, 1]`.
pub async fn rerank(
	cfg: &triage_config::ProviderConfig,
	query: &str,
	docs: &[String],
) -> Result<Vec<f32>> {
	if docs.is_empty() {
		return Ok(Vec::new());
	}

	let client = Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.build()
		.map_err(Error::Reqwest)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({ "model": cfg.model, "query": query, "documents": docs });
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await
		.map_err(classify_http_error)?;
	let json: Value =
		res.error_for_status().map_err(classify_http_error)?.json().await.map_err(Error::Reqwest)?;

	parse_rerank_response(json, docs.len())
}

fn parse_rerank_response(json: Value, doc_count: usize) -> Result<Vec<f32>> {
	let mut scores = vec![0.0f32; doc_count];
	let results =
		json.get("results").or_else(|| json.get("data")).and_then(|v| v.as_array()).ok_or_else(
			|| Error::InvalidResponse {
				message: "Rerank response is missing results array.".to_string(),
			},
		)?;

	for item in results {
		let index = item.get("index").and_then(|v| v.as_u64()).ok_or_else(|| {
			Error::InvalidResponse { message: "Rerank result missing index.".to_string() }
		})? as usize;
		let score = item
			.get("relevance_score")
			.or_else(|| item.get("score"))
			.and_then(|v| v.as_f64())
			.ok_or_else(|| Error::InvalidResponse {
				message: "Rerank result missing score.".to_string(),
			})? as f32;

		if index < scores.len() {
			scores[index] = score.clamp(0.0, 1.0);
		}
	}

	Ok(scores)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn aligns_scores_by_index_and_clamps() {
		let json = serde_json::json!({
			"results": [
				{ "index": 1, "relevance_score": 0.2 },
				{ "index": 0, "relevance_score": 1.7 }
			]
		});
		let scores = parse_rerank_response(json, 2)
			.expect("Rerank response parsing must succeed for the valid JSON fixture.");

		assert_eq!(scores, vec![1.0, 0.2]);
	}

	#[test]
	fn out_of_range_indices_are_ignored() {
		let json = serde_json::json!({
			"data": [
				{ "index": 9, "score": 0.8 },
				{ "index": 0, "score": 0.4 }
			]
		});
		let scores = parse_rerank_response(json, 2).expect("parse failed");

		assert_eq!(scores, vec![0.4, 0.0]);
	}
}
