use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result, classify_http_error};

/// One ranked hit from the web search provider.
#[derive(Clone, Debug, PartialEq)]
pub struct WebHit {
	pub title: String,
	pub url: String,
	pub snippet: String,
	pub score: Option<f32>,
	pub timestamp: Option<String>,
}

/// Issues one keyword query against the search provider and returns its
/// ranked hits. `model` selects the provider's search depth tier.
pub async fn search(
	cfg: &triage_config::ProviderConfig,
	query: &str,
	max_results: u32,
) -> Result<Vec<WebHit>> {
	let client = Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.build()
		.map_err(Error::Reqwest)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"query": query,
		"search_depth": cfg.model,
		"max_results": max_results,
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

	parse_search_response(json)
}

fn parse_search_response(json: Value) -> Result<Vec<WebHit>> {
	let results = json.get("results").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Search response is missing results array.".to_string() }
	})?;
	let mut out = Vec::with_capacity(results.len());

	for item in results {
		let Some(url) = item.get("url").and_then(Value::as_str) else {
			continue;
		};
		let title = item.get("title").and_then(Value::as_str).unwrap_or("Web Search Result");
		let snippet = item
			.get("content")
			.or_else(|| item.get("snippet"))
			.and_then(Value::as_str)
			.unwrap_or_default();
		let score = item.get("score").and_then(Value::as_f64).map(|s| s as f32);
		let timestamp = item
			.get("published_date")
			.or_else(|| item.get("timestamp"))
			.and_then(Value::as_str)
			.map(str::to_string);

		out.push(WebHit {
			title: title.to_string(),
			url: url.to_string(),
			snippet: snippet.to_string(),
			score,
			timestamp,
		});
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_hits_and_skips_entries_without_urls() {
		let json = serde_json::json!({
			"results": [
				{
					"title": "GitHub Status",
					"url": "https://www.githubstatus.com",
					"content": "All systems operational.",
					"score": 0.93
				},
				{ "title": "no url" },
				{
					"url": "https://example.com/incident",
					"snippet": "Elevated error rates.",
					"published_date": "2025-05-01"
				}
			]
		});
		let hits = parse_search_response(json).expect("parse failed");

		assert_eq!(hits.len(), 2);
		assert_eq!(hits[0].title, "GitHub Status");
		assert_eq!(hits[0].score, Some(0.93));
		assert_eq!(hits[1].title, "Web Search Result");
		assert_eq!(hits[1].timestamp.as_deref(), Some("2025-05-01"));
	}

	#[test]
	fn missing_results_array_is_an_invalid_response() {
		assert!(parse_search_response(serde_json::json!({"answer": "none"})).is_err());
	}
}
