use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result, classify_http_error};

/// One chat completion call whose content must parse as a JSON object.
/// Callers own the retry-with-stricter-prompt policy, so a malformed body
/// surfaces as `InvalidResponse` after a single attempt.
pub async fn complete_json(
	cfg: &triage_config::LlmProviderConfig,
	messages: &[Value],
) -> Result<Value> {
	let content = complete_text(cfg, messages).await?;

	parse_json_content(&content)
}

/// One chat completion call returning the raw assistant text.
pub async fn complete_text(
	cfg: &triage_config::LlmProviderConfig,
	messages: &[Value],
) -> Result<String> {
	let client = Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.build()
		.map_err(Error::Reqwest)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
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

	extract_content(json)
}

fn extract_content(json: Value) -> Result<String> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Chat response is missing message content.".to_string(),
		})?;

	Ok(content.to_string())
}

/// Accepts either a bare JSON object or one wrapped in surrounding prose,
/// taking the outermost braced span in the wrapped case.
pub fn parse_json_content(content: &str) -> Result<Value> {
	let trimmed = content.trim();

	if let Ok(value) = serde_json::from_str::<Value>(trimmed)
		&& value.is_object()
	{
		return Ok(value);
	}

	let start = trimmed.find('{');
	let end = trimmed.rfind('}');

	if let (Some(start), Some(end)) = (start, end)
		&& start < end
		&& let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end])
		&& value.is_object()
	{
		return Ok(value);
	}

	Err(Error::InvalidResponse { message: "Chat content is not a JSON object.".to_string() })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "{\"agent\": \"BM25\"}" } }
			]
		});
		let content = extract_content(json).expect("extract failed");

		assert_eq!(content, "{\"agent\": \"BM25\"}");
	}

	#[test]
	fn parses_bare_and_wrapped_json_objects() {
		let bare = parse_json_content("{\"queries\": []}").expect("bare parse failed");

		assert!(bare.get("queries").is_some());

		let wrapped = parse_json_content("Here is the plan:\n{\"agent\": \"WebSearch\"}\nDone.")
			.expect("wrapped parse failed");

		assert_eq!(wrapped.get("agent").and_then(Value::as_str), Some("WebSearch"));
	}

	#[test]
	fn rejects_non_object_content() {
		assert!(parse_json_content("no json here").is_err());
		assert!(parse_json_content("[1, 2, 3]").is_err());
	}
}
