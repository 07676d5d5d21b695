use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result, classify_http_error};

/// One log entry returned by the log store.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
	pub timestamp: String,
	pub severity: String,
	pub service: Option<String>,
	pub payload: String,
}

/// Runs one filter-language query against the log store and returns matching
/// entries, newest first as the store orders them.
pub async fn query_entries(
	cfg: &triage_config::ProviderConfig,
	filter: &str,
	max_results: u32,
) -> Result<Vec<LogEntry>> {
	let client = Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.build()
		.map_err(Error::Reqwest)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"filter": filter,
		"order_by": "timestamp desc",
		"page_size": max_results,
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

	parse_entries_response(json)
}

fn parse_entries_response(json: Value) -> Result<Vec<LogEntry>> {
	let entries = json.get("entries").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Log response is missing entries array.".to_string() }
	})?;
	let mut out = Vec::with_capacity(entries.len());

	for entry in entries {
		let Some(timestamp) = entry.get("timestamp").and_then(Value::as_str) else {
			continue;
		};
		let severity = entry.get("severity").and_then(Value::as_str).unwrap_or("DEFAULT");
		let service = entry
			.get("resource")
			.and_then(|r| r.get("labels"))
			.and_then(|l| l.get("service_name").or_else(|| l.get("module_id")))
			.and_then(Value::as_str)
			.map(str::to_string);
		let payload = extract_payload(entry);

		if payload.is_empty() {
			continue;
		}

		out.push(LogEntry {
			timestamp: timestamp.to_string(),
			severity: severity.to_string(),
			service,
			payload,
		});
	}

	Ok(out)
}

fn extract_payload(entry: &Value) -> String {
	if let Some(text) = entry.get("textPayload").and_then(Value::as_str) {
		return text.to_string();
	}
	if let Some(json_payload) = entry.get("jsonPayload") {
		if let Some(message) = json_payload.get("message").and_then(Value::as_str) {
			return message.to_string();
		}

		return json_payload.to_string();
	}

	String::new()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_text_and_json_payloads() {
		let json = serde_json::json!({
			"entries": [
				{
					"timestamp": "2025-05-01T10:00:00Z",
					"severity": "ERROR",
					"textPayload": "CertificateExpiredException: cert expired",
					"resource": { "labels": { "service_name": "checkout" } }
				},
				{
					"timestamp": "2025-05-01T10:01:00Z",
					"severity": "ERROR",
					"jsonPayload": { "message": "HTTP 503 from upstream" }
				},
				{ "severity": "ERROR", "textPayload": "missing timestamp" }
			]
		});
		let entries = parse_entries_response(json).expect("parse failed");

		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].service.as_deref(), Some("checkout"));
		assert!(entries[0].payload.contains("CertificateExpiredException"));
		assert_eq!(entries[1].payload, "HTTP 503 from upstream");
	}

	#[test]
	fn missing_entries_array_is_an_invalid_response() {
		assert!(parse_entries_response(serde_json::json!({})).is_err());
	}
}
