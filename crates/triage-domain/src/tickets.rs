use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::RetrievedContext;

static TICKET_KEY_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\b[A-Z]{2,}-\d+\b").expect("Ticket key pattern must compile."));

/// A `(key, title)` ticket reference extracted from retrieved contexts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRef {
	pub key: String,
	pub title: String,
}

/// Collect ticket references from context metadata, first occurrence per key.
/// Titles fall back to the leading `Title:` line of the content.
pub fn extract_ticket_refs(contexts: &[RetrievedContext]) -> Vec<TicketRef> {
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for context in contexts {
		if context.content.trim().is_empty() {
			continue;
		}

		let Some(key) = context.metadata_str("key").map(str::trim).filter(|key| !key.is_empty())
		else {
			continue;
		};

		if !seen.insert(key.to_string()) {
			continue;
		}

		let title = context
			.metadata_str("title")
			.map(str::trim)
			.filter(|title| !title.is_empty())
			.map(str::to_string)
			.or_else(|| title_from_content(&context.content))
			.unwrap_or_else(|| "No title available".to_string());

		out.push(TicketRef { key: key.to_string(), title });
	}

	out
}

/// Ticket keys mentioned in free text, first occurrence order.
pub fn ticket_keys_in(text: &str) -> Vec<String> {
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for found in TICKET_KEY_RE.find_iter(text) {
		let key = found.as_str().to_string();

		if seen.insert(key.clone()) {
			out.push(key);
		}
	}

	out
}

fn title_from_content(content: &str) -> Option<String> {
	let first_line = content.lines().next()?;
	let title = first_line.strip_prefix("Title:")?.trim();

	if title.is_empty() {
		return None;
	}

	Some(title.to_string())
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn ctx_with(key: Option<&str>, title: Option<&str>, content: &str) -> RetrievedContext {
		let mut context = RetrievedContext::new(content, "bm25_bugs", 0.5);

		if let Some(key) = key {
			context.metadata.insert("key".to_string(), json!(key));
		}
		if let Some(title) = title {
			context.metadata.insert("title".to_string(), json!(title));
		}

		context
	}

	#[test]
	fn extracts_refs_with_first_occurrence_dedup() {
		let contexts = vec![
			ctx_with(Some("HBASE-1"), Some("Region server hang"), "Title: Region server hang"),
			ctx_with(Some("HBASE-1"), Some("Duplicate"), "Title: Duplicate"),
			ctx_with(Some("SPR-2"), None, "Title: Context fails to load\nDescription: boot error"),
			ctx_with(None, Some("No key"), "orphan content"),
		];
		let refs = extract_ticket_refs(&contexts);

		assert_eq!(refs.len(), 2);
		assert_eq!(refs[0], TicketRef { key: "HBASE-1".to_string(), title: "Region server hang".to_string() });
		assert_eq!(refs[1].title, "Context fails to load");
	}

	#[test]
	fn missing_title_gets_a_placeholder() {
		let refs = extract_ticket_refs(&[ctx_with(Some("JBIDE-3"), None, "plain description")]);

		assert_eq!(refs[0].title, "No title available");
	}

	#[test]
	fn finds_keys_in_prose() {
		let keys = ticket_keys_in("HBASE-123 regressed after SPR-9; see HBASE-123.");

		assert_eq!(keys, vec!["HBASE-123".to_string(), "SPR-9".to_string()]);
	}
}
