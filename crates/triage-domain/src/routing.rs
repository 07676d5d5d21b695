use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Ticket identifiers look like `HBASE-12345`: an uppercase project prefix of
/// at least two letters, a hyphen, and a numeric suffix.
static TICKET_KEY_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\b[A-Z]{2,}-\d+\b").expect("Ticket key pattern must compile."));

const OUTAGE_TOKENS: &[&str] = &["down", "outage", "status", "latest", "current"];
const OUTAGE_PHRASES: &[&str] = &["status page", "downdetector"];
const LOG_TOKENS: &[&str] = &["log", "logs", "exception", "exceptions", "stacktrace"];
const LOG_PHRASES: &[&str] = &["stack trace", "error rate"];
const ERROR_TOKENS: &[&str] = &["error", "errors", "exception", "failed", "failure", "timeout"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
	Bm25,
	Compression,
	Ensemble,
	WebSearch,
	LogSearch,
}
impl Strategy {
	pub const ALL: [Self; 5] =
		[Self::Bm25, Self::Compression, Self::Ensemble, Self::WebSearch, Self::LogSearch];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Bm25 => "BM25",
			Self::Compression => "Compression",
			Self::Ensemble => "Ensemble",
			Self::WebSearch => "WebSearch",
			Self::LogSearch => "LogSearch",
		}
	}

	pub fn parse(name: &str) -> Option<Self> {
		match name.trim() {
			"BM25" => Some(Self::Bm25),
			"Compression" | "ContextualCompression" => Some(Self::Compression),
			"Ensemble" => Some(Self::Ensemble),
			"WebSearch" => Some(Self::WebSearch),
			"LogSearch" => Some(Self::LogSearch),
			_ => None,
		}
	}
}
impl fmt::Display for Strategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The supervisor's decision for one request: the chosen strategy, a short
/// free-form rationale, and an urgency flag derived from the inputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
	pub strategy: Strategy,
	pub reasoning: String,
	pub urgent: bool,
}
impl RoutePlan {
	pub fn new(strategy: Strategy, reasoning: impl Into<String>, urgent: bool) -> Self {
		let mut reasoning: String = reasoning.into();

		if reasoning.len() > 200 {
			reasoning.truncate(200);
		}

		Self { strategy, reasoning, urgent }
	}
}

/// Rule table, first match wins. Returns `None` when no rule beyond the
/// default fired, so a caller may consult an optional classifier before
/// falling back to [`route`]'s default.
pub fn rule_route(query: &str, user_can_wait: bool, production_incident: bool) -> Option<RoutePlan> {
	if has_outage_vocabulary(query) {
		return Some(RoutePlan::new(
			Strategy::WebSearch,
			"Outage or status vocabulary calls for real-time web results.",
			production_incident,
		));
	}
	if has_ticket_key(query) {
		return Some(RoutePlan::new(
			Strategy::Bm25,
			"Query carries a ticket identifier; exact keyword lookup wins.",
			production_incident,
		));
	}
	if has_log_vocabulary(query) || (production_incident && has_error_vocabulary(query)) {
		return Some(RoutePlan::new(
			Strategy::LogSearch,
			"Log or error vocabulary points at the operational log store.",
			production_incident,
		));
	}
	if user_can_wait {
		return Some(RoutePlan::new(
			Strategy::Ensemble,
			"Caller can wait; running the comprehensive ensemble path.",
			production_incident,
		));
	}
	if production_incident {
		return Some(RoutePlan::new(
			Strategy::Compression,
			"Production incident without a sharper signal; fastest quality path.",
			true,
		));
	}

	None
}

/// Deterministic routing decision: the rule table with the Compression
/// default applied when nothing else fires.
pub fn route(query: &str, user_can_wait: bool, production_incident: bool) -> RoutePlan {
	rule_route(query, user_can_wait, production_incident).unwrap_or_else(|| {
		RoutePlan::new(
			Strategy::Compression,
			"No routing rule fired; defaulting to contextual compression.",
			production_incident,
		)
	})
}

pub fn has_ticket_key(query: &str) -> bool {
	TICKET_KEY_RE.is_match(query)
}

fn has_outage_vocabulary(query: &str) -> bool {
	matches_vocabulary(query, OUTAGE_TOKENS, OUTAGE_PHRASES)
}

fn has_log_vocabulary(query: &str) -> bool {
	matches_vocabulary(query, LOG_TOKENS, LOG_PHRASES)
}

fn has_error_vocabulary(query: &str) -> bool {
	matches_vocabulary(query, ERROR_TOKENS, &[])
}

fn matches_vocabulary(query: &str, tokens: &[&str], phrases: &[&str]) -> bool {
	let lowered = query.to_lowercase();

	if phrases.iter().any(|phrase| lowered.contains(phrase)) {
		return true;
	}

	lowered
		.split(|ch: char| !ch.is_ascii_alphanumeric())
		.filter(|token| !token.is_empty())
		.any(|token| tokens.contains(&token))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ticket_identifier_routes_to_keyword_search() {
		let plan = route("Why does HBASE-12345 time out?", false, false);

		assert_eq!(plan.strategy, Strategy::Bm25);
		assert!(plan.reasoning.contains("identifier"));
	}

	#[test]
	fn outage_vocabulary_beats_identifier_and_hints() {
		let plan = route("Is GitHub down right now? See also PCR-1234", true, true);

		assert_eq!(plan.strategy, Strategy::WebSearch);
		assert!(plan.urgent);
	}

	#[test]
	fn patient_caller_gets_the_ensemble() {
		let plan = route("common causes of OutOfMemoryError in Spring Framework", true, false);

		assert_eq!(plan.strategy, Strategy::Ensemble);
	}

	#[test]
	fn incident_with_error_vocabulary_goes_to_logs() {
		let plan = route("requests failed with timeout spikes", false, true);

		assert_eq!(plan.strategy, Strategy::LogSearch);
	}

	#[test]
	fn incident_without_signal_takes_the_urgent_default() {
		let plan = route("checkout page renders blank", false, true);

		assert_eq!(plan.strategy, Strategy::Compression);
		assert!(plan.urgent);
	}

	#[test]
	fn plain_query_defaults_without_a_rule_firing() {
		assert!(rule_route("how do I tune the cache", false, false).is_none());
		assert_eq!(route("how do I tune the cache", false, false).strategy, Strategy::Compression);
	}

	#[test]
	fn substrings_do_not_trigger_token_vocabularies() {
		// "download" and "outdated" must not read as outage vocabulary.
		assert!(rule_route("download speeds look outdated", false, false).is_none());
	}

	#[test]
	fn strategy_names_round_trip() {
		for strategy in Strategy::ALL {
			assert_eq!(Strategy::parse(strategy.as_str()), Some(strategy));
		}

		assert_eq!(Strategy::parse("ContextualCompression"), Some(Strategy::Compression));
		assert_eq!(Strategy::parse("Unknown"), None);
	}
}
