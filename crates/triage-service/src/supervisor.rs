use serde_json::{Value, json};

use crate::{Result, TriageService};
use triage_domain::{RoutePlan, Strategy, route, rule_route};

const ROUTING_PROMPT: &str = "\
You are the supervisor of a ticket retrieval system. Pick exactly one agent \
for the query below.

AVAILABLE AGENTS:
1. BM25 - keyword search for specific ticket references, exact error \
messages, or technical acronyms.
2. Compression - fast semantic search with reranking; best when speed \
matters or nothing sharper applies.
3. Ensemble - comprehensive multi-method search for research questions when \
the caller can wait.
4. WebSearch - real-time web search for service status, outages, and \
anything needing current information.
5. LogSearch - operational log analysis for exceptions, error patterns, and \
production diagnostics.";

impl TriageService {
	/// Routing decision for one request. The rule table wins whenever a rule
	/// beyond the default fires; the classifier is consulted only for
	/// otherwise-ambiguous queries, and any classifier failure falls back to
	/// the deterministic default.
	pub async fn route_query(
		&self,
		query: &str,
		user_can_wait: bool,
		production_incident: bool,
	) -> RoutePlan {
		if let Some(plan) = rule_route(query, user_can_wait, production_incident) {
			return plan;
		}

		if self.cfg.retrieval.classifier_enabled {
			match self.classify(query, user_can_wait, production_incident).await {
				Ok(plan) => return plan,
				Err(err) => {
					tracing::warn!(error = %err, "Routing classifier failed; using the default.");
				},
			}
		}

		route(query, user_can_wait, production_incident)
	}

	async fn classify(
		&self,
		query: &str,
		user_can_wait: bool,
		production_incident: bool,
	) -> Result<RoutePlan> {
		let messages = vec![
			json!({ "role": "system", "content": ROUTING_PROMPT }),
			json!({
				"role": "user",
				"content": format!(
					"QUERY: {query}\nUSER_CAN_WAIT: {user_can_wait}\n\
					PRODUCTION_INCIDENT: {production_incident}\n\n\
					Respond with ONLY: {{\"agent\": \"BM25|Compression|Ensemble|WebSearch|LogSearch\", \
					\"reasoning\": \"brief explanation\"}}"
				),
			}),
		];
		let value =
			self.providers.llm.complete_json(&self.cfg.providers.llm_strong, &messages).await?;
		let strategy = value
			.get("agent")
			.and_then(Value::as_str)
			.and_then(Strategy::parse)
			.unwrap_or(Strategy::Compression);
		let reasoning = value
			.get("reasoning")
			.and_then(Value::as_str)
			.unwrap_or("No reasoning provided")
			.to_string();

		Ok(RoutePlan::new(strategy, format!("Classifier: {reasoning}"), production_incident))
	}
}
