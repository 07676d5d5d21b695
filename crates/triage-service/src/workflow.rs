use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;

use crate::{Error, Result, StrategyInput, StrategyOutcome, TriageService, writer::ComposedAnswer};
use triage_domain::{RetrievedContext, RoutePlan, Strategy, TicketRef, extract_ticket_refs};

/// One incoming question with its two routing hints.
#[derive(Clone, Debug, Deserialize)]
pub struct RagRequest {
	pub query: String,
	#[serde(default)]
	pub user_can_wait: bool,
	#[serde(default)]
	pub production_incident: bool,
}

/// One human-readable processing note, mirrored into the response.
#[derive(Clone, Debug, Serialize)]
pub struct Message {
	pub content: String,
	pub r#type: String,
}
impl Message {
	fn ai(content: impl Into<String>) -> Self {
		Self { content: content.into(), r#type: "ai".to_string() }
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct RagResponse {
	pub query: String,
	pub final_answer: String,
	pub relevant_tickets: Vec<TicketRef>,
	pub routing_decision: String,
	pub routing_reasoning: String,
	pub retrieval_method: String,
	pub retrieved_contexts: Vec<RetrievedContext>,
	pub retrieval_metadata: Map<String, Value>,
	pub user_can_wait: bool,
	pub production_incident: bool,
	pub messages: Vec<Message>,
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
	pub total_processing_time: f64,
}

impl TriageService {
	/// Drives one request through SupervisorDecide, Retrieve, and Compose.
	/// Retrieval failures degrade (one Compression fallback, then an empty
	/// context list); only input validation errors surface to the caller.
	pub async fn process_query(&self, req: RagRequest) -> Result<RagResponse> {
		self.process_query_with_deadline(req, None).await
	}

	/// As [`process_query`], with an optional caller-side deadline; the
	/// stricter of the client deadline and the strategy budget applies.
	pub async fn process_query_with_deadline(
		&self,
		req: RagRequest,
		client_deadline: Option<Duration>,
	) -> Result<RagResponse> {
		let query = req.query.trim().to_string();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "Query must be non-empty.".to_string() });
		}

		self.metrics.record_request();

		let started = Instant::now();
		let mut messages = Vec::new();
		let mut stage_timings = Map::new();

		// SupervisorDecide.
		let stage_started = Instant::now();
		let plan =
			self.route_query(&query, req.user_can_wait, req.production_incident).await;

		stage_timings
			.insert("supervisor".to_string(), json!(stage_started.elapsed().as_secs_f64()));
		messages.push(Message::ai(format!(
			"Supervisor routed query to {} agent: {}",
			plan.strategy, plan.reasoning
		)));
		tracing::info!(
			strategy = plan.strategy.as_str(),
			urgent = plan.urgent,
			"Routing decision made."
		);

		// Retrieve, with one degraded-Compression fallback.
		let stage_started = Instant::now();
		let input = StrategyInput {
			query: &query,
			user_can_wait: req.user_can_wait,
			production_incident: req.production_incident,
			k: self.cfg.retrieval.top_k,
		};
		let mut attempts: Vec<Value> = Vec::new();
		let outcome = self.retrieve_with_fallback(&plan, &input, client_deadline, &mut attempts).await;
		let retrieve_seconds = stage_started.elapsed().as_secs_f64();

		stage_timings.insert("retrieve".to_string(), json!(retrieve_seconds));
		messages.push(Message::ai(format!(
			"{} retrieval returned {} contexts.",
			outcome.method,
			outcome.contexts.len()
		)));

		// Compose, inside its own budget.
		let stage_started = Instant::now();
		let compose_budget = Duration::from_millis(self.cfg.workflow.compose_budget_ms);
		let composed = match tokio::time::timeout(
			compose_budget,
			self.compose_answer(&query, &outcome.method, req.production_incident, &outcome.contexts),
		)
		.await
		{
			Ok(composed) => composed,
			Err(_) => {
				tracing::warn!("Response composition exceeded its budget.");

				let mut tickets = extract_ticket_refs(&outcome.contexts);
				let answer = if outcome.contexts.is_empty() {
					crate::writer::no_results_answer(&query)
				} else {
					crate::writer::fallback_answer(&query, req.production_incident, &tickets)
				};
				let answer =
					crate::writer::enforce_cited_keys(answer, &mut tickets, &outcome.contexts);

				ComposedAnswer { answer, tickets }
			},
		};

		stage_timings.insert("compose".to_string(), json!(stage_started.elapsed().as_secs_f64()));
		messages.push(Message::ai(format!(
			"ResponseWriter generated final answer with {} relevant tickets.",
			composed.tickets.len()
		)));

		let mut retrieval_metadata = outcome.metadata;

		retrieval_metadata.insert("agent".to_string(), json!(outcome.method));
		retrieval_metadata.insert("num_results".to_string(), json!(outcome.contexts.len()));
		retrieval_metadata.insert("processing_time".to_string(), json!(retrieve_seconds));
		retrieval_metadata.insert("method_type".to_string(), json!(outcome.method_type));
		retrieval_metadata.insert("attempts".to_string(), json!(attempts));
		retrieval_metadata.insert("filters_applied".to_string(), json!(false));
		retrieval_metadata.insert("stage_timings".to_string(), json!(stage_timings));

		if !outcome.warnings.is_empty() {
			retrieval_metadata.insert("messages".to_string(), json!(outcome.warnings));
		}

		let mut retrieved_contexts = outcome.contexts;

		retrieved_contexts.truncate(self.cfg.retrieval.top_k as usize);
		self.metrics.record_latency_micros(started.elapsed().as_micros() as u64);

		Ok(RagResponse {
			query,
			final_answer: composed.answer,
			relevant_tickets: composed.tickets,
			routing_decision: plan.strategy.as_str().to_string(),
			routing_reasoning: plan.reasoning,
			retrieval_method: outcome.method,
			retrieved_contexts,
			retrieval_metadata,
			user_can_wait: req.user_can_wait,
			production_incident: req.production_incident,
			messages,
			timestamp: OffsetDateTime::now_utc(),
			total_processing_time: started.elapsed().as_secs_f64(),
		})
	}

	/// Routing decision alone, for the debug surface.
	pub async fn routing_decision(&self, req: &RagRequest) -> Result<RoutePlan> {
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "Query must be non-empty.".to_string() });
		}

		Ok(self.route_query(query, req.user_can_wait, req.production_incident).await)
	}

	async fn retrieve_with_fallback(
		&self,
		plan: &RoutePlan,
		input: &StrategyInput<'_>,
		client_deadline: Option<Duration>,
		attempts: &mut Vec<Value>,
	) -> StrategyOutcome {
		let budget = apply_deadline(self.strategy_budget(plan.strategy), client_deadline);
		let attempt_started = Instant::now();

		match tokio::time::timeout(budget, self.run_strategy(plan.strategy, input)).await {
			Ok(Ok(outcome)) => {
				attempts.push(attempt_record(plan.strategy.as_str(), "completed", attempt_started, None));

				return outcome;
			},
			Ok(Err(err)) => {
				tracing::warn!(
					strategy = plan.strategy.as_str(),
					error = %err,
					"Strategy failed; falling back to degraded compression."
				);
				attempts.push(attempt_record(
					plan.strategy.as_str(),
					"failed",
					attempt_started,
					Some(err.to_string()),
				));
			},
			Err(_) => {
				tracing::warn!(
					strategy = plan.strategy.as_str(),
					budget_ms = budget.as_millis() as u64,
					"Strategy timed out; falling back to degraded compression."
				);
				attempts.push(attempt_record(plan.strategy.as_str(), "timed_out", attempt_started, None));
			},
		}

		self.metrics.record_fallback();

		let fallback_budget = apply_deadline(
			Duration::from_millis(self.cfg.workflow.compression_timeout_ms),
			client_deadline,
		);
		let attempt_started = Instant::now();

		match tokio::time::timeout(fallback_budget, self.run_compression(input, true)).await {
			Ok(Ok(mut outcome)) => {
				attempts.push(attempt_record(
					"Compression (fallback)",
					"completed",
					attempt_started,
					None,
				));
				outcome.method = "Compression (fallback)".to_string();

				outcome
			},
			Ok(Err(err)) => {
				attempts.push(attempt_record(
					"Compression (fallback)",
					"failed",
					attempt_started,
					Some(err.to_string()),
				));
				self.empty_fallback_outcome(err.to_string())
			},
			Err(_) => {
				attempts.push(attempt_record(
					"Compression (fallback)",
					"timed_out",
					attempt_started,
					None,
				));
				self.empty_fallback_outcome("Fallback retrieval timed out.".to_string())
			},
		}
	}

	fn empty_fallback_outcome(&self, warning: String) -> StrategyOutcome {
		self.metrics.record_strategy_failure();

		let mut outcome = StrategyOutcome::empty("none", "empty_fallback");

		outcome.warnings.push(warning);

		outcome
	}

	fn strategy_budget(&self, strategy: Strategy) -> Duration {
		let millis = match strategy {
			Strategy::Bm25 => self.cfg.workflow.bm25_timeout_ms,
			Strategy::Compression => self.cfg.workflow.compression_timeout_ms,
			Strategy::Ensemble => self.cfg.workflow.ensemble_timeout_ms,
			Strategy::WebSearch => self.cfg.workflow.web_search_timeout_ms,
			Strategy::LogSearch => self.cfg.workflow.log_search_timeout_ms,
		};

		Duration::from_millis(millis)
	}
}

fn apply_deadline(budget: Duration, client_deadline: Option<Duration>) -> Duration {
	match client_deadline {
		Some(deadline) => budget.min(deadline),
		None => budget,
	}
}

fn attempt_record(
	agent: &str,
	status: &str,
	started: Instant,
	error: Option<String>,
) -> Value {
	let mut record = Map::new();

	record.insert("agent".to_string(), json!(agent));
	record.insert("status".to_string(), json!(status));
	record.insert("elapsed_ms".to_string(), json!(started.elapsed().as_millis() as u64));

	if let Some(error) = error {
		record.insert("error".to_string(), json!(error));
	}

	Value::Object(record)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn the_stricter_deadline_wins() {
		let budget = Duration::from_secs(30);

		assert_eq!(apply_deadline(budget, None), budget);
		assert_eq!(apply_deadline(budget, Some(Duration::from_secs(5))), Duration::from_secs(5));
		assert_eq!(apply_deadline(budget, Some(Duration::from_secs(60))), budget);
	}
}
