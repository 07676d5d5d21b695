use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Value, json};
use time::{Duration as TimeDuration, OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::Semaphore;

use super::{StrategyInput, StrategyOutcome};
use crate::{Result, TriageService};
use triage_domain::{RetrievedContext, clamp_score, content_hash, topk};
use triage_providers::logstore::LogEntry;

const MAX_PLANNED_SEARCHES: usize = 3;
const EXCERPT_CHARS: usize = 400;
const ERROR_INDICATORS: &[&str] = &[
	"error", "exception", "failed", "timeout", "connection", "certificate", "disk space",
	"memory", "dead letter", "500", "502", "503", "504",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LogPlan {
	pub strategy: String,
	pub searches: Vec<PlannedLogSearch>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PlannedLogSearch {
	pub query: String,
	pub search_type: String,
	pub window_hours: i64,
	pub max_results: u32,
	pub exception_types: Vec<String>,
}

/// A concrete log-store query derived from one planned search.
struct LogJob {
	pattern: String,
	exact_exception: bool,
	window_hours: i64,
	max_results: u32,
}

/// Planner phase names a search strategy and up to three log queries;
/// execution dispatches them concurrently against the log store. Scores
/// favor recency within the window and exact exception-class matches.
pub(super) async fn run(
	svc: &TriageService,
	input: &StrategyInput<'_>,
) -> Result<StrategyOutcome> {
	let (plan, mut warnings) = plan_searches(svc, input).await;
	let jobs = expand_jobs(svc, &plan);
	let now = OffsetDateTime::now_utc();
	let semaphore = Arc::new(Semaphore::new(svc.cfg.logs.fanout as usize));
	let results = join_all(jobs.iter().map(|job| {
		let semaphore = semaphore.clone();
		let filter = build_log_filter(&job.pattern, now, job.window_hours);

		async move {
			let _permit = semaphore.acquire().await;

			svc.providers
				.logs
				.query_entries(&svc.cfg.providers.log_store, &filter, job.max_results)
				.await
		}
	}))
	.await;
	let provider_id = svc.cfg.providers.log_store.provider_id.as_str();
	let mut searches_performed = 0;
	let mut contexts = Vec::new();
	let mut seen = std::collections::HashSet::new();

	for (job, result) in jobs.iter().zip(results) {
		match result {
			Ok(entries) => {
				searches_performed += 1;

				for entry in entries {
					let context = log_context(&entry, job, now, provider_id);

					if seen.insert(content_hash(&context.content)) {
						contexts.push(context);
					}
				}
			},
			Err(err) => {
				tracing::warn!(pattern = %job.pattern, error = %err, "Log search failed.");
				warnings.push(format!("Log search '{}' failed: {err}", job.pattern));
			},
		}
	}

	let contexts = topk(contexts, input.k as usize);
	let mut outcome = StrategyOutcome::empty("LogSearch", "log_search");

	outcome.metadata.insert("search_strategy".to_string(), json!(plan.strategy));
	outcome.metadata.insert("searches_planned".to_string(), json!(jobs.len()));
	outcome.metadata.insert("searches_performed".to_string(), json!(searches_performed));
	outcome
		.metadata
		.insert("production_incident".to_string(), json!(input.production_incident));
	outcome.contexts = contexts;
	outcome.warnings = warnings;

	Ok(outcome)
}

async fn plan_searches(
	svc: &TriageService,
	input: &StrategyInput<'_>,
) -> (LogPlan, Vec<String>) {
	let mut warnings = Vec::new();
	let catalogue = svc.cfg.logs.exception_catalogue.join(", ");
	let user_message = json!({
		"role": "user",
		"content": format!(
			"Query: \"{}\"\nProduction incident: {}",
			input.query, input.production_incident
		),
	});
	let schema = "{\"strategy\": \
		\"exception_search|production_issue|general_search|time_range_analysis\", \
		\"searches\": [{\"query\": \"...\", \"type\": \"...\", \"window_hours\": 1, \
		\"exception_types\": [\"...\"]}]}";
	let prompts = [
		format!(
			"You are a log analysis planner. Choose a search strategy and one to three log \
			queries for the user's request. Known exception classes: {catalogue}. For production \
			incidents prefer exception searches over recent windows. Respond with a JSON object: \
			{schema}"
		),
		format!(
			"Return ONLY a valid JSON object and nothing else, exactly in the form {schema}. \
			No prose, no code fences."
		),
	];

	for prompt in prompts {
		let messages =
			vec![json!({ "role": "system", "content": prompt }), user_message.clone()];

		match svc.providers.llm.complete_json(&svc.cfg.providers.llm_fast, &messages).await {
			Ok(value) => match parse_log_plan(&value, &svc.cfg.logs, input.production_incident) {
				Ok(plan) => return (plan, warnings),
				Err(err) => warnings.push(format!("Log plan rejected: {err}")),
			},
			Err(err) => warnings.push(format!("Log planner call failed: {err}")),
		}
	}

	warnings.push("Log planner fell back to a heuristic plan.".to_string());

	(fallback_plan(&svc.cfg.logs, input.query, input.production_incident), warnings)
}

fn parse_log_plan(
	value: &Value,
	cfg: &triage_config::LogSearch,
	production_incident: bool,
) -> Result<LogPlan> {
	let strategy = value
		.get("strategy")
		.and_then(Value::as_str)
		.filter(|s| {
			["exception_search", "production_issue", "general_search", "time_range_analysis"]
				.contains(s)
		})
		.ok_or_else(|| crate::Error::Provider {
			message: "Log plan strategy is missing or unknown.".to_string(),
		})?;
	let default_window = default_window_hours(cfg, production_incident);
	let default_max = if production_incident { 30 } else { 50 };
	let searches = value
		.get("searches")
		.and_then(Value::as_array)
		.map(|items| {
			items
				.iter()
				.filter_map(|item| {
					let query = item.get("query").and_then(Value::as_str)?.trim();

					if query.is_empty() {
						return None;
					}

					let search_type = item
						.get("type")
						.and_then(Value::as_str)
						.unwrap_or("general_search")
						.to_string();
					let window_hours = item
						.get("window_hours")
						.and_then(Value::as_i64)
						.filter(|hours| *hours > 0)
						.unwrap_or(default_window);
					let max_results = item
						.get("max_results")
						.and_then(Value::as_u64)
						.map(|max| max as u32)
						.filter(|max| *max > 0)
						.unwrap_or(default_max);
					let exception_types = item
						.get("exception_types")
						.and_then(Value::as_array)
						.map(|types| {
							types
								.iter()
								.filter_map(Value::as_str)
								.map(str::to_string)
								.collect::<Vec<_>>()
						})
						.unwrap_or_default();

					Some(PlannedLogSearch {
						query: query.to_string(),
						search_type,
						window_hours,
						max_results,
						exception_types,
					})
				})
				.take(MAX_PLANNED_SEARCHES)
				.collect::<Vec<_>>()
		})
		.unwrap_or_default();

	Ok(LogPlan { strategy: strategy.to_string(), searches })
}

fn fallback_plan(
	cfg: &triage_config::LogSearch,
	query: &str,
	production_incident: bool,
) -> LogPlan {
	let lowered = query.to_lowercase();
	let has_error_indicators =
		ERROR_INDICATORS.iter().any(|indicator| lowered.contains(indicator));
	let window_hours = default_window_hours(cfg, production_incident);

	if production_incident && has_error_indicators {
		return LogPlan {
			strategy: "exception_search".to_string(),
			searches: vec![
				PlannedLogSearch {
					query: query.to_string(),
					search_type: "exception_search".to_string(),
					window_hours,
					max_results: 30,
					exception_types: Vec::new(),
				},
				PlannedLogSearch {
					query: format!("ERROR {query}"),
					search_type: "production_issue".to_string(),
					window_hours,
					max_results: 20,
					exception_types: Vec::new(),
				},
			],
		};
	}

	LogPlan {
		strategy: "general_search".to_string(),
		searches: vec![PlannedLogSearch {
			query: query.to_string(),
			search_type: "general_search".to_string(),
			window_hours,
			max_results: if production_incident { 30 } else { 50 },
			exception_types: Vec::new(),
		}],
	}
}

fn default_window_hours(cfg: &triage_config::LogSearch, production_incident: bool) -> i64 {
	if production_incident { cfg.incident_window_hours } else { cfg.window_hours }
}

/// Exception searches fan out per exception class; anything else queries the
/// search text directly. Unknown classes fall back to the full catalogue.
fn expand_jobs(svc: &TriageService, plan: &LogPlan) -> Vec<LogJob> {
	let catalogue = &svc.cfg.logs.exception_catalogue;
	let mut jobs = Vec::new();

	for search in &plan.searches {
		if search.search_type == "exception_search" {
			let mut classes: Vec<String> = search
				.exception_types
				.iter()
				.filter(|class| catalogue.iter().any(|known| known.eq_ignore_ascii_case(class)))
				.cloned()
				.collect();

			if classes.is_empty() {
				classes = catalogue.clone();
			}

			for class in classes {
				jobs.push(LogJob {
					pattern: class,
					exact_exception: true,
					window_hours: search.window_hours,
					max_results: search.max_results,
				});
			}
		} else {
			jobs.push(LogJob {
				pattern: search.query.clone(),
				exact_exception: false,
				window_hours: search.window_hours,
				max_results: search.max_results,
			});
		}
	}

	jobs.truncate(svc.cfg.logs.max_searches as usize);

	jobs
}

/// Filter-language form: severity gate, payload pattern, and the window.
fn build_log_filter(pattern: &str, now: OffsetDateTime, window_hours: i64) -> String {
	let start = now - TimeDuration::hours(window_hours);
	let start_text = start.format(&Rfc3339).unwrap_or_default();
	let end_text = now.format(&Rfc3339).unwrap_or_default();
	let escaped = pattern.replace('"', "");

	format!(
		"severity = ERROR AND \"{escaped}\" AND timestamp >= \"{start_text}\" AND \
		timestamp <= \"{end_text}\""
	)
}

fn log_context(
	entry: &LogEntry,
	job: &LogJob,
	now: OffsetDateTime,
	provider_id: &str,
) -> RetrievedContext {
	let excerpt: String = entry.payload.chars().take(EXCERPT_CHARS).collect();
	let specificity = if job.exact_exception { 0.6 } else { 0.35 };
	let recency = recency_fraction(&entry.timestamp, now, job.window_hours);
	let score = clamp_score(specificity + 0.4 * recency);
	let mut context =
		RetrievedContext::new(excerpt.clone(), format!("logs_{provider_id}"), score);

	context.metadata.insert("timestamp".to_string(), json!(entry.timestamp));
	context.metadata.insert("severity".to_string(), json!(entry.severity));
	context.metadata.insert("excerpt".to_string(), json!(excerpt));

	if let Some(service) = entry.service.as_deref() {
		context.metadata.insert("service".to_string(), json!(service));
	}

	context
}

/// Position of the entry inside the search window: 1.0 at the window's end,
/// 0.0 at its start. Unparseable timestamps score the midpoint.
fn recency_fraction(timestamp: &str, now: OffsetDateTime, window_hours: i64) -> f32 {
	let Ok(ts) = OffsetDateTime::parse(timestamp, &Rfc3339) else {
		return 0.5;
	};
	let window = TimeDuration::hours(window_hours);

	if window.is_zero() {
		return 1.0;
	}

	let start = now - window;
	let elapsed = ts - start;
	let fraction = elapsed.whole_seconds() as f32 / window.whole_seconds() as f32;

	fraction.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn log_cfg() -> triage_config::LogSearch {
		triage_config::LogSearch::default()
	}

	#[test]
	fn strict_plan_parsing_applies_incident_defaults() {
		let value = json!({
			"strategy": "exception_search",
			"searches": [
				{ "query": "certificate errors", "type": "exception_search",
					"exception_types": ["CertificateExpiredException"] },
				{ "query": "" }
			]
		});
		let plan = parse_log_plan(&value, &log_cfg(), true).expect("valid plan rejected");

		assert_eq!(plan.searches.len(), 1);
		assert_eq!(plan.searches[0].window_hours, 72);
		assert_eq!(plan.searches[0].max_results, 30);

		let plan = parse_log_plan(&value, &log_cfg(), false).expect("valid plan rejected");

		assert_eq!(plan.searches[0].window_hours, 1);
		assert_eq!(plan.searches[0].max_results, 50);
	}

	#[test]
	fn unknown_strategy_is_rejected() {
		assert!(parse_log_plan(&json!({ "strategy": "grep_everything" }), &log_cfg(), false).is_err());
	}

	#[test]
	fn fallback_plan_tracks_error_indicators() {
		let incident = fallback_plan(&log_cfg(), "payment service timeout", true);

		assert_eq!(incident.strategy, "exception_search");
		assert_eq!(incident.searches.len(), 2);
		assert_eq!(incident.searches[0].window_hours, 72);

		let calm = fallback_plan(&log_cfg(), "deployment history", false);

		assert_eq!(calm.strategy, "general_search");
		assert_eq!(calm.searches[0].window_hours, 1);
	}

	#[test]
	fn filter_carries_severity_pattern_and_window() {
		let now = OffsetDateTime::parse("2025-05-01T12:00:00Z", &Rfc3339).expect("valid timestamp");
		let filter = build_log_filter("DiskSpaceExceededException", now, 1);

		assert!(filter.starts_with("severity = ERROR AND \"DiskSpaceExceededException\""));
		assert!(filter.contains("timestamp >= \"2025-05-01T11:00:00Z\""));
		assert!(filter.contains("timestamp <= \"2025-05-01T12:00:00Z\""));
	}

	#[test]
	fn exact_exception_matches_outscore_generic_patterns() {
		let now = OffsetDateTime::parse("2025-05-01T12:00:00Z", &Rfc3339).expect("valid timestamp");
		let entry = LogEntry {
			timestamp: "2025-05-01T11:59:00Z".to_string(),
			severity: "ERROR".to_string(),
			service: Some("checkout".to_string()),
			payload: "CertificateExpiredException: expired".to_string(),
		};
		let exact_job = LogJob {
			pattern: "CertificateExpiredException".to_string(),
			exact_exception: true,
			window_hours: 1,
			max_results: 10,
		};
		let generic_job = LogJob {
			pattern: "certificate".to_string(),
			exact_exception: false,
			window_hours: 1,
			max_results: 10,
		};
		let exact = log_context(&entry, &exact_job, now, "gcp");
		let generic = log_context(&entry, &generic_job, now, "gcp");

		assert_eq!(exact.source, "logs_gcp");
		assert!(exact.score > generic.score);
		assert_eq!(exact.metadata_str("service"), Some("checkout"));
	}

	#[test]
	fn stale_entries_score_below_fresh_ones() {
		let now = OffsetDateTime::parse("2025-05-01T12:00:00Z", &Rfc3339).expect("valid timestamp");

		assert!(recency_fraction("2025-05-01T11:59:00Z", now, 1) > 0.9);
		assert!(recency_fraction("2025-05-01T11:01:00Z", now, 1) < 0.1);
		assert_eq!(recency_fraction("not a timestamp", now, 1), 0.5);
	}
}
