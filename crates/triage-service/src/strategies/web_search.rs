use std::{collections::HashSet, sync::Arc};

use futures::future::join_all;
use serde_json::{Value, json};
use tokio::sync::Semaphore;

use super::{StrategyInput, StrategyOutcome};
use crate::{Result, TriageService};
use triage_domain::{RetrievedContext, clamp_score, topk};
use triage_providers::websearch::WebHit;

const RESULTS_PER_SEARCH: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct WebPlan {
	pub classification: String,
	pub priority: String,
	pub searches: Vec<String>,
}
impl WebPlan {
	fn fallback(query: &str) -> Self {
		Self {
			classification: "general".to_string(),
			priority: "normal".to_string(),
			searches: vec![query.to_string()],
		}
	}
}

/// Planner phase picks refined search strings; execution fans them out to the
/// provider under the configured parallelism bound. Individual searches may
/// fail without failing the strategy, and an empty list is a valid outcome.
pub(super) async fn run(
	svc: &TriageService,
	input: &StrategyInput<'_>,
) -> Result<StrategyOutcome> {
	let (plan, mut warnings) = plan_searches(svc, input).await;
	let semaphore = Arc::new(Semaphore::new(svc.cfg.web.fanout as usize));
	let results = join_all(plan.searches.iter().map(|search| {
		let semaphore = semaphore.clone();

		async move {
			let _permit = semaphore.acquire().await;

			svc.providers
				.web
				.search(&svc.cfg.providers.web_search, search, RESULTS_PER_SEARCH)
				.await
		}
	}))
	.await;
	let provider_id = svc.cfg.providers.web_search.provider_id.as_str();
	let mut searches_performed = 0;
	let mut contexts = Vec::new();
	let mut seen_urls = HashSet::new();

	for (search, result) in plan.searches.iter().zip(results) {
		match result {
			Ok(hits) => {
				searches_performed += 1;

				let count = hits.len();

				for (rank, hit) in hits.into_iter().enumerate() {
					if !seen_urls.insert(hit.url.clone()) {
						continue;
					}

					contexts.push(web_context(&hit, rank, count, provider_id));
				}
			},
			Err(err) => {
				tracing::warn!(search = %search, error = %err, "Web search failed.");
				warnings.push(format!("Search '{search}' failed: {err}"));
			},
		}
	}

	let contexts = topk(contexts, input.k as usize);
	let mut outcome = StrategyOutcome::empty("WebSearch", "web_search");

	outcome.metadata.insert("classification".to_string(), json!(plan.classification));
	outcome.metadata.insert("priority".to_string(), json!(plan.priority));
	outcome.metadata.insert("searches_planned".to_string(), json!(plan.searches.len()));
	outcome.metadata.insert("searches_performed".to_string(), json!(searches_performed));
	outcome.metadata.insert("max_searches".to_string(), json!(svc.cfg.web.max_searches));
	outcome.contexts = contexts;
	outcome.warnings = warnings;

	Ok(outcome)
}

/// One strict retry on a malformed plan, then the documented default plan.
async fn plan_searches(
	svc: &TriageService,
	input: &StrategyInput<'_>,
) -> (WebPlan, Vec<String>) {
	let mut warnings = Vec::new();
	let max_searches = svc.cfg.web.max_searches as usize;
	let user_message = json!({
		"role": "user",
		"content": format!(
			"Query: \"{}\"\nProduction incident: {}\nUser can wait: {}\nMax searches: {}",
			input.query, input.production_incident, input.user_can_wait, max_searches
		),
	});
	let prompts = [
		"Plan web searches for the query. Classify it and propose refined search strings. \
			For production incidents prioritize status pages and known-issue trackers. Respond \
			with a JSON object: {\"classification\": \"status_check|troubleshooting|general\", \
			\"priority\": \"urgent|normal\", \"searches\": [\"...\"]}.",
		"Return ONLY a valid JSON object and nothing else, exactly in the form \
			{\"classification\": \"status_check|troubleshooting|general\", \
			\"priority\": \"urgent|normal\", \"searches\": [\"...\"]}. No prose, no code fences.",
	];

	for prompt in prompts {
		let messages =
			vec![json!({ "role": "system", "content": prompt }), user_message.clone()];

		match svc.providers.llm.complete_json(&svc.cfg.providers.llm_strong, &messages).await {
			Ok(value) => match parse_web_plan(&value, max_searches) {
				Ok(plan) => return (plan, warnings),
				Err(err) => warnings.push(format!("Web plan rejected: {err}")),
			},
			Err(err) => warnings.push(format!("Web planner call failed: {err}")),
		}
	}

	warnings.push("Web planner fell back to the plain query.".to_string());

	(WebPlan::fallback(input.query), warnings)
}

fn parse_web_plan(value: &Value, max_searches: usize) -> Result<WebPlan> {
	let classification = value
		.get("classification")
		.and_then(Value::as_str)
		.filter(|c| ["status_check", "troubleshooting", "general"].contains(c))
		.ok_or_else(|| crate::Error::Provider {
			message: "Web plan classification is missing or unknown.".to_string(),
		})?;
	let priority = value
		.get("priority")
		.and_then(Value::as_str)
		.filter(|p| ["urgent", "normal"].contains(p))
		.ok_or_else(|| crate::Error::Provider {
			message: "Web plan priority is missing or unknown.".to_string(),
		})?;
	let searches: Vec<String> = value
		.get("searches")
		.and_then(Value::as_array)
		.map(|items| {
			items
				.iter()
				.filter_map(Value::as_str)
				.map(str::trim)
				.filter(|s| !s.is_empty())
				.take(max_searches)
				.map(str::to_string)
				.collect()
		})
		.unwrap_or_default();

	if searches.is_empty() {
		return Err(crate::Error::Provider {
			message: "Web plan contains no searches.".to_string(),
		});
	}

	Ok(WebPlan {
		classification: classification.to_string(),
		priority: priority.to_string(),
		searches,
	})
}

fn web_context(hit: &WebHit, rank: usize, result_count: usize, provider_id: &str) -> RetrievedContext {
	let mut content = format!("Title: {}\n\nContent: {}", hit.title, hit.snippet);

	if !hit.url.is_empty() {
		content.push_str(&format!("\n\nURL: {}", hit.url));
	}

	let score = match hit.score {
		Some(score) => clamp_score(score),
		None => clamp_score(1.0 - rank as f32 / result_count.max(1) as f32),
	};
	let mut context = RetrievedContext::new(content, format!("web_{provider_id}"), score);

	context.metadata.insert("url".to_string(), json!(hit.url));
	context.metadata.insert("title".to_string(), json!(hit.title));

	if let Some(timestamp) = hit.timestamp.as_deref() {
		context.metadata.insert("timestamp".to_string(), json!(timestamp));
	}

	context
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strict_plan_parsing_rejects_malformed_objects() {
		let valid = json!({
			"classification": "status_check",
			"priority": "urgent",
			"searches": ["github status page", "is github down", ""]
		});
		let plan = parse_web_plan(&valid, 5).expect("valid plan rejected");

		assert_eq!(plan.searches, vec!["github status page".to_string(), "is github down".to_string()]);

		assert!(parse_web_plan(&json!({ "classification": "weird" }), 5).is_err());
		assert!(
			parse_web_plan(
				&json!({ "classification": "general", "priority": "normal", "searches": [] }),
				5
			)
			.is_err()
		);
	}

	#[test]
	fn plan_caps_searches_at_the_configured_maximum() {
		let value = json!({
			"classification": "general",
			"priority": "normal",
			"searches": ["a", "b", "c", "d"]
		});
		let plan = parse_web_plan(&value, 2).expect("valid plan rejected");

		assert_eq!(plan.searches.len(), 2);
	}

	#[test]
	fn unranked_hits_score_by_position() {
		let hit = WebHit {
			title: "Status".to_string(),
			url: "https://example.com".to_string(),
			snippet: "snippet".to_string(),
			score: None,
			timestamp: None,
		};
		let first = web_context(&hit, 0, 3, "tavily");
		let last = web_context(&hit, 2, 3, "tavily");

		assert_eq!(first.source, "web_tavily");
		assert!(first.score > last.score);
		assert!(first.content.contains("URL: https://example.com"));
	}
}
