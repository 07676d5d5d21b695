use futures::future::join_all;
use serde_json::{Value, json};

use super::{StrategyInput, StrategyOutcome, keyword_across_collections, vector_across_collections};
use crate::{Error, Result, TriageService};
use triage_domain::{RetrievedContext, fuse, topk};

const MAX_PARAPHRASES: usize = 3;
const SUB_WEIGHT: f32 = 0.25;

struct SubResult {
	contexts: Vec<RetrievedContext>,
	warnings: Vec<String>,
}

/// The comprehensive path: multi-query expansion, contextual compression,
/// keyword, and naive vector retrieval run concurrently with equal weight.
/// A failed sub-retrieval contributes an empty list; only all four failing
/// fails the strategy.
pub(super) async fn run(
	svc: &TriageService,
	input: &StrategyInput<'_>,
) -> Result<StrategyOutcome> {
	let (multi_query, compression, keyword, naive) = tokio::join!(
		multi_query_sub(svc, input),
		compression_sub(svc, input),
		keyword_sub(svc, input),
		naive_sub(svc, input),
	);
	let subs = [
		("multi_query", multi_query),
		("compression", compression),
		("keyword", keyword),
		("naive", naive),
	];
	let mut lists = Vec::with_capacity(subs.len());
	let mut methods_used = Vec::new();
	let mut warnings = Vec::new();
	let mut failures = 0;

	for (name, result) in subs {
		match result {
			Ok(sub) => {
				methods_used.push(name);
				warnings.extend(sub.warnings);
				lists.push(sub.contexts);
			},
			Err(err) => {
				tracing::warn!(sub_retrieval = name, error = %err, "Ensemble sub-retrieval failed.");
				warnings.push(format!("{name} sub-retrieval failed: {err}"));
				failures += 1;

				lists.push(Vec::new());
			},
		}
	}

	if failures == lists.len() {
		svc.metrics.record_strategy_failure();

		return Err(Error::StrategyFailed {
			strategy: "Ensemble",
			message: warnings.join(" "),
		});
	}

	let fused = fuse(&lists, &[SUB_WEIGHT; 4]);
	let mut contexts = topk(fused, input.k as usize);

	// The fused list belongs to the ensemble; keep the collection suffix from
	// whichever sub-retrieval supplied the representative.
	for context in &mut contexts {
		if let Some(collection) = context.source.rsplit('_').next() {
			context.source = format!("ensemble_{collection}");
		}
	}

	let primary_source =
		contexts.first().map(|context| context.source.clone()).unwrap_or_else(|| "none".to_string());
	let mut outcome = StrategyOutcome::empty("Ensemble", "multi_method_ensemble");

	outcome.metadata.insert("methods_used".to_string(), json!(methods_used));
	outcome.metadata.insert("primary_source".to_string(), json!(primary_source));
	outcome.contexts = contexts;
	outcome.warnings = warnings;

	Ok(outcome)
}

/// Ask the fast model for paraphrases, then vector-search the original and
/// each paraphrase, unioning the hits. A paraphrase failure degrades to the
/// original query alone.
async fn multi_query_sub(svc: &TriageService, input: &StrategyInput<'_>) -> Result<SubResult> {
	let mut warnings = Vec::new();
	let mut queries = vec![input.query.to_string()];

	match expand_query(svc, input.query).await {
		Ok(paraphrases) => queries.extend(paraphrases),
		Err(err) => {
			warnings.push(format!("Query expansion failed: {err}"));
		},
	}

	let searches = join_all(
		queries
			.iter()
			.map(|query| vector_across_collections(svc, query, input.k, "multi_query")),
	)
	.await;
	let mut contexts = Vec::new();
	let mut failures = 0;

	for results in &searches {
		if results.all_failed() {
			failures += 1;
		}

		for list in &results.lists {
			contexts.extend(list.iter().cloned());
		}
	}

	if failures == searches.len() {
		return Err(Error::StrategyFailed {
			strategy: "Ensemble",
			message: "Every expanded vector search failed.".to_string(),
		});
	}

	Ok(SubResult { contexts, warnings })
}

async fn expand_query(svc: &TriageService, query: &str) -> Result<Vec<String>> {
	let messages = vec![
		json!({
			"role": "system",
			"content": "Produce alternative phrasings of the user's search query that could \
				surface different relevant tickets. Respond with ONLY a JSON object: \
				{\"queries\": [\"...\"]} containing at most three rephrasings.",
		}),
		json!({ "role": "user", "content": query }),
	];
	let value = svc.providers.llm.complete_json(&svc.cfg.providers.llm_fast, &messages).await?;
	let queries = value
		.get("queries")
		.and_then(Value::as_array)
		.map(|items| {
			items
				.iter()
				.filter_map(Value::as_str)
				.map(str::trim)
				.filter(|s| !s.is_empty())
				.take(MAX_PARAPHRASES)
				.map(str::to_string)
				.collect::<Vec<_>>()
		})
		.unwrap_or_default();

	Ok(queries)
}

async fn compression_sub(svc: &TriageService, input: &StrategyInput<'_>) -> Result<SubResult> {
	let outcome = svc.run_compression(input, false).await?;

	Ok(SubResult { contexts: outcome.contexts, warnings: outcome.warnings })
}

async fn keyword_sub(svc: &TriageService, input: &StrategyInput<'_>) -> Result<SubResult> {
	let results = keyword_across_collections(svc, input.query, input.k, "keyword").await;

	if results.all_failed() {
		return Err(Error::StrategyFailed {
			strategy: "Ensemble",
			message: results.warnings.join(" "),
		});
	}

	Ok(SubResult { contexts: results.lists.into_iter().flatten().collect(), warnings: results.warnings })
}

async fn naive_sub(svc: &TriageService, input: &StrategyInput<'_>) -> Result<SubResult> {
	let results = vector_across_collections(svc, input.query, input.k, "naive").await;

	if results.all_failed() {
		return Err(Error::StrategyFailed {
			strategy: "Ensemble",
			message: results.warnings.join(" "),
		});
	}

	let fused = fuse(&results.lists, &[0.5, 0.5]);

	Ok(SubResult { contexts: topk(fused, input.k as usize), warnings: results.warnings })
}
