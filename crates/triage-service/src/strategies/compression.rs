use serde_json::json;

use super::{StrategyInput, StrategyOutcome, vector_across_collections};
use crate::{Error, Result, TriageService};
use triage_domain::{clamp_score, cmp_score_desc, fuse, topk};

/// Semantic search across both collections with an optional rerank pass.
/// Urgent requests narrow to the smaller configured k; a degraded pass (the
/// orchestrator's fallback) skips the reranker outright.
pub(super) async fn run(
	svc: &TriageService,
	input: &StrategyInput<'_>,
	degraded: bool,
) -> Result<StrategyOutcome> {
	let k =
		if input.production_incident { svc.cfg.retrieval.urgent_top_k } else { input.k };
	let results =
		vector_across_collections(svc, input.query, k.saturating_mul(2), "compression").await;

	if results.all_failed() {
		svc.metrics.record_strategy_failure();

		return Err(Error::StrategyFailed {
			strategy: "Compression",
			message: results.warnings.join(" "),
		});
	}

	let mut warnings = results.warnings;
	let mut merged = fuse(&results.lists, &[0.5, 0.5]);
	let mut reranker_used = false;

	if !degraded && svc.cfg.retrieval.reranker_enabled && !merged.is_empty() {
		let docs: Vec<String> = merged.iter().map(|context| context.content.clone()).collect();

		match svc.providers.rerank.rerank(&svc.cfg.providers.rerank, input.query, &docs).await {
			Ok(scores) => {
				// The rerank score replaces the vector score.
				for (context, score) in merged.iter_mut().zip(scores) {
					context.score = clamp_score(score);
				}

				merged.sort_by(|left, right| cmp_score_desc(left.score, right.score));

				reranker_used = true;
			},
			Err(err) => {
				tracing::warn!(error = %err, "Reranker unavailable; keeping raw vector scores.");
				warnings.push(format!("Reranker unavailable: {err}"));
				svc.metrics.record_degraded();
			},
		}
	}

	let contexts = topk(merged, k as usize);
	let mut outcome = StrategyOutcome::empty("Compression", "contextual_compression");

	outcome.metadata.insert("reranker_used".to_string(), json!(reranker_used));
	outcome.metadata.insert("is_urgent".to_string(), json!(input.production_incident));
	outcome.metadata.insert("degraded".to_string(), json!(degraded));
	outcome.contexts = contexts;
	outcome.warnings = warnings;

	Ok(outcome)
}
