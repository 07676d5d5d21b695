use serde_json::json;

use super::{StrategyInput, StrategyOutcome, keyword_across_collections};
use crate::{Error, Result, TriageService};
use triage_domain::{fuse, topk};

/// Keyword search across both collections, fused 50/50.
pub(super) async fn run(
	svc: &TriageService,
	input: &StrategyInput<'_>,
) -> Result<StrategyOutcome> {
	let results = keyword_across_collections(svc, input.query, input.k, "bm25").await;

	if results.all_failed() {
		svc.metrics.record_strategy_failure();

		return Err(Error::StrategyFailed {
			strategy: "BM25",
			message: results.warnings.join(" "),
		});
	}

	let per_collection: Vec<usize> = results.lists.iter().map(Vec::len).collect();
	let fused = fuse(&results.lists, &[0.5, 0.5]);
	let contexts = topk(fused, input.k as usize);
	let mut outcome = StrategyOutcome::empty("BM25", "keyword_based");

	outcome.metadata.insert("bugs_results".to_string(), json!(per_collection[0]));
	outcome.metadata.insert("releases_results".to_string(), json!(per_collection[1]));
	outcome.metadata.insert("keyword_index_used".to_string(), json!(true));
	outcome.contexts = contexts;
	outcome.warnings = results.warnings;

	Ok(outcome)
}
