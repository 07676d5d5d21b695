use proptest::prelude::*;
use proptest::strategy::Strategy as _;

use triage_domain::{
	RetrievedContext, Strategy, content_hash, fuse, normalize_keyword_scores, route, topk,
};

fn arb_content() -> impl proptest::strategy::Strategy<Value = String> {
	"[a-zA-Z0-9 ]{1,40}"
}

fn arb_context() -> impl proptest::strategy::Strategy<Value = RetrievedContext> {
	(arb_content(), -0.5_f32..1.5_f32)
		.prop_map(|(content, score)| RetrievedContext::new(content, "vector_bugs", score))
}

fn arb_lists() -> impl proptest::strategy::Strategy<Value = Vec<Vec<RetrievedContext>>> {
	prop::collection::vec(prop::collection::vec(arb_context(), 0..8), 1..4)
}

fn equal_weights(n: usize) -> Vec<f32> {
	vec![1.0 / n as f32; n]
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(200))]

	#[test]
	fn fused_scores_stay_in_the_unit_interval(lists in arb_lists()) {
		let weights = equal_weights(lists.len());
		let fused = fuse(&lists, &weights);

		for context in &fused {
			prop_assert!(context.score.is_finite());
			prop_assert!((0.0..=1.0).contains(&context.score));
		}
	}

	#[test]
	fn fusion_is_invariant_to_list_permutation(lists in arb_lists()) {
		let weights = equal_weights(lists.len());
		let forward = fuse(&lists, &weights);
		let mut reversed = lists.clone();

		reversed.reverse();

		let backward = fuse(&reversed, &weights);
		let forward_view: Vec<(String, f32)> =
			forward.iter().map(|c| (content_hash(&c.content), c.score)).collect();
		let backward_view: Vec<(String, f32)> =
			backward.iter().map(|c| (content_hash(&c.content), c.score)).collect();

		prop_assert_eq!(forward_view, backward_view);
	}

	#[test]
	fn keyword_normalization_never_produces_non_finite_scores(
		mut hits in prop::collection::vec(arb_context(), 0..10),
	) {
		normalize_keyword_scores(&mut hits);

		for hit in &hits {
			prop_assert!(hit.score.is_finite());
			prop_assert!((0.0..=1.0).contains(&hit.score));
		}
	}

	#[test]
	fn topk_with_large_k_preserves_order(contexts in prop::collection::vec(arb_context(), 0..10)) {
		let sorted = topk(contexts.clone(), contexts.len());
		let again = topk(sorted.clone(), contexts.len() + 5);

		prop_assert_eq!(sorted, again);
	}

	#[test]
	fn content_hash_ignores_case_and_whitespace(content in arb_content()) {
		let spaced = content.split_whitespace().collect::<Vec<_>>().join("   ");

		prop_assert_eq!(content_hash(&content), content_hash(&content.to_uppercase()));
		prop_assert_eq!(content_hash(&content), content_hash(&format!("  {spaced}\t")));
	}

	#[test]
	fn routing_is_deterministic(
		query in "[a-zA-Z0-9 ]{0,60}",
		user_can_wait in any::<bool>(),
		production_incident in any::<bool>(),
	) {
		let first = route(&query, user_can_wait, production_incident);
		let second = route(&query, user_can_wait, production_incident);

		prop_assert_eq!(first, second);
	}

	#[test]
	fn lone_identifier_routes_to_keyword_search(
		prefix in "[A-Z]{2,6}",
		number in 1_u32..100_000,
		user_can_wait in any::<bool>(),
		production_incident in any::<bool>(),
	) {
		// Outage vocabulary outranks the identifier rule, and the log rule can
		// fire on error vocabulary under an incident; keep the prefix neutral.
		let reserved = [
			"DOWN", "OUTAGE", "STATUS", "LATEST", "CURRENT", "LOG", "LOGS", "EXCEPTION",
			"EXCEPTIONS", "STACKTRACE", "ERROR", "ERRORS", "FAILED", "FAILURE", "TIMEOUT",
		];

		prop_assume!(!reserved.contains(&prefix.as_str()));

		let query = format!("investigate {prefix}-{number} regression");
		let plan = route(&query, user_can_wait, production_incident);

		prop_assert_eq!(plan.strategy, Strategy::Bm25);
	}
}

#[test]
fn fusion_is_idempotent_for_identical_inputs() {
	let lists = vec![
		vec![
			RetrievedContext::new("login timeout on pool exhaustion", "vector_bugs", 0.9),
			RetrievedContext::new("certificate rotation failed", "vector_bugs", 0.6),
		],
		vec![RetrievedContext::new("Login Timeout on Pool Exhaustion", "keyword_bugs", 0.8)],
	];
	let weights = [0.5, 0.5];
	let first = fuse(&lists, &weights);
	let second = fuse(&lists, &weights);

	assert_eq!(first, second);
}

#[test]
fn empty_inputs_produce_empty_outputs() {
	assert!(fuse(&[], &[]).is_empty());
	assert!(fuse(&[Vec::new(), Vec::new()], &[0.5, 0.5]).is_empty());
	assert!(topk(Vec::new(), 10).is_empty());
}
