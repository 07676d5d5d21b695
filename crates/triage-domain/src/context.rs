use std::{cmp::Ordering, collections::HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// A single unit of retrieved evidence: content, a tag naming the producing
/// strategy and collection, free-form metadata, and a relevance score.
///
/// Scores are comparable only within a single strategy invocation until
/// [`fuse`] renormalizes them onto `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
	pub content: String,
	pub metadata: Map<String, Value>,
	pub source: String,
	pub score: f32,
}
impl RetrievedContext {
	pub fn new(content: impl Into<String>, source: impl Into<String>, score: f32) -> Self {
		Self {
			content: content.into(),
			metadata: Map::new(),
			source: source.into(),
			score: clamp_score(score),
		}
	}

	pub fn metadata_str(&self, key: &str) -> Option<&str> {
		self.metadata.get(key).and_then(Value::as_str)
	}
}

/// Dedup key for fusion: SHA-256 of the lowercased, whitespace-collapsed
/// content, rendered as hex.
pub fn content_hash(content: &str) -> String {
	let lowered = content.to_lowercase();
	let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
	let digest = Sha256::digest(collapsed.as_bytes());
	let mut out = String::with_capacity(digest.len() * 2);

	for byte in digest {
		out.push_str(&format!("{byte:02x}"));
	}

	out
}

pub fn clamp_score(score: f32) -> f32 {
	if !score.is_finite() {
		return 0.0;
	}

	score.clamp(0.0, 1.0)
}

/// Vector hits score as `1 - cosine_distance`, clamped to `[0, 1]`.
pub fn vector_similarity_score(cosine_distance: f32) -> f32 {
	clamp_score(1.0 - cosine_distance)
}

/// Keyword hits carry the store's raw rank; rescale by the maximum rank
/// within the batch. A batch whose maximum is zero scores uniformly zero.
pub fn normalize_keyword_scores(hits: &mut [RetrievedContext]) {
	for hit in hits.iter_mut() {
		if !hit.score.is_finite() {
			hit.score = 0.0;
		}
	}

	let max = hits.iter().map(|hit| hit.score).fold(0.0_f32, f32::max);

	if max <= 0.0 {
		for hit in hits.iter_mut() {
			hit.score = 0.0;
		}

		return;
	}

	for hit in hits.iter_mut() {
		hit.score = clamp_score(hit.score / max);
	}
}

#[derive(Debug)]
struct FusedEntry {
	context: RetrievedContext,
	fused_score: f32,
	raw_max: f32,
	best_rank: usize,
}

/// Weighted fusion of parallel result lists into one ranked list.
///
/// For each distinct content hash the fused score is the weight-scaled sum of
/// that hash's best score per list; lists without the hash contribute zero.
/// Ties break by higher raw maximum, then earliest rank, then hash, so the
/// output is invariant to the order of the input lists.
pub fn fuse(lists: &[Vec<RetrievedContext>], weights: &[f32]) -> Vec<RetrievedContext> {
	let mut entries: HashMap<String, FusedEntry> = HashMap::new();

	for (list, weight) in lists.iter().zip(weights.iter().copied()) {
		let mut best_in_list: HashMap<String, f32> = HashMap::new();

		for (rank, context) in list.iter().enumerate() {
			let hash = content_hash(&context.content);
			let score = clamp_score(context.score);
			let entry = entries.entry(hash.clone()).or_insert_with(|| FusedEntry {
				context: context.clone(),
				fused_score: 0.0,
				raw_max: score,
				best_rank: rank,
			});

			if score > entry.raw_max
				|| (score == entry.raw_max
					&& (rank < entry.best_rank
						|| (rank == entry.best_rank && context.source < entry.context.source)))
			{
				entry.context = context.clone();
			}

			entry.raw_max = entry.raw_max.max(score);
			entry.best_rank = entry.best_rank.min(rank);

			let best = best_in_list.entry(hash).or_insert(score);

			*best = best.max(score);
		}

		for (hash, score) in best_in_list {
			if let Some(entry) = entries.get_mut(&hash) {
				entry.fused_score += weight.max(0.0) * score;
			}
		}
	}

	let mut fused: Vec<(String, FusedEntry)> = entries.into_iter().collect();

	fused.sort_by(|(left_hash, left), (right_hash, right)| {
		cmp_score_desc(left.fused_score, right.fused_score)
			.then_with(|| cmp_score_desc(left.raw_max, right.raw_max))
			.then_with(|| left.best_rank.cmp(&right.best_rank))
			.then_with(|| left_hash.cmp(right_hash))
	});

	fused
		.into_iter()
		.map(|(_, entry)| {
			let mut context = entry.context;

			context.score = clamp_score(entry.fused_score);

			context
		})
		.collect()
}

/// Stable top-k selection: the k highest-scoring entries, preserving input
/// order among equal scores.
pub fn topk(mut list: Vec<RetrievedContext>, k: usize) -> Vec<RetrievedContext> {
	list.sort_by(|left, right| cmp_score_desc(left.score, right.score));
	list.truncate(k);

	list
}

pub fn cmp_score_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ctx(content: &str, source: &str, score: f32) -> RetrievedContext {
		RetrievedContext::new(content, source, score)
	}

	#[test]
	fn content_hash_collapses_whitespace_and_case() {
		assert_eq!(content_hash("Login  Timeout"), content_hash("login timeout"));
		assert_eq!(content_hash(" login\ttimeout \n"), content_hash("login timeout"));
		assert_ne!(content_hash("login timeout"), content_hash("login timeouts"));
	}

	#[test]
	fn keyword_normalization_rescales_by_batch_max() {
		let mut hits =
			vec![ctx("a", "keyword_bugs", 0.4), ctx("b", "keyword_bugs", 0.2), ctx("c", "keyword_bugs", 0.0)];

		normalize_keyword_scores(&mut hits);

		assert_eq!(hits[0].score, 1.0);
		assert_eq!(hits[1].score, 0.5);
		assert_eq!(hits[2].score, 0.0);
	}

	#[test]
	fn keyword_normalization_zeroes_a_zero_batch() {
		let mut hits = vec![ctx("a", "keyword_bugs", 0.0), ctx("b", "keyword_bugs", 0.0)];

		normalize_keyword_scores(&mut hits);

		assert!(hits.iter().all(|hit| hit.score == 0.0));
	}

	#[test]
	fn fuse_sums_weighted_scores_per_hash() {
		let vector = vec![ctx("shared finding", "vector_bugs", 1.0), ctx("vector only", "vector_bugs", 0.5)];
		let keyword = vec![ctx("Shared  Finding", "keyword_bugs", 0.5)];
		let fused = fuse(&[vector, keyword], &[0.7, 0.3]);

		assert_eq!(fused.len(), 2);
		assert_eq!(fused[0].content, "shared finding");
		assert!((fused[0].score - 0.85).abs() < 1e-6);
		assert!((fused[1].score - 0.35).abs() < 1e-6);
	}

	#[test]
	fn fuse_is_invariant_to_list_order() {
		let a = vec![ctx("one", "vector_bugs", 0.9), ctx("two", "vector_bugs", 0.4)];
		let b = vec![ctx("two", "keyword_bugs", 0.8), ctx("three", "keyword_bugs", 0.6)];
		let forward = fuse(&[a.clone(), b.clone()], &[0.5, 0.5]);
		let reverse = fuse(&[b, a], &[0.5, 0.5]);

		let forward_view: Vec<(String, f32)> =
			forward.iter().map(|c| (content_hash(&c.content), c.score)).collect();
		let reverse_view: Vec<(String, f32)> =
			reverse.iter().map(|c| (content_hash(&c.content), c.score)).collect();

		assert_eq!(forward_view, reverse_view);
	}

	#[test]
	fn topk_preserves_order_among_equal_scores() {
		let list = vec![
			ctx("first", "s", 0.5),
			ctx("second", "s", 0.5),
			ctx("third", "s", 0.9),
			ctx("fourth", "s", 0.5),
		];
		let top = topk(list, 3);

		assert_eq!(top[0].content, "third");
		assert_eq!(top[1].content, "first");
		assert_eq!(top[2].content, "second");
	}

	#[test]
	fn scores_never_leave_the_unit_interval() {
		assert_eq!(clamp_score(f32::NAN), 0.0);
		assert_eq!(clamp_score(f32::INFINITY), 0.0);
		assert_eq!(clamp_score(2.0), 1.0);
		assert_eq!(vector_similarity_score(1.8), 0.0);
		assert_eq!(vector_similarity_score(0.25), 0.75);
	}
}
