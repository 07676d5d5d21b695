mod bm25;
mod compression;
mod ensemble;
mod log_search;
mod web_search;

use serde_json::Map;

use crate::{Result, TriageService};
use triage_domain::{RetrievedContext, Strategy};
use triage_storage::models::{Collection, TicketFilters};

/// Read-only view of a request handed to a strategy.
#[derive(Clone, Copy, Debug)]
pub struct StrategyInput<'a> {
	pub query: &'a str,
	pub user_can_wait: bool,
	pub production_incident: bool,
	pub k: u32,
}

/// What a strategy hands back to the orchestrator: a freshly allocated
/// context list plus per-strategy metadata and degradation warnings.
#[derive(Clone, Debug)]
pub struct StrategyOutcome {
	pub contexts: Vec<RetrievedContext>,
	pub method: String,
	pub method_type: &'static str,
	pub metadata: Map<String, serde_json::Value>,
	pub warnings: Vec<String>,
}
impl StrategyOutcome {
	pub fn empty(method: impl Into<String>, method_type: &'static str) -> Self {
		Self {
			contexts: Vec::new(),
			method: method.into(),
			method_type,
			metadata: Map::new(),
			warnings: Vec::new(),
		}
	}
}

impl TriageService {
	pub async fn run_strategy(
		&self,
		strategy: Strategy,
		input: &StrategyInput<'_>,
	) -> Result<StrategyOutcome> {
		match strategy {
			Strategy::Bm25 => bm25::run(self, input).await,
			Strategy::Compression => self.run_compression(input, false).await,
			Strategy::Ensemble => ensemble::run(self, input).await,
			Strategy::WebSearch => web_search::run(self, input).await,
			Strategy::LogSearch => log_search::run(self, input).await,
		}
	}

	/// Contextual compression, reachable directly so the orchestrator's
	/// fallback can force a degraded no-rerank pass.
	pub async fn run_compression(
		&self,
		input: &StrategyInput<'_>,
		degraded: bool,
	) -> Result<StrategyOutcome> {
		compression::run(self, input, degraded).await
	}
}

/// Per-collection result lists from one operation fanned out across both
/// collections, with warnings for the collections that failed.
pub(crate) struct CollectionResults {
	pub lists: Vec<Vec<RetrievedContext>>,
	pub warnings: Vec<String>,
	pub failures: usize,
}
impl CollectionResults {
	pub fn all_failed(&self) -> bool {
		self.failures == Collection::ALL.len()
	}
}

pub(crate) async fn vector_across_collections(
	svc: &TriageService,
	query: &str,
	k: u32,
	tag: &str,
) -> CollectionResults {
	let filters = TicketFilters::default();
	let threshold = svc.cfg.retrieval.similarity_threshold;
	let (bugs, releases) = tokio::join!(
		svc.store.vector_search(Collection::Bugs, query, k, threshold, &filters),
		svc.store.vector_search(Collection::Releases, query, k, threshold, &filters),
	);

	collect_collection_results([bugs, releases], tag)
}

pub(crate) async fn keyword_across_collections(
	svc: &TriageService,
	query: &str,
	k: u32,
	tag: &str,
) -> CollectionResults {
	let filters = TicketFilters::default();
	let (bugs, releases) = tokio::join!(
		svc.store.keyword_search(Collection::Bugs, query, k, &filters),
		svc.store.keyword_search(Collection::Releases, query, k, &filters),
	);

	collect_collection_results([bugs, releases], tag)
}

fn collect_collection_results(
	results: [Result<Vec<RetrievedContext>>; 2],
	tag: &str,
) -> CollectionResults {
	let mut lists = Vec::with_capacity(Collection::ALL.len());
	let mut warnings = Vec::new();
	let mut failures = 0;

	for (collection, result) in Collection::ALL.into_iter().zip(results) {
		match result {
			Ok(mut contexts) => {
				for context in &mut contexts {
					context.source = format!("{tag}_{}", collection.as_str());
				}

				lists.push(contexts);
			},
			Err(err) => {
				tracing::warn!(
					collection = collection.as_str(),
					error = %err,
					"Collection sub-retrieval failed."
				);
				warnings.push(format!(
					"{} search failed for {}: {err}",
					tag,
					collection.as_str()
				));
				failures += 1;

				lists.push(Vec::new());
			},
		}
	}

	CollectionResults { lists, warnings, failures }
}
