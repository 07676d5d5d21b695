pub mod metrics;
pub mod store;
pub mod strategies;
pub mod supervisor;
pub mod workflow;
pub mod writer;

mod error;

pub use self::{
	error::{Error, Result},
	metrics::{Metrics, MetricsSnapshot},
	store::{DualBackendStore, StoreHealth, TicketStore},
	strategies::{StrategyInput, StrategyOutcome},
	workflow::{Message, RagRequest, RagResponse},
};

use std::{future::Future, pin::Pin, sync::Arc};

use serde::Serialize;
use serde_json::Value;

use triage_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig};
use triage_providers::{embedding, llm, logstore, logstore::LogEntry, rerank, websearch,
	websearch::WebHit};
use triage_storage::{db::Db, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>>;
}

pub trait LlmProvider
where
	Self: Send + Sync,
{
	fn complete_json<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<Value>>;

	fn complete_text<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<String>>;
}

pub trait WebSearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		max_results: u32,
	) -> BoxFuture<'a, Result<Vec<WebHit>>>;
}

pub trait LogStoreProvider
where
	Self: Send + Sync,
{
	fn query_entries<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		filter: &'a str,
		max_results: u32,
	) -> BoxFuture<'a, Result<Vec<LogEntry>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub rerank: Arc<dyn RerankProvider>,
	pub llm: Arc<dyn LlmProvider>,
	pub web: Arc<dyn WebSearchProvider>,
	pub logs: Arc<dyn LogStoreProvider>,
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self {
			embedding: provider.clone(),
			rerank: provider.clone(),
			llm: provider.clone(),
			web: provider.clone(),
			logs: provider,
		}
	}
}

/// The request-processing engine. Shared across requests; every per-request
/// state lives in the workflow, so the service itself only carries long-lived
/// clients and the metrics registry.
pub struct TriageService {
	pub cfg: Arc<Config>,
	pub store: Arc<dyn TicketStore>,
	pub providers: Providers,
	pub metrics: Metrics,
}
impl TriageService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		let cfg = Arc::new(cfg);
		let providers = Providers::default();
		let store =
			Arc::new(DualBackendStore::new(cfg.clone(), db, qdrant, providers.embedding.clone()));

		Self { cfg, store, providers, metrics: Metrics::default() }
	}

	pub fn with_store(cfg: Config, store: Arc<dyn TicketStore>, providers: Providers) -> Self {
		Self { cfg: Arc::new(cfg), store, providers, metrics: Metrics::default() }
	}

	pub async fn health(&self) -> HealthReport {
		let store = self.store.health().await;
		let backends = BackendHealth {
			postgres: store.postgres,
			qdrant: store.qdrant,
			embedding: !self.cfg.providers.embedding.api_key.trim().is_empty(),
			web_search: !self.cfg.providers.web_search.api_key.trim().is_empty(),
			log_store: !self.cfg.providers.log_store.api_key.trim().is_empty(),
		};
		let status = if backends.postgres && backends.qdrant { "healthy" } else { "degraded" };

		HealthReport { status, backends, metrics: self.metrics.snapshot() }
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct BackendHealth {
	pub postgres: bool,
	pub qdrant: bool,
	pub embedding: bool,
	pub web_search: bool,
	pub log_store: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
	pub status: &'static str,
	pub backends: BackendHealth,
	pub metrics: MetricsSnapshot,
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}

impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move { Ok(rerank::rerank(cfg, query, docs).await?) })
	}
}

impl LlmProvider for DefaultProviders {
	fn complete_json<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<Value>> {
		Box::pin(async move { Ok(llm::complete_json(cfg, messages).await?) })
	}

	fn complete_text<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok(llm::complete_text(cfg, messages).await?) })
	}
}

impl WebSearchProvider for DefaultProviders {
	fn search<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		max_results: u32,
	) -> BoxFuture<'a, Result<Vec<WebHit>>> {
		Box::pin(async move { Ok(websearch::search(cfg, query, max_results).await?) })
	}
}

impl LogStoreProvider for DefaultProviders {
	fn query_entries<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		filter: &'a str,
		max_results: u32,
	) -> BoxFuture<'a, Result<Vec<LogEntry>>> {
		Box::pin(async move { Ok(logstore::query_entries(cfg, filter, max_results).await?) })
	}
}
