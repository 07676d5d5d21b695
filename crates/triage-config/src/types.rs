use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub web: WebSearch,
	#[serde(default)]
	pub logs: LogSearch,
	#[serde(default)]
	pub workflow: Workflow,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	#[serde(default = "default_collection_prefix")]
	pub collection_prefix: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: ProviderConfig,
	pub llm_fast: LlmProviderConfig,
	pub llm_strong: LlmProviderConfig,
	pub web_search: ProviderConfig,
	pub log_store: ProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub similarity_threshold: f32,
	pub top_k: u32,
	pub urgent_top_k: u32,
	pub vector_weight: f32,
	pub keyword_weight: f32,
	pub backend: RetrievalBackend,
	pub reranker_enabled: bool,
	pub classifier_enabled: bool,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			similarity_threshold: 0.1,
			top_k: 10,
			urgent_top_k: 5,
			vector_weight: 0.7,
			keyword_weight: 0.3,
			backend: RetrievalBackend::Auto,
			reranker_enabled: true,
			classifier_enabled: true,
		}
	}
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalBackend {
	Auto,
	Primary,
	Fallback,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WebSearch {
	pub max_searches: u32,
	pub fanout: u32,
	pub timeout_ms: u64,
}
impl Default for WebSearch {
	fn default() -> Self {
		Self { max_searches: 5, fanout: 3, timeout_ms: 20_000 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSearch {
	pub max_searches: u32,
	pub fanout: u32,
	pub window_hours: i64,
	pub incident_window_hours: i64,
	pub exception_catalogue: Vec<String>,
}
impl Default for LogSearch {
	fn default() -> Self {
		Self {
			max_searches: 5,
			fanout: 3,
			window_hours: 1,
			incident_window_hours: 72,
			exception_catalogue: vec![
				"CertificateExpiredException".to_string(),
				"HttpServerErrorException".to_string(),
				"DiskSpaceExceededException".to_string(),
				"DeadLetterQueueException".to_string(),
			],
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Workflow {
	pub bm25_timeout_ms: u64,
	pub compression_timeout_ms: u64,
	pub ensemble_timeout_ms: u64,
	pub web_search_timeout_ms: u64,
	pub log_search_timeout_ms: u64,
	pub compose_budget_ms: u64,
}
impl Default for Workflow {
	fn default() -> Self {
		Self {
			bm25_timeout_ms: 5_000,
			compression_timeout_ms: 10_000,
			ensemble_timeout_ms: 30_000,
			web_search_timeout_ms: 20_000,
			log_search_timeout_ms: 20_000,
			compose_budget_ms: 5_000,
		}
	}
}

fn default_collection_prefix() -> String {
	"tickets".to_string()
}
