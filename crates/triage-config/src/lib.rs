mod types;

use std::{fs, path::Path};

use color_eyre::eyre;

pub use types::{
	Config, EmbeddingProviderConfig, LlmProviderConfig, LogSearch, Postgres, ProviderConfig,
	Providers, Qdrant, Retrieval, RetrievalBackend, Service, Storage, WebSearch, Workflow,
};

pub fn load(path: &Path) -> color_eyre::Result<Config> {
	let raw = fs::read_to_string(path)?;

	let mut cfg: Config = toml::from_str(&raw)?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

fn normalize(cfg: &mut Config) {
	cfg.logs.exception_catalogue.retain(|class| !class.trim().is_empty());
}

pub fn validate(cfg: &Config) -> color_eyre::Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(eyre::eyre!("service.http_bind must be non-empty."));
	}
	if cfg.service.log_level.trim().is_empty() {
		return Err(eyre::eyre!("service.log_level must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(eyre::eyre!("storage.postgres.pool_max_conns must be greater than zero."));
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(eyre::eyre!("providers.embedding.dimensions must be greater than zero."));
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(eyre::eyre!(
			"providers.embedding.dimensions must match storage.qdrant.vector_dim."
		));
	}

	if !(0.0..=1.0).contains(&cfg.retrieval.similarity_threshold) {
		return Err(eyre::eyre!("retrieval.similarity_threshold must be in the range 0.0-1.0."));
	}
	if cfg.retrieval.top_k == 0 {
		return Err(eyre::eyre!("retrieval.top_k must be greater than zero."));
	}
	if cfg.retrieval.urgent_top_k == 0 {
		return Err(eyre::eyre!("retrieval.urgent_top_k must be greater than zero."));
	}

	for (label, weight) in [
		("retrieval.vector_weight", cfg.retrieval.vector_weight),
		("retrieval.keyword_weight", cfg.retrieval.keyword_weight),
	] {
		if !weight.is_finite() {
			return Err(eyre::eyre!("{label} must be a finite number."));
		}
		if !(0.0..=1.0).contains(&weight) {
			return Err(eyre::eyre!("{label} must be in the range 0.0-1.0."));
		}
	}

	let weight_sum = cfg.retrieval.vector_weight + cfg.retrieval.keyword_weight;

	if (weight_sum - 1.0).abs() > 1e-3 {
		return Err(eyre::eyre!(
			"retrieval.vector_weight and retrieval.keyword_weight must sum to one."
		));
	}

	if cfg.web.max_searches == 0 {
		return Err(eyre::eyre!("web.max_searches must be greater than zero."));
	}
	if cfg.web.fanout == 0 {
		return Err(eyre::eyre!("web.fanout must be greater than zero."));
	}
	if cfg.logs.max_searches == 0 {
		return Err(eyre::eyre!("logs.max_searches must be greater than zero."));
	}
	if cfg.logs.fanout == 0 {
		return Err(eyre::eyre!("logs.fanout must be greater than zero."));
	}
	if cfg.logs.window_hours <= 0 {
		return Err(eyre::eyre!("logs.window_hours must be greater than zero."));
	}
	if cfg.logs.incident_window_hours <= 0 {
		return Err(eyre::eyre!("logs.incident_window_hours must be greater than zero."));
	}
	if cfg.logs.exception_catalogue.is_empty() {
		return Err(eyre::eyre!("logs.exception_catalogue must be non-empty."));
	}

	for (label, timeout) in [
		("workflow.bm25_timeout_ms", cfg.workflow.bm25_timeout_ms),
		("workflow.compression_timeout_ms", cfg.workflow.compression_timeout_ms),
		("workflow.ensemble_timeout_ms", cfg.workflow.ensemble_timeout_ms),
		("workflow.web_search_timeout_ms", cfg.workflow.web_search_timeout_ms),
		("workflow.log_search_timeout_ms", cfg.workflow.log_search_timeout_ms),
		("workflow.compose_budget_ms", cfg.workflow.compose_budget_ms),
	] {
		if timeout == 0 {
			return Err(eyre::eyre!("{label} must be greater than zero."));
		}
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("rerank", &cfg.providers.rerank.api_key),
		("llm_fast", &cfg.providers.llm_fast.api_key),
		("llm_strong", &cfg.providers.llm_strong.api_key),
		("web_search", &cfg.providers.web_search.api_key),
		("log_store", &cfg.providers.log_store.api_key),
	] {
		if key.trim().is_empty() {
			return Err(eyre::eyre!("Provider {label} api_key must be non-empty."));
		}
	}

	Ok(())
}
