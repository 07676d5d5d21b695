use std::{collections::HashMap, sync::Arc};

use qdrant_client::qdrant::{
	Condition, Filter, Query, QueryPointsBuilder, ScoredPoint, value::Kind,
};
use serde_json::{Map, json};
use time::format_description::well_known::Rfc3339;

use crate::{BoxFuture, EmbeddingProvider, Error, Result, TriageService};
use triage_config::{Config, RetrievalBackend};
use triage_domain::{
	RetrievedContext, clamp_score, cmp_score_desc, fuse, normalize_keyword_scores, topk,
};
use triage_storage::{
	db::Db,
	models::{Collection, TicketFilters, TicketRow},
	qdrant::{DENSE_VECTOR_NAME, QdrantStore},
	tickets,
};

/// Readiness of the two ticket-store back-ends.
#[derive(Clone, Copy, Debug)]
pub struct StoreHealth {
	pub postgres: bool,
	pub qdrant: bool,
}

/// The ticket store behind its narrow interface: cosine nearest-neighbor,
/// full-text ranking, and structured filters over the two collections.
/// Implementations must be safe for concurrent use.
pub trait TicketStore
where
	Self: Send + Sync,
{
	/// Nearest neighbors for `query` with similarity at or above `threshold`.
	/// Returned scores are cosine similarities clamped to `[0, 1]` and sources
	/// are tagged `vector_<collection>` until a strategy retags them.
	fn vector_search<'a>(
		&'a self,
		collection: Collection,
		query: &'a str,
		k: u32,
		threshold: f32,
		filters: &'a TicketFilters,
	) -> BoxFuture<'a, Result<Vec<RetrievedContext>>>;

	/// Full-text hits with scores already rescaled onto `[0, 1]` by the batch
	/// maximum; the substring fallback keeps its uniform 0.5.
	fn keyword_search<'a>(
		&'a self,
		collection: Collection,
		query: &'a str,
		k: u32,
		filters: &'a TicketFilters,
	) -> BoxFuture<'a, Result<Vec<RetrievedContext>>>;

	fn health<'a>(&'a self) -> BoxFuture<'a, StoreHealth>;
}

/// Production ticket store: Qdrant as the primary vector back-end, Postgres
/// with the vector extension as the fallback, selected by
/// `retrieval.backend` with automatic degradation in `auto` mode.
pub struct DualBackendStore {
	cfg: Arc<Config>,
	db: Db,
	qdrant: QdrantStore,
	embedder: Arc<dyn EmbeddingProvider>,
}
impl DualBackendStore {
	pub fn new(
		cfg: Arc<Config>,
		db: Db,
		qdrant: QdrantStore,
		embedder: Arc<dyn EmbeddingProvider>,
	) -> Self {
		Self { cfg, db, qdrant, embedder }
	}

	async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
		let embeddings =
			self.embedder.embed(&self.cfg.providers.embedding, &[query.to_string()]).await?;
		let Some(vector) = embeddings.into_iter().next() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != self.cfg.storage.qdrant.vector_dim as usize {
			return Err(Error::Provider {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vector)
	}

	async fn qdrant_vector_search(
		&self,
		collection: Collection,
		vector: Vec<f32>,
		k: u32,
		threshold: f32,
		filters: &TicketFilters,
	) -> Result<Vec<RetrievedContext>> {
		let mut search = QueryPointsBuilder::new(self.qdrant.collection_name(collection))
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.score_threshold(threshold)
			.with_payload(true)
			.limit(k as u64);

		if !filters.is_empty() {
			let conditions: Vec<Condition> = filters
				.pairs()
				.into_iter()
				.map(|(field, value)| Condition::matches(field, value.to_string()))
				.collect();

			search = search.filter(Filter::must(conditions));
		}

		let response = self
			.qdrant
			.client
			.query(search)
			.await
			.map_err(|err| Error::Qdrant { message: err.to_string() })?;

		Ok(response
			.result
			.into_iter()
			.filter_map(|point| point_context(point, collection))
			.collect())
	}

	async fn pg_vector_search(
		&self,
		collection: Collection,
		vector: &[f32],
		k: u32,
		threshold: f32,
		filters: &TicketFilters,
	) -> Result<Vec<RetrievedContext>> {
		let vec_text = vector_to_pg(vector);

		match tickets::vector_candidates(&self.db.pool, collection, &vec_text, threshold, k, filters)
			.await
		{
			Ok(rows) => Ok(rows
				.into_iter()
				.map(|row| ticket_context(&row.ticket, clamp_score(row.score), "vector", collection))
				.collect()),
			Err(err) => {
				tracing::warn!(
					collection = collection.as_str(),
					error = %err,
					"Store-side nearest-neighbor query failed; scoring candidates in process."
				);

				self.pg_scan_search(collection, vector, k, threshold, filters).await
			},
		}
	}

	/// Client-side scoring fallback: fetch up to `3k` candidate rows and rank
	/// them by in-process cosine similarity.
	async fn pg_scan_search(
		&self,
		collection: Collection,
		vector: &[f32],
		k: u32,
		threshold: f32,
		filters: &TicketFilters,
	) -> Result<Vec<RetrievedContext>> {
		let rows =
			tickets::embedding_candidates(&self.db.pool, collection, k.saturating_mul(3), filters)
				.await?;
		let mut scored = Vec::new();

		for row in rows {
			let Some(vec_text) = row.vec_text.as_deref() else {
				continue;
			};
			let Ok(candidate) = parse_pg_vector(vec_text) else {
				continue;
			};
			let similarity = cosine_similarity(vector, &candidate);

			if similarity >= threshold {
				scored.push(ticket_context(
					&row.ticket,
					clamp_score(similarity),
					"vector",
					collection,
				));
			}
		}

		scored.sort_by(|left, right| cmp_score_desc(left.score, right.score));
		scored.truncate(k as usize);

		Ok(scored)
	}
}
impl TicketStore for DualBackendStore {
	fn vector_search<'a>(
		&'a self,
		collection: Collection,
		query: &'a str,
		k: u32,
		threshold: f32,
		filters: &'a TicketFilters,
	) -> BoxFuture<'a, Result<Vec<RetrievedContext>>> {
		Box::pin(async move {
			let vector = self.embed_query(query).await?;

			match self.cfg.retrieval.backend {
				RetrievalBackend::Primary =>
					self.qdrant_vector_search(collection, vector, k, threshold, filters).await,
				RetrievalBackend::Fallback =>
					self.pg_vector_search(collection, &vector, k, threshold, filters).await,
				RetrievalBackend::Auto => {
					match self
						.qdrant_vector_search(collection, vector.clone(), k, threshold, filters)
						.await
					{
						Ok(contexts) => Ok(contexts),
						Err(err) => {
							tracing::warn!(
								collection = collection.as_str(),
								error = %err,
								"Primary vector back-end failed; falling back to the relational store."
							);

							self.pg_vector_search(collection, &vector, k, threshold, filters).await
						},
					}
				},
			}
		})
	}

	fn keyword_search<'a>(
		&'a self,
		collection: Collection,
		query: &'a str,
		k: u32,
		filters: &'a TicketFilters,
	) -> BoxFuture<'a, Result<Vec<RetrievedContext>>> {
		Box::pin(async move {
			let tsquery = tickets::and_tsquery(query);

			if tsquery.is_empty() {
				return Ok(Vec::new());
			}

			match tickets::keyword_candidates(&self.db.pool, collection, &tsquery, k, filters).await
			{
				Ok(rows) => {
					let mut contexts: Vec<RetrievedContext> = rows
						.into_iter()
						.map(|row| ticket_context(&row.ticket, row.score, "keyword", collection))
						.collect();

					normalize_keyword_scores(&mut contexts);

					Ok(contexts)
				},
				Err(err) => {
					tracing::warn!(
						collection = collection.as_str(),
						error = %err,
						"Lexical index query failed; falling back to a substring scan."
					);

					let rows = tickets::substring_candidates(
						&self.db.pool,
						collection,
						query,
						k,
						filters,
					)
					.await?;

					Ok(rows
						.into_iter()
						.map(|row| ticket_context(&row.ticket, row.score, "keyword", collection))
						.collect())
				},
			}
		})
	}

	fn health<'a>(&'a self) -> BoxFuture<'a, StoreHealth> {
		Box::pin(async move {
			let postgres = sqlx::query("SELECT 1").execute(&self.db.pool).await.is_ok();
			let qdrant = self.qdrant.client.health_check().await.is_ok();

			StoreHealth { postgres, qdrant }
		})
	}
}

impl TriageService {
	/// Hybrid retrieval over one collection: vector and keyword sub-queries
	/// for up to `2k` each, fused with the configured weights. A failed
	/// sub-query degrades to a warning; only both failing is an error.
	pub async fn hybrid_search(
		&self,
		collection: Collection,
		query: &str,
		k: u32,
		filters: &TicketFilters,
	) -> Result<(Vec<RetrievedContext>, Vec<String>)> {
		let fetch = k.saturating_mul(2);
		let threshold = self.cfg.retrieval.similarity_threshold;
		let (vector, keyword) = tokio::join!(
			self.store.vector_search(collection, query, fetch, threshold, filters),
			self.store.keyword_search(collection, query, fetch, filters),
		);
		let mut warnings = Vec::new();
		let vector = match vector {
			Ok(contexts) => contexts,
			Err(err) => {
				warnings.push(format!("Vector sub-query failed: {err}"));

				Vec::new()
			},
		};
		let keyword = match keyword {
			Ok(contexts) => contexts,
			Err(err) => {
				warnings.push(format!("Keyword sub-query failed: {err}"));

				Vec::new()
			},
		};

		if warnings.len() == 2 {
			return Err(Error::StrategyFailed {
				strategy: "Hybrid",
				message: warnings.join(" "),
			});
		}

		let fused = fuse(
			&[vector, keyword],
			&[self.cfg.retrieval.vector_weight, self.cfg.retrieval.keyword_weight],
		);

		Ok((topk(fused, k as usize), warnings))
	}
}

/// Content and metadata shape shared by both back-ends: the derived content
/// field when present, otherwise the title/description rendering.
pub(crate) fn ticket_context(
	row: &TicketRow,
	score: f32,
	op: &str,
	collection: Collection,
) -> RetrievedContext {
	let content = match row.content.as_deref().filter(|content| !content.trim().is_empty()) {
		Some(content) => content.to_string(),
		None => format!(
			"Title: {}\nDescription: {}",
			row.title,
			row.description.as_deref().unwrap_or_default()
		),
	};
	let mut metadata = Map::new();

	metadata.insert("key".to_string(), json!(row.key));
	metadata.insert("title".to_string(), json!(row.title));

	for (name, value) in [
		("project", row.project.as_deref()),
		("priority", row.priority.as_deref()),
		("type", row.r#type.as_deref()),
		("status", row.status.as_deref()),
	] {
		if let Some(value) = value {
			metadata.insert(name.to_string(), json!(value));
		}
	}

	if let Some(created) = row.created
		&& let Ok(formatted) = created.format(&Rfc3339)
	{
		metadata.insert("created".to_string(), json!(formatted));
	}

	RetrievedContext {
		content,
		metadata,
		source: format!("{op}_{}", collection.as_str()),
		score: clamp_score(score),
	}
}

fn point_context(point: ScoredPoint, collection: Collection) -> Option<RetrievedContext> {
	let title = payload_str(&point.payload, "title")?;
	let description = payload_str(&point.payload, "description").unwrap_or_default();
	let content = format!("Title: {title}\nDescription: {description}");
	let mut metadata = Map::new();

	for field in ["key", "title", "project", "priority", "type", "status", "created"] {
		if let Some(value) = payload_str(&point.payload, field) {
			metadata.insert(field.to_string(), json!(value));
		}
	}

	Some(RetrievedContext {
		content,
		metadata,
		source: format!("vector_{}", collection.as_str()),
		score: clamp_score(point.score),
	})
}

fn payload_str(payload: &HashMap<String, qdrant_client::qdrant::Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.clone()),
		_ => None,
	}
}

pub(crate) fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

pub(crate) fn parse_pg_vector(text: &str) -> Result<Vec<f32>> {
	let trimmed = text.trim();
	let without_brackets =
		trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')).ok_or_else(|| {
			Error::Storage { message: "Vector text is not bracketed.".to_string() }
		})?;

	if without_brackets.trim().is_empty() {
		return Ok(Vec::new());
	}

	let mut vec = Vec::new();

	for part in without_brackets.split(',') {
		let value: f32 = part.trim().parse().map_err(|_| Error::Storage {
			message: "Vector text contains a non-numeric value.".to_string(),
		})?;

		vec.push(value);
	}

	Ok(vec)
}

pub(crate) fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
	if left.len() != right.len() || left.is_empty() {
		return 0.0;
	}

	let mut dot = 0.0_f32;
	let mut left_norm = 0.0_f32;
	let mut right_norm = 0.0_f32;

	for (a, b) in left.iter().zip(right.iter()) {
		dot += a * b;
		left_norm += a * a;
		right_norm += b * b;
	}

	if left_norm == 0.0 || right_norm == 0.0 {
		return 0.0;
	}

	dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vector_text_round_trips() {
		let vec = vec![0.25, -1.5, 3.0];
		let text = vector_to_pg(&vec);

		assert_eq!(text, "[0.25,-1.5,3]");
		assert_eq!(parse_pg_vector(&text).expect("parse failed"), vec);
		assert!(parse_pg_vector("not a vector").is_err());
		assert!(parse_pg_vector("[]").expect("empty parse failed").is_empty());
	}

	#[test]
	fn cosine_similarity_handles_degenerate_inputs() {
		assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
		assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
		assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
		assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
	}

	#[test]
	fn ticket_context_prefers_the_derived_content_field() {
		let row = TicketRow {
			jira_id: 1,
			key: "HBASE-7".to_string(),
			project: Some("HBASE".to_string()),
			project_name: None,
			priority: Some("Major".to_string()),
			r#type: Some("Bug".to_string()),
			status: Some("Open".to_string()),
			component: None,
			version: None,
			reporter: None,
			assignee: None,
			created: None,
			resolved: None,
			updated: None,
			title: "Region split hangs".to_string(),
			description: Some("Split never completes.".to_string()),
			content: Some("Title: Region split hangs\nDescription: Split never completes.".to_string()),
		};
		let context = ticket_context(&row, 0.8, "vector", Collection::Bugs);

		assert_eq!(context.source, "vector_bugs");
		assert_eq!(context.metadata_str("key"), Some("HBASE-7"));
		assert!(context.content.starts_with("Title: Region split hangs"));

		let bare = TicketRow { content: None, ..row };
		let context = ticket_context(&bare, 0.8, "keyword", Collection::Releases);

		assert_eq!(context.source, "keyword_releases");
		assert!(context.content.contains("Description: Split never completes."));
	}
}
