use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
	Result,
	models::{Collection, ScoredTicketRow, TicketFilters, TicketVectorRow},
};

const TICKET_COLUMNS: &str = "\
jira_id, key, project, project_name, priority, type, status, component, version, reporter, \
assignee, created, resolved, updated, title, description, content";

/// Nearest-neighbor candidates by cosine distance, thresholded in the store.
/// `vec_text` is the query embedding in `[x,y,...]` vector-text form.
pub async fn vector_candidates(
	pool: &PgPool,
	collection: Collection,
	vec_text: &str,
	threshold: f32,
	limit: u32,
	filters: &TicketFilters,
) -> Result<Vec<ScoredTicketRow>> {
	let max_distance = 1.0 - threshold;
	let mut builder: QueryBuilder<Postgres> =
		QueryBuilder::new(format!("SELECT {TICKET_COLUMNS}, (1 - (embedding <=> "));

	builder.push_bind(vec_text.to_string());
	builder.push("::vector))::real AS score FROM ");
	builder.push(collection.table_name());
	builder.push(" WHERE embedding IS NOT NULL AND (embedding <=> ");
	builder.push_bind(vec_text.to_string());
	builder.push("::vector) <= ");
	builder.push_bind(max_distance as f64);

	push_filters(&mut builder, filters);

	builder.push(" ORDER BY embedding <=> ");
	builder.push_bind(vec_text.to_string());
	builder.push("::vector ASC LIMIT ");
	builder.push_bind(limit as i64);

	Ok(builder.build_query_as::<ScoredTicketRow>().fetch_all(pool).await?)
}

/// Candidate rows with their stored embeddings as vector text, for in-process
/// scoring when the store's nearest-neighbor routine is unavailable.
pub async fn embedding_candidates(
	pool: &PgPool,
	collection: Collection,
	limit: u32,
	filters: &TicketFilters,
) -> Result<Vec<TicketVectorRow>> {
	let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
		"SELECT {TICKET_COLUMNS}, embedding::text AS vec_text FROM "
	));

	builder.push(collection.table_name());
	builder.push(" WHERE embedding IS NOT NULL");

	push_filters(&mut builder, filters);

	builder.push(" LIMIT ");
	builder.push_bind(limit as i64);

	Ok(builder.build_query_as::<TicketVectorRow>().fetch_all(pool).await?)
}

/// Full-text candidates ranked by the store's ranking function. `tsquery` is
/// the boolean-AND rewrite produced by [`and_tsquery`].
pub async fn keyword_candidates(
	pool: &PgPool,
	collection: Collection,
	tsquery: &str,
	limit: u32,
	filters: &TicketFilters,
) -> Result<Vec<ScoredTicketRow>> {
	let mut builder: QueryBuilder<Postgres> =
		QueryBuilder::new(format!("SELECT {TICKET_COLUMNS}, ts_rank(tsv, to_tsquery('english', "));

	builder.push_bind(tsquery.to_string());
	builder.push("))::real AS score FROM ");
	builder.push(collection.table_name());
	builder.push(" WHERE tsv @@ to_tsquery('english', ");
	builder.push_bind(tsquery.to_string());
	builder.push(")");

	push_filters(&mut builder, filters);

	builder.push(" ORDER BY score DESC LIMIT ");
	builder.push_bind(limit as i64);

	Ok(builder.build_query_as::<ScoredTicketRow>().fetch_all(pool).await?)
}

/// Case-insensitive substring scan over title and description, used when the
/// lexical index cannot be queried. Every hit scores a uniform 0.5.
pub async fn substring_candidates(
	pool: &PgPool,
	collection: Collection,
	query: &str,
	limit: u32,
	filters: &TicketFilters,
) -> Result<Vec<ScoredTicketRow>> {
	let pattern = format!("%{}%", query.trim());
	let mut builder: QueryBuilder<Postgres> =
		QueryBuilder::new(format!("SELECT {TICKET_COLUMNS}, 0.5::real AS score FROM "));

	builder.push(collection.table_name());
	builder.push(" WHERE (title ILIKE ");
	builder.push_bind(pattern.clone());
	builder.push(" OR description ILIKE ");
	builder.push_bind(pattern);
	builder.push(")");

	push_filters(&mut builder, filters);

	builder.push(" LIMIT ");
	builder.push_bind(limit as i64);

	Ok(builder.build_query_as::<ScoredTicketRow>().fetch_all(pool).await?)
}

/// Rewrites a free-text query into the store's boolean-AND tsquery form.
/// Returns an empty string when no indexable token survives.
pub fn and_tsquery(query: &str) -> String {
	let tokens: Vec<String> = query
		.split(|ch: char| !ch.is_ascii_alphanumeric())
		.filter(|token| !token.is_empty())
		.map(str::to_lowercase)
		.collect();

	tokens.join(" & ")
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &TicketFilters) {
	for (column, value) in filters.pairs() {
		builder.push(format!(" AND {column} = "));
		builder.push_bind(value.to_string());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn multi_word_queries_rewrite_to_boolean_and() {
		assert_eq!(and_tsquery("connection timeout HBase"), "connection & timeout & hbase");
		assert_eq!(and_tsquery("  login!  failure?  "), "login & failure");
		assert_eq!(and_tsquery("???"), "");
	}
}
