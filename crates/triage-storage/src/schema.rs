use crate::models::Collection;

/// Renders the DDL for one ticket collection. Both collections share the
/// same shape; only the table name differs.
pub fn render_schema(collection: Collection, vector_dim: u32) -> String {
	include_str!("../sql/tickets.sql")
		.replace("<TABLE>", collection.table_name())
		.replace("<VECTOR_DIM>", &vector_dim.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn renders_both_collections_with_the_requested_dimension() {
		for collection in Collection::ALL {
			let sql = render_schema(collection, 1536);

			assert!(sql.contains(&format!("CREATE TABLE IF NOT EXISTS {}", collection.table_name())));
			assert!(sql.contains("vector(1536)"));
			assert!(!sql.contains("<TABLE>"));
			assert!(!sql.contains("<VECTOR_DIM>"));
		}
	}
}
