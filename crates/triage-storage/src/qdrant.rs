use crate::{Result, models::Collection};

pub const DENSE_VECTOR_NAME: &str = "dense";

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection_prefix: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &triage_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self {
			client,
			collection_prefix: cfg.collection_prefix.clone(),
			vector_dim: cfg.vector_dim,
		})
	}

	pub fn collection_name(&self, collection: Collection) -> String {
		format!("{}_{}", self.collection_prefix, collection.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn collection_names_carry_the_prefix() {
		let cfg = triage_config::Qdrant {
			url: "http://localhost:6334".to_string(),
			collection_prefix: "tickets".to_string(),
			vector_dim: 3,
		};
		let store = QdrantStore::new(&cfg).expect("Qdrant store must build from a valid URL.");

		assert_eq!(store.collection_name(Collection::Bugs), "tickets_bugs");
		assert_eq!(store.collection_name(Collection::Releases), "tickets_releases");
	}
}
