use std::sync::Arc;

use triage_service::TriageService;
use triage_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<TriageService>,
}
impl AppState {
	/// Connects the long-lived clients and bootstraps the ticket schema.
	pub async fn connect(config: triage_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.storage.qdrant.vector_dim).await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		Ok(Self { service: Arc::new(TriageService::new(config, db, qdrant)) })
	}

	pub fn from_service(service: TriageService) -> Self {
		Self { service: Arc::new(service) }
	}
}
