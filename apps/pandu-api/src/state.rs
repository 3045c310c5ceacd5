use std::sync::Arc;

use pandu_service::{PanduService, golden::spawn_route_warmup};
use pandu_storage::{db::Db, qdrant::VectorStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<PanduService>,
}
impl AppState {
	pub async fn new(config: pandu_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let vectors = VectorStore::new(&config.storage.qdrant)?;
		let service = Arc::new(PanduService::new(config, db, vectors));

		// The snapshot loads behind the listeners; queries served before it
		// lands simply miss the route cache.
		spawn_route_warmup(service.clone());

		Ok(Self { service })
	}
}
