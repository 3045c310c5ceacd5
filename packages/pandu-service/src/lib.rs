pub mod golden;
pub mod router;
pub mod search;

mod error;

pub use error::{ServiceError, ServiceResult};
pub use golden::{AddRouteRequest, AddRouteResponse, RouteMatch, RouteRequest};
pub use router::{QueryRouter, RouteDecision};
pub use search::{ChunkMetadata, SearchItem, SearchRequest, SearchResponse};

use std::{
	future::Future,
	pin::Pin,
	sync::{Arc, RwLock},
	time::Duration,
};

use time::OffsetDateTime;
use uuid::Uuid;

use pandu_config::Config;
use pandu_domain::{
	access::TierPredicate,
	sparse::{SparseVector, SparseVectorizer},
};
use pandu_storage::{
	db::Db,
	embed_cache::EmbedCache,
	models::{ChunkHit, GoldenRouteRecord},
	qdrant::VectorStore,
};

use crate::golden::RouteSnapshot;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a pandu_config::EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		cfg: &'a pandu_config::RerankProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>>;
}

pub trait VectorSearchProvider
where
	Self: Send + Sync,
{
	fn dense_search<'a>(
		&'a self,
		collection: &'a str,
		vector: &'a [f32],
		predicate: Option<&'a TierPredicate>,
		limit: u64,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ChunkHit>>>;

	fn sparse_search<'a>(
		&'a self,
		collection: &'a str,
		sparse: &'a SparseVector,
		predicate: Option<&'a TierPredicate>,
		limit: u64,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ChunkHit>>>;
}

pub trait RouteStore
where
	Self: Send + Sync,
{
	fn list_routes(&self) -> BoxFuture<'_, color_eyre::Result<Vec<GoldenRouteRecord>>>;

	fn insert_route<'a>(
		&'a self,
		record: &'a GoldenRouteRecord,
	) -> BoxFuture<'a, color_eyre::Result<()>>;

	fn bump_usage<'a>(
		&'a self,
		route_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, color_eyre::Result<()>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub rerank: Arc<dyn RerankProvider>,
	pub vectors: Arc<dyn VectorSearchProvider>,
	pub routes: Arc<dyn RouteStore>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		rerank: Arc<dyn RerankProvider>,
		vectors: Arc<dyn VectorSearchProvider>,
		routes: Arc<dyn RouteStore>,
	) -> Self {
		Self { embedding, rerank, vectors, routes }
	}
}

pub struct PanduService {
	pub cfg: Config,
	pub providers: Providers,
	pub(crate) router: QueryRouter,
	pub(crate) sparse: RwLock<SparseVectorizer>,
	pub(crate) route_snapshot: RwLock<Arc<RouteSnapshot>>,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a pandu_config::EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(pandu_providers::embedding::embed(cfg, texts))
	}
}

impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a pandu_config::RerankProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(pandu_providers::rerank::rerank(cfg, query, docs))
	}
}

impl VectorSearchProvider for VectorStore {
	fn dense_search<'a>(
		&'a self,
		collection: &'a str,
		vector: &'a [f32],
		predicate: Option<&'a TierPredicate>,
		limit: u64,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ChunkHit>>> {
		Box::pin(async move {
			Ok(VectorStore::dense_search(self, collection, vector, predicate, limit).await?)
		})
	}

	fn sparse_search<'a>(
		&'a self,
		collection: &'a str,
		sparse: &'a SparseVector,
		predicate: Option<&'a TierPredicate>,
		limit: u64,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ChunkHit>>> {
		Box::pin(async move {
			Ok(VectorStore::sparse_search(self, collection, sparse, predicate, limit).await?)
		})
	}
}

impl RouteStore for Db {
	fn list_routes(&self) -> BoxFuture<'_, color_eyre::Result<Vec<GoldenRouteRecord>>> {
		Box::pin(async move { Ok(pandu_storage::routes::list_routes(&self.pool).await?) })
	}

	fn insert_route<'a>(
		&'a self,
		record: &'a GoldenRouteRecord,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move { Ok(pandu_storage::routes::insert_route(&self.pool, record).await?) })
	}

	fn bump_usage<'a>(
		&'a self,
		route_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			Ok(pandu_storage::routes::bump_usage(&self.pool, route_id, now).await?)
		})
	}
}

impl PanduService {
	pub fn new(cfg: Config, db: Db, vectors: VectorStore) -> Self {
		let provider = Arc::new(DefaultProviders);
		let providers = Providers {
			embedding: provider.clone(),
			rerank: provider,
			vectors: Arc::new(vectors),
			routes: Arc::new(db),
		};

		Self::with_providers(cfg, providers)
	}

	pub fn with_providers(cfg: Config, providers: Providers) -> Self {
		let router = QueryRouter::new(&cfg.router);
		let sparse = RwLock::new(SparseVectorizer::new(&cfg.sparse));

		Self {
			cfg,
			providers,
			router,
			sparse,
			route_snapshot: RwLock::new(Arc::new(RouteSnapshot::default())),
		}
	}

	/// Computes the sparse query vector without holding the lock across awaits.
	pub(crate) fn sparse_query_vector(&self, query: &str) -> SparseVector {
		self.sparse
			.read()
			.unwrap_or_else(|err| err.into_inner())
			.compute_query_vector(query)
	}

	/// Replaces the corpus-average document length after bulk reingestion.
	pub fn update_avg_doc_length(&self, avg_doc_length: f32) {
		self.sparse
			.write()
			.unwrap_or_else(|err| err.into_inner())
			.update_avg_doc_length(avg_doc_length);
	}

	pub(crate) fn embed_cache(&self) -> Option<EmbedCache> {
		self.cfg.golden.embed_cache_path.as_ref().map(EmbedCache::new)
	}

	pub(crate) async fn embed_query(&self, text: &str) -> ServiceResult<Vec<f32>> {
		let texts = vec![text.to_string()];
		let mut embedded = self.embed_batch(&texts).await?;

		embedded.pop().ok_or_else(|| ServiceError::ServiceUnavailable {
			message: "Embedding provider returned no vectors.".to_string(),
		})
	}

	pub(crate) async fn embed_batch(&self, texts: &[String]) -> ServiceResult<Vec<Vec<f32>>> {
		if texts.is_empty() {
			return Ok(Vec::new());
		}

		let cfg = &self.cfg.providers.embedding;
		let batches = texts.len().div_ceil(cfg.max_batch.max(1)) as u64;
		let budget = Duration::from_millis(cfg.timeout_ms.saturating_mul(batches.max(1)));
		let embedded =
			tokio::time::timeout(budget, self.providers.embedding.embed(cfg, texts))
				.await
				.map_err(|_| ServiceError::ServiceUnavailable {
					message: "Embedding provider timed out.".to_string(),
				})?
				.map_err(|err| ServiceError::ServiceUnavailable { message: err.to_string() })?;

		if embedded.len() != texts.len() {
			return Err(ServiceError::ServiceUnavailable {
				message: "Embedding provider returned mismatched vector count.".to_string(),
			});
		}

		let expected_dim = self.cfg.storage.qdrant.vector_dim as usize;

		for vector in &embedded {
			if vector.len() != expected_dim {
				return Err(ServiceError::ServiceUnavailable {
					message: "Embedding vector dimension mismatch.".to_string(),
				});
			}
		}

		Ok(embedded)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct NoopProviders;

	impl EmbeddingProvider for NoopProviders {
		fn embed<'a>(
			&'a self,
			_cfg: &'a pandu_config::EmbeddingProviderConfig,
			_texts: &'a [String],
		) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
			Box::pin(async { Ok(Vec::new()) })
		}
	}

	impl RerankProvider for NoopProviders {
		fn rerank<'a>(
			&'a self,
			_cfg: &'a pandu_config::RerankProviderConfig,
			_query: &'a str,
			_docs: &'a [String],
		) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
			Box::pin(async { Ok(Vec::new()) })
		}
	}

	impl VectorSearchProvider for NoopProviders {
		fn dense_search<'a>(
			&'a self,
			_collection: &'a str,
			_vector: &'a [f32],
			_predicate: Option<&'a TierPredicate>,
			_limit: u64,
		) -> BoxFuture<'a, color_eyre::Result<Vec<ChunkHit>>> {
			Box::pin(async { Ok(Vec::new()) })
		}

		fn sparse_search<'a>(
			&'a self,
			_collection: &'a str,
			_sparse: &'a SparseVector,
			_predicate: Option<&'a TierPredicate>,
			_limit: u64,
		) -> BoxFuture<'a, color_eyre::Result<Vec<ChunkHit>>> {
			Box::pin(async { Ok(Vec::new()) })
		}
	}

	impl RouteStore for NoopProviders {
		fn list_routes(&self) -> BoxFuture<'_, color_eyre::Result<Vec<GoldenRouteRecord>>> {
			Box::pin(async { Ok(Vec::new()) })
		}

		fn insert_route<'a>(
			&'a self,
			_record: &'a GoldenRouteRecord,
		) -> BoxFuture<'a, color_eyre::Result<()>> {
			Box::pin(async { Ok(()) })
		}

		fn bump_usage<'a>(
			&'a self,
			_route_id: Uuid,
			_now: OffsetDateTime,
		) -> BoxFuture<'a, color_eyre::Result<()>> {
			Box::pin(async { Ok(()) })
		}
	}

	fn sample_config() -> Config {
		toml::from_str(
			r#"
[service]
http_bind = "127.0.0.1:0"
admin_bind = "127.0.0.1:0"
log_level = "warn"

[storage.postgres]
dsn = "postgres://localhost/pandu_test"
pool_max_conns = 2

[storage.qdrant]
url = "http://localhost:6334"
vector_dim = 8

[providers.embedding]
provider_id = "noop"
api_base = "http://localhost"
api_key = "test"
path = "/v1/embeddings"
model = "noop-embed"
dimensions = 8
timeout_ms = 1000

[providers.rerank]
provider_id = "noop"
api_base = "http://localhost"
api_key = "test"
path = "/v1/rerank"
model = "noop-rerank"
timeout_ms = 1000

[sparse]

[router]
fallback_collection = "general_knowledge"

[[router.collections]]
name = "general_knowledge"
domain = "general"
keywords = []

[search]
[search.rerank]
mode = "off"

[golden]
"#,
		)
		.expect("sample config must parse")
	}

	fn service() -> PanduService {
		let provider = Arc::new(NoopProviders);

		PanduService::with_providers(sample_config(), Providers {
			embedding: provider.clone(),
			rerank: provider.clone(),
			vectors: provider.clone(),
			routes: provider,
		})
	}

	#[test]
	fn avg_doc_length_update_reaches_the_shared_vectorizer() {
		let service = service();
		let text = "restaurant permits and licensing obligations";
		let before = service
			.sparse
			.read()
			.unwrap_or_else(|err| err.into_inner())
			.compute_document_vector(text);

		service.update_avg_doc_length(4.0);

		let after = service
			.sparse
			.read()
			.unwrap_or_else(|err| err.into_inner())
			.compute_document_vector(text);

		assert_eq!(before.indices, after.indices);
		assert_ne!(before.values, after.values);
	}
}
