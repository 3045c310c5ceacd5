//! End-to-end service tests against in-memory providers. The vector mock
//! deliberately ignores the tier predicate so these tests prove the service
//! enforces visibility on its own results.

use std::{
	collections::HashMap,
	hash::{Hash, Hasher},
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicI64, Ordering},
	},
	time::Duration,
};

use time::OffsetDateTime;
use uuid::Uuid;

use pandu_config::Config;
use pandu_domain::{access::TierPredicate, sparse::SparseVector};
use pandu_service::{
	BoxFuture, EmbeddingProvider, PanduService, Providers, RerankProvider, RouteStore,
	ServiceError, SearchRequest, VectorSearchProvider,
	golden::{AddRouteRequest, RouteRequest},
};
use pandu_storage::models::{ChunkHit, GoldenRouteRecord};

const DIMS: usize = 32;

/// Deterministic bag-of-words embedding. Shared token sets yield high cosine
/// similarity, disjoint sets stay far below the route threshold.
fn embed_text(text: &str) -> Vec<f32> {
	let mut vector = vec![0.0_f32; DIMS];

	for token in text.to_lowercase().split_whitespace() {
		let mut hasher = std::collections::hash_map::DefaultHasher::new();

		token.hash(&mut hasher);

		vector[(hasher.finish() % DIMS as u64) as usize] += 1.0;
	}

	let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();

	if norm > 0.0 {
		for value in &mut vector {
			*value /= norm;
		}
	}

	vector
}

#[derive(Default)]
struct MockEmbedding {
	fail: AtomicBool,
}

impl EmbeddingProvider for MockEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a pandu_config::EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			if self.fail.load(Ordering::SeqCst) {
				color_eyre::eyre::bail!("embedding endpoint down");
			}

			Ok(texts.iter().map(|text| embed_text(text)).collect())
		})
	}
}

#[derive(Default)]
struct MockRerank {
	fail: AtomicBool,
}

impl RerankProvider for MockRerank {
	fn rerank<'a>(
		&'a self,
		_cfg: &'a pandu_config::RerankProviderConfig,
		_query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(async move {
			if self.fail.load(Ordering::SeqCst) {
				color_eyre::eyre::bail!("rerank endpoint down");
			}

			Ok(docs
				.iter()
				.map(|doc| if doc.to_lowercase().contains("pma") { 1.0 } else { 0.1 })
				.collect())
		})
	}
}

struct MockVectors {
	hits: HashMap<String, Vec<ChunkHit>>,
	fail_sparse: AtomicBool,
}

impl MockVectors {
	fn new(hits: HashMap<String, Vec<ChunkHit>>) -> Self {
		Self { hits, fail_sparse: AtomicBool::new(false) }
	}

	fn collection_hits(&self, collection: &str) -> Vec<ChunkHit> {
		self.hits.get(collection).cloned().unwrap_or_default()
	}
}

impl VectorSearchProvider for MockVectors {
	fn dense_search<'a>(
		&'a self,
		collection: &'a str,
		_vector: &'a [f32],
		_predicate: Option<&'a TierPredicate>,
		_limit: u64,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ChunkHit>>> {
		Box::pin(async move { Ok(self.collection_hits(collection)) })
	}

	fn sparse_search<'a>(
		&'a self,
		collection: &'a str,
		_sparse: &'a SparseVector,
		_predicate: Option<&'a TierPredicate>,
		_limit: u64,
	) -> BoxFuture<'a, color_eyre::Result<Vec<ChunkHit>>> {
		Box::pin(async move {
			if self.fail_sparse.load(Ordering::SeqCst) {
				color_eyre::eyre::bail!("sparse index unavailable");
			}

			let mut hits = self.collection_hits(collection);

			// A different branch ordering exercises the fusion path.
			hits.reverse();

			Ok(hits)
		})
	}
}

#[derive(Default)]
struct MockRoutes {
	records: Mutex<Vec<GoldenRouteRecord>>,
	bumps: AtomicI64,
}

impl RouteStore for MockRoutes {
	fn list_routes(&self) -> BoxFuture<'_, color_eyre::Result<Vec<GoldenRouteRecord>>> {
		Box::pin(async move {
			Ok(self.records.lock().unwrap_or_else(|err| err.into_inner()).clone())
		})
	}

	fn insert_route<'a>(
		&'a self,
		record: &'a GoldenRouteRecord,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			self.records.lock().unwrap_or_else(|err| err.into_inner()).push(record.clone());

			Ok(())
		})
	}

	fn bump_usage<'a>(
		&'a self,
		_route_id: Uuid,
		_now: OffsetDateTime,
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			self.bumps.fetch_add(1, Ordering::SeqCst);

			Ok(())
		})
	}
}

fn test_config(rerank_mode: &str) -> Config {
	let raw = format!(
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
vector_dim = {DIMS}

[providers.embedding]
provider_id = "mock"
api_base = "http://localhost"
api_key = "test"
path = "/v1/embeddings"
model = "mock-embed"
dimensions = {DIMS}
timeout_ms = 2000

[providers.rerank]
provider_id = "mock"
api_base = "http://localhost"
api_key = "test"
path = "/v1/rerank"
model = "mock-rerank"
timeout_ms = 2000

[sparse]

[router]
confidence_floor = 0.2
fallback_collection = "general_knowledge"

[[router.collections]]
name = "legal_regulations"
domain = "legal"
keywords = ["kbli", "regulation", "permit", "license", "kitas", "visa", "pma", "pt"]

[[router.collections]]
name = "general_knowledge"
domain = "general"
keywords = []

[search]
vector_timeout_ms = 500
retry_backoff_ms = 10

[search.rerank]
mode = "{rerank_mode}"
high_confidence = 0.99

[golden]
"#
	);
	let cfg: Config = toml::from_str(&raw).expect("test config must parse");

	pandu_config::validate(&cfg).expect("test config must validate");

	cfg
}

fn chunk(id: &str, text: &str, tier: &str, status: &str, collection: &str) -> ChunkHit {
	ChunkHit {
		id: id.to_string(),
		text: text.to_string(),
		score: 0.5,
		tier: tier.to_string(),
		status: status.to_string(),
		domain: Some("legal".to_string()),
		collection: collection.to_string(),
		position: Some(0),
		source_document: Some("uu-25-2007".to_string()),
	}
}

fn legal_corpus() -> HashMap<String, Vec<ChunkHit>> {
	let legal = vec![
		chunk("c1", "Foreign-owned limited liability company overview.", "public", "active", "legal_regulations"),
		chunk("c2", "PT PMA minimum capital rules.", "registered", "active", "legal_regulations"),
		chunk("c3", "Internal memo on PMA screening.", "internal", "active", "legal_regulations"),
		chunk("c4", "Professional guidance for PMA filings.", "professional", "active", "legal_regulations"),
		chunk("c5", "Old PMA capital rule, since repealed.", "public", "repealed", "legal_regulations"),
	];
	let general =
		vec![chunk("g1", "General business overview.", "public", "active", "general_knowledge")];

	HashMap::from([
		("legal_regulations".to_string(), legal),
		("general_knowledge".to_string(), general),
	])
}

struct Harness {
	service: Arc<PanduService>,
	embedding: Arc<MockEmbedding>,
	rerank: Arc<MockRerank>,
	vectors: Arc<MockVectors>,
	routes: Arc<MockRoutes>,
}

fn harness(rerank_mode: &str) -> Harness {
	let embedding = Arc::new(MockEmbedding::default());
	let rerank = Arc::new(MockRerank::default());
	let vectors = Arc::new(MockVectors::new(legal_corpus()));
	let routes = Arc::new(MockRoutes::default());
	let providers = Providers::new(
		embedding.clone(),
		rerank.clone(),
		vectors.clone(),
		routes.clone(),
	);
	let service = Arc::new(PanduService::with_providers(test_config(rerank_mode), providers));

	Harness { service, embedding, rerank, vectors, routes }
}

fn search_request(query: &str) -> SearchRequest {
	SearchRequest {
		query: query.to_string(),
		access_level: 0,
		tier_filter: None,
		include_repealed: false,
		apply_filters: true,
		collection_override: None,
		domain_hint: None,
		limit: None,
	}
}

#[tokio::test]
async fn empty_query_is_rejected() {
	let harness = harness("off");
	let result = harness.service.search(search_request("   ")).await;

	assert!(matches!(result, Err(ServiceError::InvalidRequest { .. })));
}

#[tokio::test]
async fn access_level_above_maximum_is_rejected() {
	let harness = harness("off");
	let mut request = search_request("PT PMA capital");

	request.access_level = 4;

	assert!(matches!(
		harness.service.search(request).await,
		Err(ServiceError::InvalidRequest { .. })
	));
}

#[tokio::test]
async fn results_respect_the_access_tier_ceiling() {
	let harness = harness("off");
	let mut request = search_request("What is a PT PMA permit?");

	request.access_level = 1;

	let response = harness.service.search(request).await.expect("search failed");

	assert_eq!(response.collections_used, vec!["legal_regulations".to_string()]);
	assert!(!response.results.is_empty());
	assert_eq!(response.total_found, response.results.len());

	for item in &response.results {
		assert!(
			item.metadata.tier == "public" || item.metadata.tier == "registered",
			"tier {} leaked at level 1",
			item.metadata.tier
		);
		assert_ne!(item.metadata.status, "repealed");
	}
}

#[tokio::test]
async fn repealed_content_returns_when_requested() {
	let harness = harness("off");
	let mut request = search_request("repealed PMA capital rule");

	request.access_level = 3;
	request.include_repealed = true;

	let response = harness.service.search(request).await.expect("search failed");

	assert!(response.results.iter().any(|item| item.metadata.status == "repealed"));
}

#[tokio::test]
async fn disjoint_tier_filter_returns_empty() {
	let harness = harness("off");
	let mut request = search_request("PT PMA permit");

	request.access_level = 0;
	request.tier_filter = Some(vec!["internal".to_string()]);

	let response = harness.service.search(request).await.expect("search failed");

	assert!(response.results.is_empty());
	assert_eq!(response.total_found, 0);
}

#[tokio::test]
async fn failed_branch_degrades_instead_of_erroring() {
	let harness = harness("off");

	harness.vectors.fail_sparse.store(true, Ordering::SeqCst);

	let response = harness
		.service
		.search(search_request("PT PMA permit"))
		.await
		.expect("search failed");

	assert!(!response.results.is_empty());
	assert!(response.degraded.contains(&"legal_regulations/sparse".to_string()));
}

#[tokio::test]
async fn embedder_failure_is_fatal() {
	let harness = harness("off");

	harness.embedding.fail.store(true, Ordering::SeqCst);

	assert!(matches!(
		harness.service.search(search_request("PT PMA permit")).await,
		Err(ServiceError::ServiceUnavailable { .. })
	));
}

#[tokio::test]
async fn reranker_failure_keeps_fused_order() {
	let harness = harness("always");

	harness.rerank.fail.store(true, Ordering::SeqCst);

	let mut request = search_request("PT PMA permit");

	request.access_level = 3;

	let response = harness.service.search(request).await.expect("search failed");

	assert!(!response.reranked);
	assert!(response.degraded.contains(&"rerank".to_string()));
	assert!(!response.results.is_empty());
}

#[tokio::test]
async fn always_mode_reranks_and_records_scores() {
	let harness = harness("always");
	let mut request = search_request("PT PMA permit");

	request.access_level = 3;

	let response = harness.service.search(request).await.expect("search failed");

	assert!(response.reranked);
	assert!(response.results[0].rerank_score.is_some());
	// The mock reranker scores PMA-bearing texts above everything else.
	assert!(response.results[0].text.to_lowercase().contains("pma"));
}

#[tokio::test]
async fn collection_override_pins_the_route() {
	let harness = harness("off");
	let mut request = search_request("PT PMA permit");

	request.collection_override = Some("general_knowledge".to_string());

	let response = harness.service.search(request).await.expect("search failed");

	assert_eq!(response.collections_used, vec!["general_knowledge".to_string()]);

	for item in &response.results {
		assert_eq!(item.metadata.collection, "general_knowledge");
	}
}

#[tokio::test]
async fn added_route_matches_exactly_and_bumps_usage() {
	let harness = harness("off");
	let added = harness
		.service
		.add_route(AddRouteRequest {
			canonical_query: "How do I set up a PT PMA?".to_string(),
			document_ids: vec!["uu-25-2007".to_string()],
			chapter_ids: Vec::new(),
			collections: vec!["legal_regulations".to_string()],
			routing_hints: None,
			similarity_threshold: None,
		})
		.await
		.expect("add_route failed");

	assert_eq!(added.total_routes, 1);

	// Spacing and case differences must not break the exact matcher.
	let golden = harness
		.service
		.route(RouteRequest {
			query: "  how do i  set up a pt pma? ".to_string(),
			user_id: Some("user-42".to_string()),
		})
		.await
		.expect("route failed")
		.expect("expected a golden route hit");

	assert_eq!(golden.route_id, added.route_id);
	assert_eq!(golden.matched_by, "exact");
	assert!((golden.score - 1.0).abs() < 1e-6);

	// The usage bump is fire-and-forget; poll briefly for it.
	for _ in 0..100 {
		if harness.routes.bumps.load(Ordering::SeqCst) == 1 {
			break;
		}

		tokio::time::sleep(Duration::from_millis(5)).await;
	}

	assert_eq!(harness.routes.bumps.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn similar_route_matches_through_embeddings() {
	let harness = harness("off");

	harness
		.service
		.add_route(AddRouteRequest {
			canonical_query: "kitas renewal requirements jakarta".to_string(),
			document_ids: vec!["permen-imigrasi".to_string()],
			chapter_ids: Vec::new(),
			collections: Vec::new(),
			routing_hints: None,
			similarity_threshold: Some(0.8),
		})
		.await
		.expect("add_route failed");

	// Shares most tokens with the canonical query; the bag-of-words mock
	// embeds it nearby.
	let golden = harness
		.service
		.match_golden("kitas renewal requirements jakarta indonesia")
		.await
		.expect("match failed")
		.expect("expected an embedding hit");

	assert_eq!(golden.matched_by, "embedding");
	assert!(golden.score >= 0.8);
}

#[tokio::test]
async fn unrelated_query_misses_the_route_cache() {
	let harness = harness("off");

	harness
		.service
		.add_route(AddRouteRequest {
			canonical_query: "kitas renewal requirements".to_string(),
			document_ids: vec!["permen-imigrasi".to_string()],
			chapter_ids: Vec::new(),
			collections: Vec::new(),
			routing_hints: None,
			similarity_threshold: None,
		})
		.await
		.expect("add_route failed");

	let miss = harness
		.service
		.match_golden("best warung food stalls nearby")
		.await
		.expect("match failed");

	assert!(miss.is_none());
	assert_eq!(harness.routes.bumps.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn low_confidence_queries_fall_back_to_general() {
	let harness = harness("off");
	let response = harness
		.service
		.search(search_request("completely unrelated musings about weather"))
		.await
		.expect("search failed");

	assert_eq!(response.collections_used, vec!["general_knowledge".to_string()]);
}
