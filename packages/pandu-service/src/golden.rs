use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use pandu_storage::models::GoldenRouteRecord;

use crate::{PanduService, ServiceError, ServiceResult};

#[derive(Debug, Clone, Deserialize)]
pub struct RouteRequest {
	pub query: String,
	#[serde(default)]
	pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteMatch {
	pub route_id: Uuid,
	pub canonical_query: String,
	pub collections: Vec<String>,
	pub document_ids: Vec<String>,
	pub chapter_ids: Vec<String>,
	pub routing_hints: Value,
	pub score: f32,
	pub matched_by: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddRouteRequest {
	pub canonical_query: String,
	pub document_ids: Vec<String>,
	#[serde(default)]
	pub chapter_ids: Vec<String>,
	#[serde(default)]
	pub collections: Vec<String>,
	#[serde(default)]
	pub routing_hints: Option<Value>,
	#[serde(default)]
	pub similarity_threshold: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddRouteResponse {
	pub route_id: Uuid,
	pub total_routes: usize,
}

#[derive(Debug)]
pub struct GoldenRoute {
	pub record: GoldenRouteRecord,
	pub normalized_query: String,
	pub embedding: Vec<f32>,
}

/// Immutable, atomically swapped view of all golden routes. Readers clone the
/// `Arc` and never observe a half-reloaded state.
#[derive(Debug, Default)]
pub struct RouteSnapshot {
	pub entries: Vec<GoldenRoute>,
}
impl RouteSnapshot {
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// A single strategy for matching an incoming query against the snapshot.
/// Returns the entry index and a score in `[0, 1]`.
trait RouteMatcher
where
	Self: Send + Sync,
{
	fn name(&self) -> &'static str;

	fn needs_embedding(&self) -> bool;

	fn attempt(
		&self,
		normalized_query: &str,
		query_embedding: Option<&[f32]>,
		snapshot: &RouteSnapshot,
		default_threshold: f32,
	) -> Option<(usize, f32)>;
}

struct ExactQueryMatcher;

impl RouteMatcher for ExactQueryMatcher {
	fn name(&self) -> &'static str {
		"exact"
	}

	fn needs_embedding(&self) -> bool {
		false
	}

	fn attempt(
		&self,
		normalized_query: &str,
		_query_embedding: Option<&[f32]>,
		snapshot: &RouteSnapshot,
		_default_threshold: f32,
	) -> Option<(usize, f32)> {
		snapshot
			.entries
			.iter()
			.position(|entry| entry.normalized_query == normalized_query)
			.map(|index| (index, 1.0))
	}
}

struct EmbeddingSimilarityMatcher;

impl RouteMatcher for EmbeddingSimilarityMatcher {
	fn name(&self) -> &'static str {
		"embedding"
	}

	fn needs_embedding(&self) -> bool {
		true
	}

	fn attempt(
		&self,
		_normalized_query: &str,
		query_embedding: Option<&[f32]>,
		snapshot: &RouteSnapshot,
		default_threshold: f32,
	) -> Option<(usize, f32)> {
		let query_embedding = query_embedding?;
		let mut best: Option<(usize, f32)> = None;

		for (index, entry) in snapshot.entries.iter().enumerate() {
			let similarity = cosine_similarity(query_embedding, &entry.embedding);
			let threshold = entry.record.similarity_threshold.unwrap_or(default_threshold);

			if similarity < threshold {
				continue;
			}
			if best.is_none_or(|(_, score)| similarity > score) {
				best = Some((index, similarity));
			}
		}

		best
	}
}

// Cheapest first; the embedding matcher only runs on an exact-match miss.
static MATCHERS: &[&dyn RouteMatcher] = &[&ExactQueryMatcher, &EmbeddingSimilarityMatcher];

impl PanduService {
	/// Golden-route lookup: a miss is `None`, and the caller falls through to
	/// the full search pipeline.
	pub async fn route(&self, request: RouteRequest) -> ServiceResult<Option<RouteMatch>> {
		let query = request.query.trim().to_string();

		if query.is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "Query must not be empty.".to_string(),
			});
		}
		if let Some(user_id) = &request.user_id {
			tracing::debug!(%user_id, "Route lookup.");
		}

		self.match_golden(&query).await
	}

	/// Tries each matcher against the current snapshot. A hit bumps the
	/// route's usage counter without blocking the caller.
	pub async fn match_golden(&self, query: &str) -> ServiceResult<Option<RouteMatch>> {
		let snapshot = self.current_snapshot();

		if snapshot.is_empty() {
			return Ok(None);
		}

		let normalized = normalize_query(query);
		let threshold = self.cfg.golden.similarity_threshold;
		let mut query_embedding: Option<Vec<f32>> = None;

		for matcher in MATCHERS {
			// The embedder is the sole fatal dependency here; the exact
			// matcher before it never touches it.
			if matcher.needs_embedding() && query_embedding.is_none() {
				query_embedding = Some(self.embed_query(query).await?);
			}

			let Some((index, score)) =
				matcher.attempt(&normalized, query_embedding.as_deref(), &snapshot, threshold)
			else {
				continue;
			};
			let record = &snapshot.entries[index].record;

			tracing::info!(
				route_id = %record.route_id,
				matcher = matcher.name(),
				score,
				"Golden route hit."
			);
			self.spawn_usage_bump(record.route_id);

			return Ok(Some(RouteMatch {
				route_id: record.route_id,
				canonical_query: record.canonical_query.clone(),
				collections: record.collections.clone(),
				document_ids: record.document_ids.clone(),
				chapter_ids: record.chapter_ids.clone(),
				routing_hints: record.routing_hints.clone(),
				score,
				matched_by: matcher.name(),
			}));
		}

		Ok(None)
	}

	pub async fn add_route(&self, request: AddRouteRequest) -> ServiceResult<AddRouteResponse> {
		let canonical_query = request.canonical_query.trim().to_string();

		if canonical_query.is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "Canonical query must not be empty.".to_string(),
			});
		}
		if request.document_ids.is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "A route needs at least one document id.".to_string(),
			});
		}
		if let Some(threshold) = request.similarity_threshold
			&& !(0.0..=1.0).contains(&threshold)
		{
			return Err(ServiceError::InvalidRequest {
				message: "Similarity threshold must be within [0, 1].".to_string(),
			});
		}

		let collections = if request.collections.is_empty() {
			vec![self.router.fallback_collection().to_string()]
		} else {
			request.collections
		};
		let now = OffsetDateTime::now_utc();
		let record = GoldenRouteRecord {
			route_id: Uuid::new_v4(),
			canonical_query,
			document_ids: request.document_ids,
			chapter_ids: request.chapter_ids,
			collections,
			routing_hints: request.routing_hints.unwrap_or(Value::Null),
			similarity_threshold: request.similarity_threshold,
			usage_count: 0,
			created_at: now,
			updated_at: now,
			last_used_at: None,
		};

		self.providers
			.routes
			.insert_route(&record)
			.await
			.map_err(|err| ServiceError::Storage { message: err.to_string() })?;

		let total_routes = self.reload_routes().await?;

		tracing::info!(route_id = %record.route_id, total_routes, "Golden route added.");

		Ok(AddRouteResponse { route_id: record.route_id, total_routes })
	}

	/// Rebuilds the snapshot from storage, re-embedding every canonical query,
	/// then swaps it in atomically. Returns the route count.
	pub async fn reload_routes(&self) -> ServiceResult<usize> {
		let records = self
			.providers
			.routes
			.list_routes()
			.await
			.map_err(|err| ServiceError::Storage { message: err.to_string() })?;
		let queries: Vec<String> =
			records.iter().map(|record| record.canonical_query.clone()).collect();
		let embeddings = self.embed_batch(&queries).await?;

		if let Some(cache) = self.embed_cache()
			&& let Err(err) = cache.store(&embeddings)
		{
			// Cache is an optimization; a write failure never blocks reload.
			tracing::warn!(?err, path = %cache.path().display(), "Failed to persist embedding cache.");
		}

		Ok(self.publish_snapshot(records, embeddings))
	}

	pub(crate) fn publish_snapshot(
		&self,
		records: Vec<GoldenRouteRecord>,
		embeddings: Vec<Vec<f32>>,
	) -> usize {
		let entries: Vec<GoldenRoute> = records
			.into_iter()
			.zip(embeddings)
			.map(|(record, embedding)| GoldenRoute {
				normalized_query: normalize_query(&record.canonical_query),
				record,
				embedding,
			})
			.collect();
		let count = entries.len();
		let snapshot = Arc::new(RouteSnapshot { entries });

		*self.route_snapshot.write().unwrap_or_else(|err| err.into_inner()) = snapshot;

		tracing::info!(count, "Route snapshot published.");

		count
	}

	pub(crate) fn current_snapshot(&self) -> Arc<RouteSnapshot> {
		self.route_snapshot.read().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn spawn_usage_bump(&self, route_id: Uuid) {
		let routes = self.providers.routes.clone();

		tokio::spawn(async move {
			if let Err(err) = routes.bump_usage(route_id, OffsetDateTime::now_utc()).await {
				tracing::warn!(?err, %route_id, "Failed to bump route usage.");
			}
		});
	}
}

/// Loads the golden-route snapshot in the background so startup never blocks
/// on the embedding provider.
pub fn spawn_route_warmup(service: Arc<PanduService>) {
	tokio::spawn(async move {
		if let Err(err) = warm_routes(&service).await {
			tracing::warn!(?err, "Route warmup failed; snapshot stays empty until reload.");
		}
	});
}

async fn warm_routes(service: &PanduService) -> ServiceResult<()> {
	let records = service
		.providers
		.routes
		.list_routes()
		.await
		.map_err(|err| ServiceError::Storage { message: err.to_string() })?;

	if let Some(cache) = service.embed_cache() {
		match cache.load(records.len()) {
			Ok(Some(embeddings)) => {
				service.publish_snapshot(records, embeddings);

				return Ok(());
			},
			Ok(None) =>
				if cache.path().exists() {
					tracing::warn!(
						path = %cache.path().display(),
						"Embedding cache is stale; re-embedding all routes."
					);
				},
			Err(err) => {
				tracing::warn!(?err, "Failed to read embedding cache; re-embedding.");
			},
		}
	}

	let queries: Vec<String> =
		records.iter().map(|record| record.canonical_query.clone()).collect();
	let embeddings = service.embed_batch(&queries).await?;

	if let Some(cache) = service.embed_cache()
		&& let Err(err) = cache.store(&embeddings)
	{
		tracing::warn!(?err, "Failed to persist embedding cache.");
	}

	service.publish_snapshot(records, embeddings);

	Ok(())
}

/// Lowercases and collapses whitespace so trivially different spellings of
/// the same question match exactly.
pub fn normalize_query(query: &str) -> String {
	query.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
	if left.len() != right.len() || left.is_empty() {
		return 0.0;
	}

	let mut dot = 0.0_f32;
	let mut left_norm = 0.0_f32;
	let mut right_norm = 0.0_f32;

	for (l, r) in left.iter().zip(right) {
		dot += l * r;
		left_norm += l * l;
		right_norm += r * r;
	}

	if left_norm == 0.0 || right_norm == 0.0 {
		return 0.0;
	}

	dot / (left_norm.sqrt() * right_norm.sqrt())
}
