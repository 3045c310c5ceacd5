pub mod fusion;

use std::{
	collections::HashMap,
	sync::Arc,
	time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use pandu_domain::{
	access::{self, TierPredicate},
	sparse::SparseVector,
};
use pandu_storage::models::ChunkHit;

use crate::{
	PanduService, ServiceError, ServiceResult, VectorSearchProvider,
	search::fusion::{FusedHit, RankedList, reciprocal_rank_fusion, top_confidence},
};

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub access_level: u8,
	#[serde(default)]
	pub tier_filter: Option<Vec<String>>,
	#[serde(default)]
	pub include_repealed: bool,
	#[serde(default = "default_apply_filters")]
	pub apply_filters: bool,
	#[serde(default)]
	pub collection_override: Option<String>,
	#[serde(default)]
	pub domain_hint: Option<String>,
	#[serde(default)]
	pub limit: Option<u32>,
}

fn default_apply_filters() -> bool {
	true
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
	pub results: Vec<SearchItem>,
	pub total_found: usize,
	pub execution_time_ms: u64,
	pub collections_used: Vec<String>,
	pub domain_scores: HashMap<String, f32>,
	pub reranked: bool,
	/// Branch labels (e.g. "tax_finance/sparse") that failed and were dropped
	/// from fusion, plus "rerank" when the reranker was skipped on error.
	pub degraded: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchItem {
	pub id: String,
	pub text: String,
	pub score: f32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rerank_score: Option<f32>,
	pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkMetadata {
	pub tier: String,
	pub status: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,
	pub collection: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub position: Option<i32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub source_document: Option<String>,
}

enum BranchQuery {
	Dense(Arc<Vec<f32>>),
	Sparse(Arc<SparseVector>),
}

impl PanduService {
	pub async fn search(&self, request: SearchRequest) -> ServiceResult<SearchResponse> {
		let started = Instant::now();
		let query = request.query.trim().to_string();

		if query.is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "Query must not be empty.".to_string(),
			});
		}
		if request.access_level > access::MAX_ACCESS_LEVEL {
			return Err(ServiceError::InvalidRequest {
				message: format!(
					"Access level {} exceeds maximum {}.",
					request.access_level,
					access::MAX_ACCESS_LEVEL
				),
			});
		}
		if request.limit == Some(0) {
			return Err(ServiceError::InvalidRequest {
				message: "Limit must be at least 1.".to_string(),
			});
		}

		let limit = request.limit.unwrap_or(self.cfg.search.default_limit) as usize;
		let decision = match &request.collection_override {
			Some(collection) => crate::RouteDecision::pinned(collection.clone()),
			None => self.router.route(&query, request.domain_hint.as_deref()),
		};

		tracing::debug!(
			collections = ?decision.collections,
			confidence = decision.confidence,
			pinned = decision.pinned,
			"Routed query."
		);

		let predicate = if request.apply_filters {
			let predicate = access::build_predicate(
				request.access_level,
				request.tier_filter.as_deref(),
				request.include_repealed,
			);

			if predicate.allowed_tiers.is_empty() {
				// The tier filter excluded everything the caller may see.
				return Ok(SearchResponse {
					results: Vec::new(),
					total_found: 0,
					execution_time_ms: started.elapsed().as_millis() as u64,
					collections_used: decision.collections,
					domain_scores: decision.domain_scores,
					reranked: false,
					degraded: Vec::new(),
				});
			}

			Some(predicate)
		} else {
			None
		};

		// Dense and sparse query representations are independent.
		let (dense, sparse) = tokio::join!(self.embed_query(&query), async {
			self.sparse_query_vector(&query)
		});
		let dense = Arc::new(dense?);
		let sparse = Arc::new(sparse);

		let (lists, degraded_branches) =
			self.fan_out(&decision.collections, dense, sparse, predicate.as_ref()).await?;
		let mut degraded = degraded_branches;
		let mut fused = reciprocal_rank_fusion(&lists, self.cfg.search.rrf_k);
		let confidence = top_confidence(fused.first(), lists.len(), self.cfg.search.rrf_k);

		fused.truncate(limit);

		let mut reranked = false;

		if self.should_rerank(confidence, fused.len()) {
			match self.rerank_candidates(&query, &mut fused).await {
				Ok(()) => reranked = true,
				Err(err) => {
					tracing::warn!(?err, "Reranker unavailable; keeping fused order.");
					degraded.push("rerank".to_string());
				},
			}
		}

		if let Some(predicate) = &predicate {
			fused.retain(|entry| predicate.matches(&entry.hit.tier, &entry.hit.status));
		}

		let total_found = fused.len();

		let results = fused
			.into_iter()
			.map(|entry| SearchItem {
				id: entry.hit.id,
				text: entry.hit.text,
				score: entry.fused_score,
				rerank_score: entry.rerank_score,
				metadata: ChunkMetadata {
					tier: entry.hit.tier,
					status: entry.hit.status,
					domain: entry.hit.domain,
					collection: entry.hit.collection,
					position: entry.hit.position,
					source_document: entry.hit.source_document,
				},
			})
			.collect();

		Ok(SearchResponse {
			results,
			total_found,
			execution_time_ms: started.elapsed().as_millis() as u64,
			collections_used: decision.collections,
			domain_scores: decision.domain_scores,
			reranked,
			degraded,
		})
	}

	/// Runs one dense and one sparse branch per routed collection. Failed
	/// branches degrade the response; only a total loss is an error.
	async fn fan_out(
		&self,
		collections: &[String],
		dense: Arc<Vec<f32>>,
		sparse: Arc<SparseVector>,
		predicate: Option<&TierPredicate>,
	) -> ServiceResult<(Vec<RankedList>, Vec<String>)> {
		let predicate = Arc::new(predicate.cloned());
		let candidate_k = self.cfg.search.candidate_k as u64;
		let timeout = Duration::from_millis(self.cfg.search.vector_timeout_ms);
		let backoff = Duration::from_millis(self.cfg.search.retry_backoff_ms);
		let mut set = JoinSet::new();

		for collection in collections {
			for query in [
				BranchQuery::Dense(dense.clone()),
				BranchQuery::Sparse(sparse.clone()),
			] {
				let vectors = self.providers.vectors.clone();
				let predicate = predicate.clone();
				let collection = collection.clone();

				set.spawn(async move {
					search_branch(vectors, collection, query, predicate, candidate_k, timeout, backoff)
						.await
				});
			}
		}

		let mut lists = Vec::new();
		let mut degraded = Vec::new();

		while let Some(joined) = set.join_next().await {
			let Ok((source, outcome)) = joined else {
				tracing::warn!("Search branch task aborted.");
				degraded.push("unknown".to_string());
				continue;
			};

			match outcome {
				Ok(hits) => lists.push(RankedList { source, hits }),
				Err(reason) => {
					tracing::warn!(%source, %reason, "Search branch failed; degrading.");
					degraded.push(source);
				},
			}
		}

		if lists.is_empty() {
			return Err(ServiceError::ServiceUnavailable {
				message: "All retrieval branches failed.".to_string(),
			});
		}

		// Task completion order is nondeterministic; fusion input must not be.
		lists.sort_by(|left, right| left.source.cmp(&right.source));
		degraded.sort();

		Ok((lists, degraded))
	}

	fn should_rerank(&self, confidence: f32, candidates: usize) -> bool {
		if candidates < 2 {
			return false;
		}

		let policy = &self.cfg.search.rerank;

		match policy.mode.as_str() {
			"off" => false,
			// Even in always mode, a top hit clearing the high bar skips the
			// reranker call.
			"always" => confidence < policy.high_confidence,
			_ => confidence < policy.low_confidence,
		}
	}

	/// Reranks the head of the fused list in place. The tail keeps its fused
	/// order behind the reranked prefix.
	async fn rerank_candidates(
		&self,
		query: &str,
		fused: &mut [FusedHit],
	) -> color_eyre::Result<()> {
		let cfg = &self.cfg.providers.rerank;
		let top_k = (self.cfg.search.rerank.top_k as usize).min(fused.len());
		let head = &mut fused[..top_k];
		let docs: Vec<String> = head.iter().map(|entry| entry.hit.text.clone()).collect();
		let scores = tokio::time::timeout(
			Duration::from_millis(cfg.timeout_ms),
			self.providers.rerank.rerank(cfg, query, &docs),
		)
		.await
		.map_err(|_| color_eyre::eyre::eyre!("reranker timed out"))??;

		if scores.len() != docs.len() {
			return Err(color_eyre::eyre::eyre!("reranker returned mismatched score count"));
		}

		for (entry, score) in head.iter_mut().zip(&scores) {
			entry.rerank_score = Some(*score);
		}

		// Stable, so reranker ties preserve fused order.
		head.sort_by(|left, right| {
			right
				.rerank_score
				.partial_cmp(&left.rerank_score)
				.unwrap_or(std::cmp::Ordering::Equal)
		});

		Ok(())
	}
}

async fn search_branch(
	vectors: Arc<dyn VectorSearchProvider>,
	collection: String,
	query: BranchQuery,
	predicate: Arc<Option<TierPredicate>>,
	limit: u64,
	timeout: Duration,
	backoff: Duration,
) -> (String, Result<Vec<ChunkHit>, String>) {
	let source = match &query {
		BranchQuery::Dense(_) => format!("{collection}/dense"),
		BranchQuery::Sparse(_) => format!("{collection}/sparse"),
	};
	let mut retried = false;

	loop {
		let fut = match &query {
			BranchQuery::Dense(vector) =>
				vectors.dense_search(&collection, vector, (*predicate).as_ref(), limit),
			BranchQuery::Sparse(sparse) =>
				vectors.sparse_search(&collection, sparse, (*predicate).as_ref(), limit),
		};

		match tokio::time::timeout(timeout, fut).await {
			Ok(Ok(hits)) => return (source, Ok(hits)),
			// Transport or store errors are not retried.
			Ok(Err(err)) => return (source, Err(err.to_string())),
			Err(_) if !retried => {
				tracing::warn!(%source, "Vector search timed out; retrying once.");
				retried = true;

				tokio::time::sleep(backoff).await;
			},
			Err(_) => return (source, Err("timed out after retry".to_string())),
		}
	}
}
