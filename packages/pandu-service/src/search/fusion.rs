use std::collections::{HashMap, HashSet};

use pandu_storage::models::ChunkHit;

/// One ranked result list from a single retrieval branch. `source` labels the
/// branch (e.g. "legal_regulations/dense") for degradation reporting.
#[derive(Debug)]
pub struct RankedList {
	pub source: String,
	pub hits: Vec<ChunkHit>,
}

#[derive(Debug, Clone)]
pub struct FusedHit {
	pub hit: ChunkHit,
	pub fused_score: f32,
	pub appearances: u32,
	pub best_rank: u32,
	pub rerank_score: Option<f32>,
}

/// Reciprocal rank fusion over branch result lists: each hit contributes
/// `1 / (k + rank)` per list it appears in, ranks starting at 1. The first
/// occurrence of a chunk id supplies its payload. Output is sorted by fused
/// score descending, then id ascending, so equal inputs always fuse to the
/// same order.
pub fn reciprocal_rank_fusion(lists: &[RankedList], k: u32) -> Vec<FusedHit> {
	let mut fused: HashMap<&str, FusedHit> = HashMap::new();

	for list in lists {
		// A chunk may not score twice from the same list.
		let mut seen = HashSet::new();

		for (position, hit) in list.hits.iter().enumerate() {
			if !seen.insert(hit.id.as_str()) {
				continue;
			}

			let rank = position as u32 + 1;
			let contribution = 1.0 / (k + rank) as f32;

			fused
				.entry(hit.id.as_str())
				.and_modify(|entry| {
					entry.fused_score += contribution;
					entry.appearances += 1;
					entry.best_rank = entry.best_rank.min(rank);
				})
				.or_insert_with(|| FusedHit {
					hit: hit.clone(),
					fused_score: contribution,
					appearances: 1,
					best_rank: rank,
					rerank_score: None,
				});
		}
	}

	let mut out: Vec<FusedHit> = fused.into_values().collect();

	out.sort_by(|left, right| {
		right
			.fused_score
			.partial_cmp(&left.fused_score)
			.unwrap_or(std::cmp::Ordering::Equal)
			.then_with(|| left.hit.id.cmp(&right.hit.id))
	});
	out
}

/// Normalizes the top fused score against the best score achievable, i.e. a
/// hit ranked first in every contributing list. Used to gate reranking in
/// "auto" mode.
pub fn top_confidence(top: Option<&FusedHit>, list_count: usize, k: u32) -> f32 {
	let Some(top) = top else {
		return 0.0;
	};
	if list_count == 0 {
		return 0.0;
	}

	let perfect = list_count as f32 / (k + 1) as f32;

	(top.fused_score / perfect).clamp(0.0, 1.0)
}
