use std::collections::HashMap;

use qdrant_client::qdrant::{
	Condition, Filter, PointId, Query, QueryPointsBuilder, ScoredPoint, Value, VectorInput,
	point_id::PointIdOptions, value::Kind,
};

use pandu_domain::{
	access::{STATUS_REPEALED, TierPredicate},
	sparse::SparseVector,
};

use crate::{Result, models::ChunkHit};

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const SPARSE_VECTOR_NAME: &str = "lexical";

const STATUS_ACTIVE: &str = "active";

pub struct VectorStore {
	pub client: qdrant_client::Qdrant,
	pub vector_dim: u32,
}
impl VectorStore {
	pub fn new(cfg: &pandu_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, vector_dim: cfg.vector_dim })
	}

	pub async fn dense_search(
		&self,
		collection: &str,
		vector: &[f32],
		predicate: Option<&TierPredicate>,
		limit: u64,
	) -> Result<Vec<ChunkHit>> {
		let mut builder = QueryPointsBuilder::new(collection)
			.query(Query::new_nearest(vector.to_vec()))
			.using(DENSE_VECTOR_NAME)
			.limit(limit)
			.with_payload(true);

		if let Some(filter) = payload_filter(predicate) {
			builder = builder.filter(filter);
		}

		let response = self.client.query(builder).await?;

		Ok(collect_hits(collection, response.result))
	}

	pub async fn sparse_search(
		&self,
		collection: &str,
		sparse: &SparseVector,
		predicate: Option<&TierPredicate>,
		limit: u64,
	) -> Result<Vec<ChunkHit>> {
		if sparse.is_empty() {
			return Ok(Vec::new());
		}

		let input = VectorInput::new_sparse(sparse.indices.clone(), sparse.values.clone());
		let mut builder = QueryPointsBuilder::new(collection)
			.query(Query::new_nearest(input))
			.using(SPARSE_VECTOR_NAME)
			.limit(limit)
			.with_payload(true);

		if let Some(filter) = payload_filter(predicate) {
			builder = builder.filter(filter);
		}

		let response = self.client.query(builder).await?;

		Ok(collect_hits(collection, response.result))
	}
}

fn payload_filter(predicate: Option<&TierPredicate>) -> Option<Filter> {
	let predicate = predicate?;
	let must = vec![Condition::matches("tier", predicate.allowed_tiers.clone())];
	let must_not = if predicate.exclude_repealed {
		vec![Condition::matches("status", STATUS_REPEALED.to_string())]
	} else {
		Vec::new()
	};

	Some(Filter { must, should: Vec::new(), must_not, min_should: None })
}

fn collect_hits(collection: &str, points: Vec<ScoredPoint>) -> Vec<ChunkHit> {
	let mut out = Vec::with_capacity(points.len());

	for point in points {
		let Some(id) = point.id.as_ref().and_then(point_id_text) else {
			tracing::warn!(collection, "Scored point missing id.");

			continue;
		};
		let Some(text) = payload_string(&point.payload, "text") else {
			tracing::warn!(collection, point_id = %id, "Scored point missing text payload.");

			continue;
		};
		let Some(tier) = payload_string(&point.payload, "tier") else {
			// Visibility cannot be proven without a tier label; drop the hit.
			tracing::warn!(collection, point_id = %id, "Scored point missing tier payload.");

			continue;
		};
		let status = payload_string(&point.payload, "status")
			.unwrap_or_else(|| STATUS_ACTIVE.to_string());

		out.push(ChunkHit {
			id,
			text,
			score: point.score,
			tier,
			status,
			domain: payload_string(&point.payload, "domain"),
			collection: collection.to_string(),
			position: payload_i32(&point.payload, "position"),
			source_document: payload_string(&point.payload, "source_document"),
		});
	}

	out
}

fn point_id_text(point_id: &PointId) -> Option<String> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Some(id.clone()),
		Some(PointIdOptions::Num(id)) => Some(id.to_string()),
		None => None,
	}
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

fn payload_i32(payload: &HashMap<String, Value>, key: &str) -> Option<i32> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::IntegerValue(value)) => i32::try_from(*value).ok(),
		Some(Kind::DoubleValue(value)) =>
			if value.fract() == 0.0 {
				i32::try_from(*value as i64).ok()
			} else {
				None
			},
		_ => None,
	}
}
