use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// A persisted golden route: a canonical query mapped to a known-good set of
/// documents and collections.
#[derive(Debug, Clone)]
pub struct GoldenRouteRecord {
	pub route_id: Uuid,
	pub canonical_query: String,
	pub document_ids: Vec<String>,
	pub chapter_ids: Vec<String>,
	pub collections: Vec<String>,
	pub routing_hints: Value,
	pub similarity_threshold: Option<f32>,
	pub usage_count: i64,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub last_used_at: Option<OffsetDateTime>,
}

/// One candidate chunk returned by a vector-store branch.
#[derive(Debug, Clone)]
pub struct ChunkHit {
	pub id: String,
	pub text: String,
	pub score: f32,
	pub tier: String,
	pub status: String,
	pub domain: Option<String>,
	pub collection: String,
	pub position: Option<i32>,
	pub source_document: Option<String>,
}
