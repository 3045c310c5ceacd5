use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result, models::GoldenRouteRecord};

#[derive(Debug, sqlx::FromRow)]
struct RouteRow {
	route_id: Uuid,
	canonical_query: String,
	document_ids: Value,
	chapter_ids: Option<Value>,
	collections: Value,
	routing_hints: Option<Value>,
	similarity_threshold: Option<f32>,
	usage_count: i64,
	created_at: OffsetDateTime,
	updated_at: OffsetDateTime,
	last_used_at: Option<OffsetDateTime>,
}

pub async fn insert_route(pool: &PgPool, record: &GoldenRouteRecord) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO golden_routes (
	route_id,
	canonical_query,
	document_ids,
	chapter_ids,
	collections,
	routing_hints,
	similarity_threshold,
	usage_count,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
	)
	.bind(record.route_id)
	.bind(record.canonical_query.as_str())
	.bind(serde_json::to_value(&record.document_ids)?)
	.bind(serde_json::to_value(&record.chapter_ids)?)
	.bind(serde_json::to_value(&record.collections)?)
	.bind(record.routing_hints.clone())
	.bind(record.similarity_threshold)
	.bind(record.usage_count)
	.bind(record.created_at)
	.bind(record.updated_at)
	.execute(pool)
	.await?;

	Ok(())
}

/// All routes in creation order. The order is load-bearing: the disk-cached
/// embedding snapshot is aligned positionally with this listing.
pub async fn list_routes(pool: &PgPool) -> Result<Vec<GoldenRouteRecord>> {
	let rows: Vec<RouteRow> = sqlx::query_as(
		"\
SELECT
	route_id,
	canonical_query,
	document_ids,
	chapter_ids,
	collections,
	routing_hints,
	similarity_threshold,
	usage_count,
	created_at,
	updated_at,
	last_used_at
FROM golden_routes
ORDER BY created_at, route_id",
	)
	.fetch_all(pool)
	.await?;
	let mut out = Vec::with_capacity(rows.len());

	for row in rows {
		out.push(decode_route(row)?);
	}

	Ok(out)
}

pub async fn bump_usage(pool: &PgPool, route_id: Uuid, now: OffsetDateTime) -> Result<()> {
	sqlx::query(
		"\
UPDATE golden_routes
SET usage_count = usage_count + 1,
	last_used_at = $2,
	updated_at = $2
WHERE route_id = $1",
	)
	.bind(route_id)
	.bind(now)
	.execute(pool)
	.await?;

	Ok(())
}

fn decode_route(row: RouteRow) -> Result<GoldenRouteRecord> {
	let document_ids: Vec<String> = serde_json::from_value(row.document_ids)
		.map_err(|err| Error::InvalidRecord(format!("document_ids: {err}")))?;
	let chapter_ids: Vec<String> = match row.chapter_ids {
		Some(Value::Null) | None => Vec::new(),
		Some(value) => serde_json::from_value(value)
			.map_err(|err| Error::InvalidRecord(format!("chapter_ids: {err}")))?,
	};
	let collections: Vec<String> = serde_json::from_value(row.collections)
		.map_err(|err| Error::InvalidRecord(format!("collections: {err}")))?;

	Ok(GoldenRouteRecord {
		route_id: row.route_id,
		canonical_query: row.canonical_query,
		document_ids,
		chapter_ids,
		collections,
		routing_hints: row.routing_hints.unwrap_or(Value::Null),
		similarity_threshold: row.similarity_threshold,
		usage_count: row.usage_count,
		created_at: row.created_at,
		updated_at: row.updated_at,
		last_used_at: row.last_used_at,
	})
}
