pub fn render_schema() -> String {
	r#"
CREATE TABLE IF NOT EXISTS golden_routes (
	route_id UUID PRIMARY KEY,
	canonical_query TEXT NOT NULL,
	document_ids JSONB NOT NULL,
	chapter_ids JSONB,
	collections JSONB NOT NULL,
	routing_hints JSONB,
	similarity_threshold REAL,
	usage_count BIGINT NOT NULL DEFAULT 0,
	created_at TIMESTAMPTZ NOT NULL,
	updated_at TIMESTAMPTZ NOT NULL,
	last_used_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_golden_routes_created_at
	ON golden_routes (created_at)
"#
	.to_string()
}
