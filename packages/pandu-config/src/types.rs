use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub sparse: Sparse,
	pub router: Router,
	pub search: Search,
	pub golden: Golden,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: RerankProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default = "default_embed_batch")]
	pub max_batch: usize,
}

#[derive(Debug, Deserialize)]
pub struct RerankProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Sparse {
	#[serde(default = "default_k1")]
	pub k1: f32,
	#[serde(default = "default_b")]
	pub b: f32,
	#[serde(default = "default_vocab_size")]
	pub vocab_size: u32,
	#[serde(default = "default_min_token_len")]
	pub min_token_len: usize,
	#[serde(default = "default_max_token_len")]
	pub max_token_len: usize,
	#[serde(default = "default_avg_doc_length")]
	pub avg_doc_length: f32,
}

#[derive(Debug, Deserialize)]
pub struct Router {
	pub collections: Vec<RouterCollection>,
	#[serde(default = "default_confidence_floor")]
	pub confidence_floor: f32,
	pub fallback_collection: String,
	#[serde(default = "default_multi_route_margin")]
	pub multi_route_margin: f32,
}

#[derive(Debug, Deserialize)]
pub struct RouterCollection {
	pub name: String,
	pub domain: String,
	pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Search {
	#[serde(default = "default_rrf_k")]
	pub rrf_k: u32,
	#[serde(default = "default_candidate_k")]
	pub candidate_k: u32,
	#[serde(default = "default_limit")]
	pub default_limit: u32,
	#[serde(default = "default_vector_timeout_ms")]
	pub vector_timeout_ms: u64,
	#[serde(default = "default_retry_backoff_ms")]
	pub retry_backoff_ms: u64,
	pub rerank: RerankPolicy,
}

#[derive(Debug, Deserialize)]
pub struct RerankPolicy {
	/// One of "auto", "always", or "off".
	pub mode: String,
	#[serde(default = "default_low_confidence")]
	pub low_confidence: f32,
	#[serde(default = "default_high_confidence")]
	pub high_confidence: f32,
	#[serde(default = "default_rerank_top_k")]
	pub top_k: u32,
}

#[derive(Debug, Deserialize)]
pub struct Golden {
	#[serde(default = "default_similarity_threshold")]
	pub similarity_threshold: f32,
	pub embed_cache_path: Option<String>,
}

fn default_embed_batch() -> usize {
	64
}

fn default_k1() -> f32 {
	1.5
}

fn default_b() -> f32 {
	0.75
}

fn default_vocab_size() -> u32 {
	30_000
}

fn default_min_token_len() -> usize {
	2
}

fn default_max_token_len() -> usize {
	40
}

fn default_avg_doc_length() -> f32 {
	160.0
}

fn default_confidence_floor() -> f32 {
	0.2
}

fn default_multi_route_margin() -> f32 {
	0.15
}

fn default_rrf_k() -> u32 {
	60
}

fn default_candidate_k() -> u32 {
	50
}

fn default_limit() -> u32 {
	10
}

fn default_vector_timeout_ms() -> u64 {
	2_500
}

fn default_retry_backoff_ms() -> u64 {
	250
}

fn default_low_confidence() -> f32 {
	0.5
}

fn default_high_confidence() -> f32 {
	0.9
}

fn default_rerank_top_k() -> u32 {
	20
}

fn default_similarity_threshold() -> f32 {
	0.85
}
