mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Golden, Postgres, Providers, Qdrant, RerankPolicy,
	RerankProviderConfig, Router, RouterCollection, Search, Service, Sparse, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::Read { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::Parse { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

fn invalid(field: &'static str, expected: &'static str) -> Error {
	Error::Invalid { field, expected }
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(invalid("service.http_bind", "a non-empty bind address"));
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(invalid("providers.embedding.dimensions", "a value greater than zero"));
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(invalid(
			"providers.embedding.dimensions",
			"the same value as storage.qdrant.vector_dim",
		));
	}
	if cfg.sparse.vocab_size == 0 {
		return Err(invalid("sparse.vocab_size", "a value greater than zero"));
	}
	if cfg.sparse.k1 <= 0.0 {
		return Err(invalid("sparse.k1", "a value greater than zero"));
	}
	if !(0.0..=1.0).contains(&cfg.sparse.b) {
		return Err(invalid("sparse.b", "a value within [0, 1]"));
	}
	if cfg.sparse.min_token_len == 0 || cfg.sparse.min_token_len > cfg.sparse.max_token_len {
		return Err(invalid("sparse.min_token_len", "a non-zero value no greater than sparse.max_token_len"));
	}
	if cfg.sparse.avg_doc_length < 1.0 {
		return Err(invalid("sparse.avg_doc_length", "a value of at least one"));
	}
	if cfg.router.collections.is_empty() {
		return Err(invalid("router.collections", "at least one collection"));
	}
	if !cfg.router.collections.iter().any(|c| c.name == cfg.router.fallback_collection) {
		return Err(invalid("router.fallback_collection", "the name of a configured collection"));
	}
	if !(0.0..=1.0).contains(&cfg.router.confidence_floor) {
		return Err(invalid("router.confidence_floor", "a value within [0, 1]"));
	}
	if cfg.router.multi_route_margin < 0.0 {
		return Err(invalid("router.multi_route_margin", "zero or greater"));
	}
	if cfg.search.rrf_k == 0 {
		return Err(invalid("search.rrf_k", "a value greater than zero"));
	}
	if cfg.search.candidate_k == 0 {
		return Err(invalid("search.candidate_k", "a value greater than zero"));
	}
	if cfg.search.default_limit == 0 {
		return Err(invalid("search.default_limit", "a value greater than zero"));
	}
	if !matches!(cfg.search.rerank.mode.as_str(), "auto" | "always" | "off") {
		return Err(invalid("search.rerank.mode", "one of auto, always, or off"));
	}
	if cfg.search.rerank.low_confidence > cfg.search.rerank.high_confidence {
		return Err(invalid(
			"search.rerank.low_confidence",
			"a value no greater than search.rerank.high_confidence",
		));
	}
	if !(cfg.golden.similarity_threshold > 0.0 && cfg.golden.similarity_threshold <= 1.0) {
		return Err(invalid("golden.similarity_threshold", "a value within (0, 1]"));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.search.rerank.mode = cfg.search.rerank.mode.trim().to_lowercase();

	for collection in &mut cfg.router.collections {
		collection.name = collection.name.trim().to_string();
		collection.domain = collection.domain.trim().to_lowercase();

		for keyword in &mut collection.keywords {
			*keyword = keyword.trim().to_lowercase();
		}

		collection.keywords.retain(|keyword| !keyword.is_empty());
	}
}
