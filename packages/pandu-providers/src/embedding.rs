use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

/// Embeds a batch of texts, splitting into provider-sized sub-batches. Output
/// order matches input order.
pub async fn embed(
	cfg: &pandu_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	if texts.is_empty() {
		return Ok(Vec::new());
	}

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let batch = cfg.max_batch.max(1);
	let mut out = Vec::with_capacity(texts.len());

	for chunk in texts.chunks(batch) {
		let body = serde_json::json!({
			"model": cfg.model,
			"input": chunk,
			"dimensions": cfg.dimensions,
		});
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;
		let vectors = parse_embedding_response(json)?;

		if vectors.len() != chunk.len() {
			return Err(eyre::eyre!("Embedding provider returned mismatched vector count."));
		}

		out.extend(vectors);
	}

	Ok(out)
}

pub async fn embed_one(
	cfg: &pandu_config::EmbeddingProviderConfig,
	text: &str,
) -> Result<Vec<f32>> {
	let vectors = embed(cfg, std::slice::from_ref(&text.to_string())).await?;

	vectors
		.into_iter()
		.next()
		.ok_or_else(|| eyre::eyre!("Embedding provider returned no vectors."))
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json
		.get("data")
		.and_then(|v| v.as_array())
		.ok_or_else(|| eyre::eyre!("Embedding response is missing data array."))?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item
			.get("embedding")
			.and_then(|v| v.as_array())
			.ok_or_else(|| eyre::eyre!("Embedding item missing embedding array."))?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number =
				value.as_f64().ok_or_else(|| eyre::eyre!("Embedding value must be numeric."))?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
