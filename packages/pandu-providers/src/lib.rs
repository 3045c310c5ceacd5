pub mod embedding;
pub mod rerank;

use color_eyre::Result;
use reqwest::header::{AUTHORIZATION, HeaderMap};

pub(crate) fn auth_headers(api_key: &str) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	Ok(headers)
}
