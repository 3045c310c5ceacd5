use std::{
	fs,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::Result;

/// On-disk snapshot of canonical-query embeddings, aligned positionally with
/// the route listing. Validity is judged by record count only, not content;
/// a mismatch means the snapshot is stale and must be regenerated.
pub struct EmbedCache {
	path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
	embeddings: Vec<Vec<f32>>,
}

impl EmbedCache {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Returns the cached embeddings when the record count matches, `None`
	/// when the file is absent or stale.
	pub fn load(&self, expected_count: usize) -> Result<Option<Vec<Vec<f32>>>> {
		if !self.path.exists() {
			return Ok(None);
		}

		let raw = fs::read_to_string(&self.path)?;
		let parsed: CacheFile = serde_json::from_str(&raw)?;

		if parsed.embeddings.len() != expected_count {
			return Ok(None);
		}

		Ok(Some(parsed.embeddings))
	}

	pub fn store(&self, embeddings: &[Vec<f32>]) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent)?;
		}

		let file = CacheFile { embeddings: embeddings.to_vec() };

		fs::write(&self.path, serde_json::to_string(&file)?)?;

		Ok(())
	}
}
