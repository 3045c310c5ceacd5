use std::{
	collections::{BTreeMap, HashMap},
	sync::LazyLock,
};

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::stopwords;

/// Lexical term weights over a hashed vocabulary. Indices are unique and
/// ascending; values are rounded to four decimal places.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SparseVector {
	pub indices: Vec<u32>,
	pub values: Vec<f32>,
}
impl SparseVector {
	pub fn empty() -> Self {
		Self { indices: Vec::new(), values: Vec::new() }
	}

	pub fn is_empty(&self) -> bool {
		self.indices.is_empty()
	}

	pub fn len(&self) -> usize {
		self.indices.len()
	}
}

// Regulation and classification references such as "KBLI 56101", "PP 28/2025",
// or "UU No. 11/2020" must survive tokenization as single tokens.
static CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(
		r"(?i)\b(kbli|kitas|kitap|npwp|uu|pp|perpres|perppu|permen[a-z]*|pmk|pojk|kepmen[a-z]*)[\s.]*(?:no\.?\s*)?(\d+[a-z]?(?:[./-]\d+)*)",
	)
	.expect("code pattern must compile")
});

#[derive(Debug, Clone)]
pub struct SparseVectorizer {
	k1: f32,
	b: f32,
	vocab_size: u32,
	min_token_len: usize,
	max_token_len: usize,
	avg_doc_length: f32,
}
impl SparseVectorizer {
	pub fn new(cfg: &pandu_config::Sparse) -> Self {
		Self {
			k1: cfg.k1,
			b: cfg.b,
			vocab_size: cfg.vocab_size.max(1),
			min_token_len: cfg.min_token_len,
			max_token_len: cfg.max_token_len,
			avg_doc_length: cfg.avg_doc_length.max(1.0),
		}
	}

	pub fn vocab_size(&self) -> u32 {
		self.vocab_size
	}

	pub fn avg_doc_length(&self) -> f32 {
		self.avg_doc_length
	}

	/// Replaces the corpus-wide length-normalization constant. Must be called
	/// after bulk reingestion changes the corpus profile.
	pub fn update_avg_doc_length(&mut self, avg_doc_length: f32) {
		self.avg_doc_length = avg_doc_length.max(1.0);
	}

	pub fn tokenize(&self, text: &str) -> Vec<String> {
		let normalized = text.nfkc().collect::<String>().to_lowercase();
		let fused = CODE_PATTERN.replace_all(&normalized, |caps: &regex::Captures<'_>| {
			format!("{}{}", &caps[1], caps[2].replace(['.', '/', '-'], "_"))
		});
		let mut stripped = String::with_capacity(fused.len());

		for ch in fused.chars() {
			if ch.is_alphanumeric() || ch == '_' {
				stripped.push(ch);
			} else {
				stripped.push(' ');
			}
		}

		let stop_list = stop_list_for(&normalized);
		let mut out = Vec::new();

		for token in stripped.split_whitespace() {
			if stop_list.contains(&token) {
				continue;
			}

			let chars = token.chars().count();

			if chars < self.min_token_len || chars > self.max_token_len {
				continue;
			}
			// Bare short numbers carry no lexical signal; fused code tokens
			// always contain letters and pass through.
			if chars < 4 && token.chars().all(|ch| ch.is_ascii_digit()) {
				continue;
			}

			out.push(token.to_string());
		}

		out
	}

	/// BM25-style term weights for a document, length-normalized against the
	/// corpus average. Hash collisions are summed, never overwritten.
	pub fn compute_document_vector(&self, text: &str) -> SparseVector {
		let tokens = self.tokenize(text);

		if tokens.is_empty() {
			return SparseVector::empty();
		}

		let doc_length = tokens.len() as f32;
		let mut counts: HashMap<String, u32> = HashMap::new();

		for token in tokens {
			*counts.entry(token).or_insert(0) += 1;
		}

		let norm = 1.0 - self.b + self.b * (doc_length / self.avg_doc_length);
		let mut accumulated: BTreeMap<u32, f32> = BTreeMap::new();

		for (token, count) in counts {
			let count = count as f32;
			let tf = count * (self.k1 + 1.0) / (count + self.k1 * norm);

			*accumulated.entry(self.token_index(&token)).or_insert(0.0) += tf;
		}

		collect_rounded(accumulated)
	}

	/// Length-unnormalized query weights: `ln(1 + count)` per token, with the
	/// same hashing, collision summation, and rounding as documents.
	pub fn compute_query_vector(&self, text: &str) -> SparseVector {
		let tokens = self.tokenize(text);

		if tokens.is_empty() {
			return SparseVector::empty();
		}

		let mut counts: HashMap<String, u32> = HashMap::new();

		for token in tokens {
			*counts.entry(token).or_insert(0) += 1;
		}

		let mut accumulated: BTreeMap<u32, f32> = BTreeMap::new();

		for (token, count) in counts {
			let score = (1.0 + count as f32).ln();

			*accumulated.entry(self.token_index(&token)).or_insert(0.0) += score;
		}

		collect_rounded(accumulated)
	}

	fn token_index(&self, token: &str) -> u32 {
		let hash = blake3::hash(token.as_bytes());
		let mut bytes = [0_u8; 8];

		bytes.copy_from_slice(&hash.as_bytes()[..8]);

		(u64::from_le_bytes(bytes) % u64::from(self.vocab_size)) as u32
	}
}

fn collect_rounded(accumulated: BTreeMap<u32, f32>) -> SparseVector {
	let mut indices = Vec::with_capacity(accumulated.len());
	let mut values = Vec::with_capacity(accumulated.len());

	for (index, value) in accumulated {
		indices.push(index);
		values.push(round4(value));
	}

	SparseVector { indices, values }
}

fn round4(value: f32) -> f32 {
	(value * 10_000.0).round() / 10_000.0
}

fn stop_list_for(text: &str) -> &'static [&'static str] {
	match whatlang::detect_lang(text) {
		Some(whatlang::Lang::Ind) => stopwords::INDONESIAN,
		_ => stopwords::ENGLISH,
	}
}
