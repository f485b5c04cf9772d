mod error;

pub use error::{Error, Result};

use std::{
	collections::HashMap,
	fs,
	path::{Path, PathBuf},
	sync::atomic::{AtomicUsize, Ordering},
};

use tempfile::TempDir;
use time::OffsetDateTime;

use km_domain::{Record, text};
use km_providers::{BoxFuture, EmbeddingGenerator};

/// Scratch directory removed on drop.
pub struct TestDir {
	inner: TempDir,
}
impl TestDir {
	pub fn new() -> Result<Self> {
		Ok(Self { inner: tempfile::Builder::new().prefix("km_test_").tempdir()? })
	}

	pub fn root(&self) -> &Path {
		self.inner.path()
	}

	pub fn path(&self, name: &str) -> PathBuf {
		self.inner.path().join(name)
	}

	pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
		let path = self.path(name);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}

		fs::write(&path, contents)?;

		Ok(path)
	}
}

/// Returns preset vectors for known texts and fails for anything else.
pub struct FixedEmbedding {
	dimensions: u32,
	vectors: HashMap<String, Vec<f32>>,
	calls: AtomicUsize,
}
impl FixedEmbedding {
	pub fn new(dimensions: u32) -> Self {
		Self { dimensions, vectors: HashMap::new(), calls: AtomicUsize::new(0) }
	}

	pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
		self.vectors.insert(text.into(), vector);

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl EmbeddingGenerator for FixedEmbedding {
	fn provider(&self) -> &str {
		"fixed"
	}

	fn model(&self) -> &str {
		"fixed"
	}

	fn dimensions(&self) -> u32 {
		self.dimensions
	}

	fn generate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, km_providers::Result<Vec<f32>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let result = self.vectors.get(text).cloned().ok_or_else(|| {
			km_providers::Error::Generation { message: format!("No fixed embedding for '{text}'.") }
		});

		Box::pin(async move { result })
	}
}

/// Deterministic bag-of-words embedding: texts sharing words point in similar directions.
pub struct HashEmbedding {
	dimensions: u32,
	calls: AtomicUsize,
}
impl HashEmbedding {
	pub fn new(dimensions: u32) -> Self {
		Self { dimensions, calls: AtomicUsize::new(0) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn embed(&self, input: &str) -> Vec<f32> {
		let mut out = vec![0.0; self.dimensions as usize];

		if out.is_empty() {
			return out;
		}

		for token in text::tokenize(input) {
			let hash = blake3::hash(token.as_bytes());
			let bytes = hash.as_bytes();
			let bucket = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
				% out.len();
			let sign = if bytes[4] & 1 == 0 { 1.0 } else { -1.0 };

			out[bucket] += sign;
		}

		out
	}
}
impl EmbeddingGenerator for HashEmbedding {
	fn provider(&self) -> &str {
		"hash"
	}

	fn model(&self) -> &str {
		"bag-of-words"
	}

	fn dimensions(&self) -> u32 {
		self.dimensions
	}

	fn generate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, km_providers::Result<Vec<f32>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let vector = self.embed(text);

		Box::pin(async move { Ok(vector) })
	}
}

/// Always fails, like an unreachable provider.
pub struct FailingEmbedding {
	pub dimensions: u32,
}
impl EmbeddingGenerator for FailingEmbedding {
	fn provider(&self) -> &str {
		"failing"
	}

	fn model(&self) -> &str {
		"failing"
	}

	fn dimensions(&self) -> u32 {
		self.dimensions
	}

	fn generate<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, km_providers::Result<Vec<f32>>> {
		Box::pin(async {
			Err(km_providers::Error::Generation { message: "Provider unavailable.".to_string() })
		})
	}
}

/// A record with a fixed creation time, `unix_seconds` after the epoch.
pub fn record(id: &str, title: &str, content: &str, unix_seconds: i64) -> Record {
	let mut record = Record::new(id, content);

	record.title = (!title.is_empty()).then(|| title.to_string());
	record.created_at =
		OffsetDateTime::from_unix_timestamp(unix_seconds).unwrap_or(OffsetDateTime::UNIX_EPOCH);

	record
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn hash_embedding_is_deterministic() {
		let generator = HashEmbedding::new(32);
		let first = generator.generate("rust search engine").await.expect("generate failed");
		let second = generator.generate("rust search engine").await.expect("generate failed");

		assert_eq!(first, second);
		assert_eq!(first.len(), 32);
		assert_eq!(generator.calls(), 2);
	}

	#[tokio::test]
	async fn fixed_embedding_rejects_unknown_text() {
		let generator = FixedEmbedding::new(3).with("a", vec![1.0, 0.0, 0.0]);

		assert!(generator.generate("a").await.is_ok());
		assert!(generator.generate("b").await.is_err());
	}

	#[test]
	fn test_dir_writes_nested_files() {
		let dir = TestDir::new().expect("Failed to create test dir.");
		let path = dir.write("nested/config.toml", "x = 1").expect("Failed to write file.");

		assert!(path.starts_with(dir.root()));
		assert_eq!(fs::read_to_string(path).expect("Failed to read file."), "x = 1");
	}
}
