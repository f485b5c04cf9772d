use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use sqlx::SqlitePool;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::OnceCell;

use crate::{Error, Result, db, schema};
use km_config::CacheMode;
use km_domain::vector;
use km_providers::{BoxFuture, EmbeddingGenerator};

/// Persistent embedding cache keyed by provider, model, dimensions and text.
pub struct EmbeddingCache {
	path: PathBuf,
	mode: CacheMode,
	pool: OnceCell<SqlitePool>,
}
impl EmbeddingCache {
	pub fn new(path: impl Into<PathBuf>, mode: CacheMode) -> Self {
		Self { path: path.into(), mode, pool: OnceCell::new() }
	}

	/// `None` when the config allows neither reads nor writes.
	pub fn from_config(cfg: &km_config::EmbeddingsCacheConfig) -> Option<Self> {
		match cfg {
			km_config::EmbeddingsCacheConfig::Sqlite(sqlite) => {
				sqlite.mode().map(|mode| Self::new(&sqlite.path, mode))
			},
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn mode(&self) -> CacheMode {
		self.mode
	}

	pub fn key(provider: &str, model: &str, dimensions: u32, text: &str) -> String {
		let mut hasher = blake3::Hasher::new();

		hasher.update(provider.as_bytes());
		hasher.update(&[0]);
		hasher.update(model.as_bytes());
		hasher.update(&[0]);
		hasher.update(&dimensions.to_le_bytes());
		hasher.update(&[0]);
		hasher.update(text.as_bytes());

		hasher.finalize().to_hex().to_string()
	}

	pub async fn get(&self, key: &str) -> Result<Option<Vec<f32>>> {
		let pool = self.pool().await?;
		let row: Option<(Vec<u8>,)> =
			sqlx::query_as("SELECT vector FROM embeddings_cache WHERE key = ?1")
				.bind(key)
				.fetch_optional(pool)
				.await?;

		match row {
			Some((blob,)) => Ok(Some(vector::blob_to_vector(&blob)?)),
			None => Ok(None),
		}
	}

	pub async fn put(
		&self,
		key: &str,
		provider: &str,
		model: &str,
		embedding: &[f32],
	) -> Result<()> {
		let pool = self.pool().await?;
		let timestamp = OffsetDateTime::now_utc()
			.format(&Rfc3339)
			.map_err(|err| Error::InvalidArgument(err.to_string()))?;

		sqlx::query(
			"\
INSERT INTO embeddings_cache (key, provider, model, dimensions, vector, token_count, timestamp)
VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)
ON CONFLICT(key) DO UPDATE SET vector = excluded.vector, timestamp = excluded.timestamp",
		)
		.bind(key)
		.bind(provider)
		.bind(model)
		.bind(embedding.len() as i64)
		.bind(vector::vector_to_blob(embedding))
		.bind(timestamp)
		.execute(pool)
		.await?;

		Ok(())
	}

	pub async fn count(&self) -> Result<u64> {
		let pool = self.pool().await?;
		let (count,): (i64,) =
			sqlx::query_as("SELECT COUNT(*) FROM embeddings_cache").fetch_one(pool).await?;

		Ok(count.max(0) as u64)
	}

	pub async fn close(&self) {
		if let Some(pool) = self.pool.get() {
			db::checkpoint_and_close(pool).await;
		}
	}

	async fn pool(&self) -> Result<&SqlitePool> {
		self.pool
			.get_or_try_init(|| async {
				let (pool, _) = db::open(&self.path, None).await?;

				sqlx::query(schema::EMBEDDINGS_CACHE_TABLE).execute(&pool).await?;

				Ok::<_, Error>(pool)
			})
			.await
	}
}

/// Wraps a generator with an [`EmbeddingCache`].
///
/// Cache failures are logged and bypassed; only the inner generator can fail a call.
pub struct CachedEmbeddingGenerator {
	inner: Arc<dyn EmbeddingGenerator>,
	cache: Arc<EmbeddingCache>,
}
impl CachedEmbeddingGenerator {
	pub fn new(inner: Arc<dyn EmbeddingGenerator>, cache: Arc<EmbeddingCache>) -> Self {
		Self { inner, cache }
	}

	async fn generate_cached(&self, text: &str) -> km_providers::Result<Vec<f32>> {
		let key = EmbeddingCache::key(
			self.inner.provider(),
			self.inner.model(),
			self.inner.dimensions(),
			text,
		);

		if self.cache.mode().can_read() {
			match self.cache.get(&key).await {
				Ok(Some(embedding)) => return Ok(embedding),
				Ok(None) => {},
				Err(err) => {
					tracing::warn!(
						error = %err,
						path = %self.cache.path().display(),
						"Embedding cache read failed."
					);
				},
			}
		}

		let embedding = self.inner.generate(text).await?;

		if self.cache.mode().can_write()
			&& let Err(err) =
				self.cache.put(&key, self.inner.provider(), self.inner.model(), &embedding).await
		{
			tracing::warn!(
				error = %err,
				path = %self.cache.path().display(),
				"Embedding cache write failed."
			);
		}

		Ok(embedding)
	}
}
impl EmbeddingGenerator for CachedEmbeddingGenerator {
	fn provider(&self) -> &str {
		self.inner.provider()
	}

	fn model(&self) -> &str {
		self.inner.model()
	}

	fn dimensions(&self) -> u32 {
		self.inner.dimensions()
	}

	fn generate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, km_providers::Result<Vec<f32>>> {
		Box::pin(self.generate_cached(text))
	}
}
