//! Embedded vector index over a single SQLite table.
//!
//! Vectors are unit-normalized before storage, so ranking by dot product is ranking by cosine
//! similarity. When the `sqlite-vec` extension is available the scan runs inside SQLite;
//! otherwise rows are streamed and a bounded heap keeps the best `limit` matches.

use std::{
	cmp::{Ordering as CmpOrdering, Reverse},
	collections::BinaryHeap,
	path::{Path, PathBuf},
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
};

use futures::TryStreamExt;
use sqlx::SqlitePool;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::OnceCell;

use crate::{Error, Result, db, models::VectorMatch, schema};
use km_domain::vector;
use km_providers::EmbeddingGenerator;

const DEFAULT_SQLITE_VEC_ENTRY: &str = "vec0";

pub struct SqliteVectorIndex {
	path: PathBuf,
	dimensions: u32,
	sqlite_vec: Option<String>,
	generator: Arc<dyn EmbeddingGenerator>,
	state: OnceCell<Connection>,
	disposed: AtomicBool,
}
impl SqliteVectorIndex {
	pub fn new(
		path: impl Into<PathBuf>,
		dimensions: u32,
		generator: Arc<dyn EmbeddingGenerator>,
	) -> Self {
		Self {
			path: path.into(),
			dimensions,
			sqlite_vec: None,
			generator,
			state: OnceCell::new(),
			disposed: AtomicBool::new(false),
		}
	}

	pub fn from_config(
		cfg: &km_config::SqliteVectorIndex,
		generator: Arc<dyn EmbeddingGenerator>,
	) -> Self {
		let index = Self::new(&cfg.path, cfg.dimensions, generator);

		if cfg.use_sqlite_vec {
			index.with_sqlite_vec(
				cfg.sqlite_vec_path.clone().unwrap_or_else(|| DEFAULT_SQLITE_VEC_ENTRY.to_string()),
			)
		} else {
			index
		}
	}

	/// Tries to load the `sqlite-vec` extension from `entry` on initialization.
	pub fn with_sqlite_vec(mut self, entry: impl Into<String>) -> Self {
		self.sqlite_vec = Some(entry.into());

		self
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn dimensions(&self) -> u32 {
		self.dimensions
	}

	/// Idempotent. Every other operation calls this first.
	pub async fn initialize(&self) -> Result<()> {
		self.connection().await.map(|_| ())
	}

	/// Whether searches run through `sqlite-vec`. Initializes the index.
	pub async fn is_accelerated(&self) -> Result<bool> {
		Ok(self.connection().await?.accelerated)
	}

	pub async fn index(&self, content_id: &str, text: &str) -> Result<()> {
		if content_id.trim().is_empty() {
			return Err(Error::InvalidArgument("content_id must be non-empty".to_string()));
		}

		let conn = self.connection().await?;
		let embedding = self.embed(text).await?;
		let blob = vector::vector_to_blob(&embedding);
		let created_at = OffsetDateTime::now_utc()
			.format(&Rfc3339)
			.map_err(|err| Error::InvalidArgument(err.to_string()))?;
		let mut tx = conn.pool.begin().await?;

		sqlx::query("DELETE FROM km_vectors WHERE content_id = ?1")
			.bind(content_id)
			.execute(&mut *tx)
			.await?;
		sqlx::query("INSERT INTO km_vectors (content_id, vector, created_at) VALUES (?1, ?2, ?3)")
			.bind(content_id)
			.bind(blob)
			.bind(created_at)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;

		Ok(())
	}

	pub async fn search(&self, query_text: &str, limit: usize) -> Result<Vec<VectorMatch>> {
		let conn = self.connection().await?;

		if limit == 0 {
			return Ok(Vec::new());
		}

		let query = self.embed(query_text).await?;

		if conn.accelerated {
			return search_accelerated(&conn.pool, &query, limit).await;
		}

		self.search_linear(&conn.pool, &query, limit).await
	}

	pub async fn remove(&self, content_id: &str) -> Result<()> {
		let conn = self.connection().await?;

		sqlx::query("DELETE FROM km_vectors WHERE content_id = ?1")
			.bind(content_id)
			.execute(&conn.pool)
			.await?;

		Ok(())
	}

	pub async fn clear(&self) -> Result<()> {
		let conn = self.connection().await?;

		sqlx::query("DELETE FROM km_vectors").execute(&conn.pool).await?;

		Ok(())
	}

	pub async fn count(&self) -> Result<u64> {
		let conn = self.connection().await?;
		let (count,): (i64,) =
			sqlx::query_as("SELECT COUNT(*) FROM km_vectors").fetch_one(&conn.pool).await?;

		Ok(count.max(0) as u64)
	}

	pub async fn flush(&self) -> Result<()> {
		let conn = self.connection().await?;

		db::checkpoint(&conn.pool).await
	}

	/// Checkpoints the WAL and closes the connection. Later calls fail with `Disposed`.
	pub async fn close(&self) {
		self.disposed.store(true, Ordering::Release);

		if let Some(conn) = self.state.get() {
			db::checkpoint_and_close(&conn.pool).await;
		}
	}

	async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		let mut embedding = self.generator.generate(text).await?;

		if embedding.len() != self.dimensions as usize {
			return Err(Error::DimensionMismatch {
				expected: self.dimensions,
				actual: embedding.len(),
			});
		}

		vector::normalize_in_place(&mut embedding);

		Ok(embedding)
	}

	async fn search_linear(
		&self,
		pool: &SqlitePool,
		query: &[f32],
		limit: usize,
	) -> Result<Vec<VectorMatch>> {
		let mut heap = BinaryHeap::with_capacity(limit + 1);
		let mut rows = sqlx::query_as::<_, (String, Vec<u8>)>(
			"SELECT content_id, vector FROM km_vectors",
		)
		.fetch(pool);

		while let Some((content_id, blob)) = rows.try_next().await? {
			let stored = vector::blob_to_vector(&blob)?;

			if stored.len() != query.len() {
				tracing::warn!(
					content_id = %content_id,
					path = %self.path.display(),
					stored = stored.len(),
					expected = query.len(),
					"Skipping stored vector with unexpected dimensions."
				);

				continue;
			}

			heap.push(Reverse(ScoredEntry { score: vector::dot_product(query, &stored), content_id }));

			if heap.len() > limit {
				heap.pop();
			}
		}

		let mut matches: Vec<VectorMatch> = heap
			.into_iter()
			.map(|Reverse(entry)| VectorMatch { content_id: entry.content_id, score: entry.score })
			.collect();

		matches.sort_by(|a, b| {
			b.score.total_cmp(&a.score).then_with(|| a.content_id.cmp(&b.content_id))
		});

		Ok(matches)
	}

	async fn connection(&self) -> Result<&Connection> {
		if self.disposed.load(Ordering::Acquire) {
			return Err(Error::Disposed { path: self.path.clone() });
		}

		self.state
			.get_or_try_init(|| async {
				let (pool, accelerated) = db::open(&self.path, self.sqlite_vec.as_deref()).await?;

				sqlx::query(schema::VECTOR_TABLE).execute(&pool).await?;

				tracing::debug!(
					path = %self.path.display(),
					dimensions = self.dimensions,
					accelerated,
					"Vector index initialized."
				);

				Ok::<_, Error>(Connection { pool, accelerated })
			})
			.await
	}
}

struct Connection {
	pool: SqlitePool,
	accelerated: bool,
}

/// Heap entry. Lower scores, then larger ids, sort first so the heap evicts them.
#[derive(Debug)]
struct ScoredEntry {
	score: f32,
	content_id: String,
}
impl PartialEq for ScoredEntry {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == CmpOrdering::Equal
	}
}
impl Eq for ScoredEntry {}
impl PartialOrd for ScoredEntry {
	fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
		Some(self.cmp(other))
	}
}
impl Ord for ScoredEntry {
	fn cmp(&self, other: &Self) -> CmpOrdering {
		self.score.total_cmp(&other.score).then_with(|| other.content_id.cmp(&self.content_id))
	}
}

async fn search_accelerated(
	pool: &SqlitePool,
	query: &[f32],
	limit: usize,
) -> Result<Vec<VectorMatch>> {
	let rows: Vec<(String, f64)> = sqlx::query_as(
		"\
SELECT content_id, 1.0 - vec_distance_cosine(vector, ?1) AS score
FROM km_vectors
ORDER BY score DESC, content_id ASC
LIMIT ?2",
	)
	.bind(vector::vector_to_blob(query))
	.bind(i64::try_from(limit).unwrap_or(i64::MAX))
	.fetch_all(pool)
	.await?;

	Ok(rows
		.into_iter()
		.map(|(content_id, score)| VectorMatch { content_id, score: score as f32 })
		.collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn heap_evicts_lowest_score_then_largest_id() {
		let mut heap = BinaryHeap::new();

		for (score, id) in [(0.5, "b"), (0.9, "c"), (0.5, "a")] {
			heap.push(Reverse(ScoredEntry { score, content_id: id.to_string() }));

			if heap.len() > 2 {
				heap.pop();
			}
		}

		let mut kept: Vec<_> = heap.into_iter().map(|Reverse(entry)| entry.content_id).collect();

		kept.sort();

		assert_eq!(kept, vec!["a".to_string(), "c".to_string()]);
	}
}
