use std::{
	collections::HashSet,
	path::{Path, PathBuf},
	sync::atomic::{AtomicBool, Ordering},
};

use sqlx::SqlitePool;
use tokio::sync::OnceCell;

use crate::{Error, Result, db, models::FtsMatch, schema};
use km_domain::Record;

const MARK_OPEN: char = '\u{1}';
const MARK_CLOSE: char = '\u{2}';

/// SQLite FTS5 index over title, description and content.
pub struct SqliteFtsIndex {
	path: PathBuf,
	enable_stemming: bool,
	pool: OnceCell<SqlitePool>,
	disposed: AtomicBool,
}
impl SqliteFtsIndex {
	pub fn new(path: impl Into<PathBuf>, enable_stemming: bool) -> Self {
		Self {
			path: path.into(),
			enable_stemming,
			pool: OnceCell::new(),
			disposed: AtomicBool::new(false),
		}
	}

	pub fn from_config(cfg: &km_config::SqliteFtsIndex) -> Self {
		Self::new(&cfg.path, cfg.enable_stemming)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub async fn initialize(&self) -> Result<()> {
		self.pool().await.map(|_| ())
	}

	pub async fn index(&self, record: &Record) -> Result<()> {
		let pool = self.pool().await?;
		let mut tx = pool.begin().await?;

		sqlx::query("DELETE FROM km_fts WHERE content_id = ?1")
			.bind(&record.id)
			.execute(&mut *tx)
			.await?;
		sqlx::query(
			"INSERT INTO km_fts (content_id, title, description, content) VALUES (?1, ?2, ?3, ?4)",
		)
		.bind(&record.id)
		.bind(record.title.as_deref().unwrap_or_default())
		.bind(record.description.as_deref().unwrap_or_default())
		.bind(&record.content)
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;

		Ok(())
	}

	/// Runs an FTS5 `MATCH` expression. Best matches first.
	pub async fn search(&self, match_expression: &str, limit: usize) -> Result<Vec<FtsMatch>> {
		if match_expression.trim().is_empty() {
			return Err(Error::InvalidArgument("match expression must be non-empty".to_string()));
		}

		let pool = self.pool().await?;
		let rows: Vec<(String, f64, String, String, String)> = sqlx::query_as(
			"\
SELECT
	content_id,
	-bm25(km_fts) AS score,
	highlight(km_fts, 1, char(1), char(2)),
	highlight(km_fts, 2, char(1), char(2)),
	highlight(km_fts, 3, char(1), char(2))
FROM km_fts
WHERE km_fts MATCH ?1
ORDER BY bm25(km_fts), content_id
LIMIT ?2",
		)
		.bind(match_expression)
		.bind(i64::try_from(limit).unwrap_or(i64::MAX))
		.fetch_all(pool)
		.await?;

		Ok(rows
			.into_iter()
			.map(|(content_id, score, title, description, content)| FtsMatch {
				content_id,
				score: score as f32,
				matched_terms: marked_terms([title.as_str(), description.as_str(), content.as_str()]),
			})
			.collect())
	}

	/// Indexed ids without scoring, for queries that carry no free text.
	pub async fn list(&self, limit: usize) -> Result<Vec<String>> {
		let pool = self.pool().await?;
		let ids: Vec<(String,)> =
			sqlx::query_as("SELECT content_id FROM km_fts ORDER BY content_id LIMIT ?1")
				.bind(i64::try_from(limit).unwrap_or(i64::MAX))
				.fetch_all(pool)
				.await?;

		Ok(ids.into_iter().map(|(id,)| id).collect())
	}

	pub async fn remove(&self, content_id: &str) -> Result<()> {
		let pool = self.pool().await?;

		sqlx::query("DELETE FROM km_fts WHERE content_id = ?1").bind(content_id).execute(pool).await?;

		Ok(())
	}

	pub async fn clear(&self) -> Result<()> {
		let pool = self.pool().await?;

		sqlx::query("DELETE FROM km_fts").execute(pool).await?;

		Ok(())
	}

	pub async fn count(&self) -> Result<u64> {
		let pool = self.pool().await?;
		let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM km_fts").fetch_one(pool).await?;

		Ok(count.max(0) as u64)
	}

	pub async fn flush(&self) -> Result<()> {
		db::checkpoint(self.pool().await?).await
	}

	pub async fn close(&self) {
		self.disposed.store(true, Ordering::Release);

		if let Some(pool) = self.pool.get() {
			db::checkpoint_and_close(pool).await;
		}
	}

	async fn pool(&self) -> Result<&SqlitePool> {
		if self.disposed.load(Ordering::Acquire) {
			return Err(Error::Disposed { path: self.path.clone() });
		}

		self.pool
			.get_or_try_init(|| async {
				let (pool, _) = db::open(&self.path, None).await?;

				sqlx::query(&schema::fts_table(self.enable_stemming)).execute(&pool).await?;

				Ok::<_, Error>(pool)
			})
			.await
	}
}

/// Lowercased unique spans wrapped by `highlight()` markers.
fn marked_terms<'a>(columns: impl IntoIterator<Item = &'a str>) -> Vec<String> {
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for column in columns {
		let mut rest = column;

		while let Some(start) = rest.find(MARK_OPEN) {
			let after = &rest[start + MARK_OPEN.len_utf8()..];
			let Some(end) = after.find(MARK_CLOSE) else { break };
			let term = after[..end].trim().to_lowercase();

			if !term.is_empty() && seen.insert(term.clone()) {
				out.push(term);
			}

			rest = &after[end + MARK_CLOSE.len_utf8()..];
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn marked_terms_are_extracted_once() {
		let title = "\u{1}Testing\u{2} guide";
		let content = "we \u{1}tested\u{2} the \u{1}testing\u{2} rig";

		assert_eq!(marked_terms([title, "", content]), vec!["testing".to_string(), "tested".to_string()]);
	}
}
