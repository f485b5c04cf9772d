//! Authoritative record storage for a node.

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	sync::atomic::{AtomicBool, Ordering},
};

use sqlx::SqlitePool;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::OnceCell;

use crate::{Error, Result, db, models::ContentRow, schema};
use km_domain::Record;

const ID_BATCH: usize = 500;

pub struct ContentStore {
	path: PathBuf,
	pool: OnceCell<SqlitePool>,
	disposed: AtomicBool,
}
impl ContentStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into(), pool: OnceCell::new(), disposed: AtomicBool::new(false) }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Opens the database. Fails when the file cannot be created or opened.
	pub async fn initialize(&self) -> Result<()> {
		self.pool().await.map(|_| ())
	}

	pub async fn upsert(&self, record: &Record) -> Result<()> {
		if record.id.trim().is_empty() {
			return Err(Error::InvalidArgument("record id must be non-empty".to_string()));
		}

		let pool = self.pool().await?;
		let created_at =
			record.created_at.format(&Rfc3339).map_err(|err| Error::InvalidRecord {
				id: record.id.clone(),
				message: err.to_string(),
			})?;
		let updated_at = OffsetDateTime::now_utc().format(&Rfc3339).map_err(|err| {
			Error::InvalidRecord { id: record.id.clone(), message: err.to_string() }
		})?;

		sqlx::query(
			"\
INSERT INTO km_content (id, title, description, content, mime_type, tags, metadata, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(id) DO UPDATE SET
	title = excluded.title,
	description = excluded.description,
	content = excluded.content,
	mime_type = excluded.mime_type,
	tags = excluded.tags,
	metadata = excluded.metadata,
	created_at = excluded.created_at,
	updated_at = excluded.updated_at",
		)
		.bind(&record.id)
		.bind(record.title.as_deref())
		.bind(record.description.as_deref())
		.bind(&record.content)
		.bind(&record.mime_type)
		.bind(serde_json::to_string(&record.tags)?)
		.bind(serde_json::to_string(&record.metadata)?)
		.bind(created_at)
		.bind(updated_at)
		.execute(pool)
		.await?;

		Ok(())
	}

	pub async fn get(&self, id: &str) -> Result<Option<Record>> {
		let pool = self.pool().await?;
		let row: Option<ContentRow> = sqlx::query_as(
			"\
SELECT id, title, description, content, mime_type, tags, metadata, created_at
FROM km_content
WHERE id = ?1",
		)
		.bind(id)
		.fetch_optional(pool)
		.await?;

		row.map(ContentRow::into_record).transpose()
	}

	/// Raw rows for `ids`. Missing ids are absent from the map.
	pub async fn get_many(&self, ids: &[String]) -> Result<HashMap<String, ContentRow>> {
		let pool = self.pool().await?;
		let mut out = HashMap::with_capacity(ids.len());

		for batch in ids.chunks(ID_BATCH) {
			let placeholders = vec!["?"; batch.len()].join(", ");
			let sql = format!(
				"SELECT id, title, description, content, mime_type, tags, metadata, created_at \
FROM km_content WHERE id IN ({placeholders})"
			);
			let mut query = sqlx::query_as::<_, ContentRow>(&sql);

			for id in batch {
				query = query.bind(id);
			}

			for row in query.fetch_all(pool).await? {
				out.insert(row.id.clone(), row);
			}
		}

		Ok(out)
	}

	pub async fn delete(&self, id: &str) -> Result<bool> {
		let pool = self.pool().await?;
		let result = sqlx::query("DELETE FROM km_content WHERE id = ?1").bind(id).execute(pool).await?;

		Ok(result.rows_affected() > 0)
	}

	pub async fn list_ids(&self, limit: u32) -> Result<Vec<String>> {
		let pool = self.pool().await?;
		let ids: Vec<(String,)> =
			sqlx::query_as("SELECT id FROM km_content ORDER BY created_at DESC, id ASC LIMIT ?1")
				.bind(i64::from(limit))
				.fetch_all(pool)
				.await?;

		Ok(ids.into_iter().map(|(id,)| id).collect())
	}

	pub async fn count(&self) -> Result<u64> {
		let pool = self.pool().await?;
		let (count,): (i64,) =
			sqlx::query_as("SELECT COUNT(*) FROM km_content").fetch_one(pool).await?;

		Ok(count.max(0) as u64)
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

				sqlx::query(schema::CONTENT_TABLE).execute(&pool).await?;

				Ok::<_, Error>(pool)
			})
			.await
	}
}
