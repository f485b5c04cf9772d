//! [`SearchIndex`] adapters over the SQLite stores.

use std::sync::Arc;

use km_domain::{Record, text};
use km_providers::{BoxFuture, EmbeddingGenerator};
use km_storage::{SqliteFtsIndex, SqliteVectorIndex};

use crate::{IndexKind, IndexMatch, IndexQuery, Result, SearchIndex};

/// BM25 full-text index. Scores are scaled by the best score of each result set.
pub struct FtsSearchIndex {
	id: String,
	store: SqliteFtsIndex,
}
impl FtsSearchIndex {
	pub fn new(id: impl Into<String>, store: SqliteFtsIndex) -> Self {
		Self { id: id.into(), store }
	}

	pub fn from_config(cfg: &km_config::SqliteFtsIndex) -> Self {
		Self::new(&cfg.id, SqliteFtsIndex::from_config(cfg))
	}

	pub fn store(&self) -> &SqliteFtsIndex {
		&self.store
	}

	async fn run(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>> {
		let Some(expression) = query.fts_expression.as_deref() else {
			let ids = self.store.list(query.limit).await?;

			return Ok(ids
				.into_iter()
				.map(|record_id| IndexMatch { record_id, relevance: 1.0, matched_terms: Vec::new() })
				.collect());
		};
		let matches = self.store.search(expression, query.limit).await?;
		let top = matches.iter().map(|m| m.score).fold(f32::NEG_INFINITY, f32::max);

		Ok(matches
			.into_iter()
			.map(|m| IndexMatch {
				record_id: m.content_id,
				relevance: scale_bm25(m.score, top),
				matched_terms: m.matched_terms,
			})
			.collect())
	}
}
impl SearchIndex for FtsSearchIndex {
	fn id(&self) -> &str {
		&self.id
	}

	fn kind(&self) -> IndexKind {
		IndexKind::FullText
	}

	fn search<'a>(&'a self, query: &'a IndexQuery) -> BoxFuture<'a, Result<Vec<IndexMatch>>> {
		Box::pin(self.run(query))
	}

	fn index<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(self.store.index(record).await?) })
	}

	fn remove<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(self.store.remove(record_id).await?) })
	}

	fn flush(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move { Ok(self.store.flush().await?) })
	}

	fn close(&self) -> BoxFuture<'_, ()> {
		Box::pin(self.store.close())
	}
}

/// Embedding index ranked by cosine similarity, clamped to `[0, 1]`.
pub struct VectorSearchIndex {
	id: String,
	store: SqliteVectorIndex,
}
impl VectorSearchIndex {
	pub fn new(id: impl Into<String>, store: SqliteVectorIndex) -> Self {
		Self { id: id.into(), store }
	}

	pub fn from_config(
		cfg: &km_config::SqliteVectorIndex,
		generator: Arc<dyn EmbeddingGenerator>,
	) -> Self {
		Self::new(&cfg.id, SqliteVectorIndex::from_config(cfg, generator))
	}

	pub fn store(&self) -> &SqliteVectorIndex {
		&self.store
	}

	async fn run(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>> {
		// Nothing to embed for filter-only queries.
		if query.text.trim().is_empty() {
			return Ok(Vec::new());
		}

		let matches = self.store.search(&query.text, query.limit).await?;
		let terms = text::tokenize(&query.text);

		Ok(matches
			.into_iter()
			.map(|m| IndexMatch {
				record_id: m.content_id,
				relevance: m.score.clamp(0.0, 1.0),
				matched_terms: terms.clone(),
			})
			.collect())
	}
}
impl SearchIndex for VectorSearchIndex {
	fn id(&self) -> &str {
		&self.id
	}

	fn kind(&self) -> IndexKind {
		IndexKind::Vector
	}

	fn search<'a>(&'a self, query: &'a IndexQuery) -> BoxFuture<'a, Result<Vec<IndexMatch>>> {
		Box::pin(self.run(query))
	}

	fn index<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(self.store.index(&record.id, &record.embedding_text()).await?) })
	}

	fn remove<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(self.store.remove(record_id).await?) })
	}

	fn flush(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move { Ok(self.store.flush().await?) })
	}

	fn close(&self) -> BoxFuture<'_, ()> {
		Box::pin(self.store.close())
	}
}

fn scale_bm25(score: f32, top: f32) -> f32 {
	if !top.is_finite() || top <= 0.0 {
		return 1.0;
	}

	(score / top).clamp(0.0, 1.0)
}
