//! A node: one content store plus the search indexes built over it.

use std::sync::Arc;

use km_config::{ContentIndexConfig, NodeAccess, NodeConfig, SearchIndexConfig};
use km_domain::Record;
use km_providers::EmbeddingGenerator;
use km_storage::{CachedEmbeddingGenerator, ContentStore, EmbeddingCache};

use crate::{Error, FtsSearchIndex, GeneratorFactory, Result, SearchIndex, VectorSearchIndex};

const POSTGRES_UNSUPPORTED: &str = "PostgreSQL backends are not supported by this build.";

pub struct NodeIndex {
	id: String,
	required: bool,
	backend: std::result::Result<Arc<dyn SearchIndex>, String>,
}
impl NodeIndex {
	pub fn new(backend: Arc<dyn SearchIndex>, required: bool) -> Self {
		Self { id: backend.id().to_string(), required, backend: Ok(backend) }
	}

	/// An index that could not be built. Searching it reports `reason`.
	pub fn unavailable(id: impl Into<String>, required: bool, reason: impl Into<String>) -> Self {
		Self { id: id.into(), required, backend: Err(reason.into()) }
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	/// A failing required index fails the whole node.
	pub fn required(&self) -> bool {
		self.required
	}

	pub fn backend(&self) -> Result<&Arc<dyn SearchIndex>> {
		self.backend.as_ref().map_err(|reason| Error::Unavailable {
			message: format!("index '{}': {reason}", self.id),
		})
	}
}

pub struct Node {
	id: String,
	access: NodeAccess,
	content: std::result::Result<Arc<ContentStore>, String>,
	indexes: Vec<NodeIndex>,
}
impl Node {
	pub fn new(
		id: impl Into<String>,
		access: NodeAccess,
		content: Arc<ContentStore>,
		indexes: Vec<NodeIndex>,
	) -> Self {
		Self { id: id.into(), access, content: Ok(content), indexes }
	}

	/// Builds stores and providers lazily; nothing here touches the filesystem or network.
	pub fn from_config(
		key: &str,
		cfg: &NodeConfig,
		generators: &GeneratorFactory,
		cache: Option<&Arc<EmbeddingCache>>,
	) -> Self {
		let id = cfg.id.clone().unwrap_or_else(|| key.to_string());
		let content = match &cfg.content_index {
			ContentIndexConfig::Sqlite(sqlite) => {
				Ok(Arc::new(ContentStore::new(&sqlite.path)))
			},
			ContentIndexConfig::Postgres(_) => {
				tracing::warn!(node = %id, "Node content index is unavailable.");

				Err(POSTGRES_UNSUPPORTED.to_string())
			},
		};
		let indexes = cfg
			.search_indexes
			.iter()
			.map(|index_cfg| build_index(&id, index_cfg, generators, cache))
			.collect();

		Self { id, access: cfg.access, content, indexes }
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn access(&self) -> NodeAccess {
		self.access
	}

	pub fn indexes(&self) -> &[NodeIndex] {
		&self.indexes
	}

	pub fn index(&self, id: &str) -> Option<&NodeIndex> {
		self.indexes.iter().find(|index| index.id == id)
	}

	pub fn index_ids(&self) -> Vec<String> {
		self.indexes.iter().map(|index| index.id.clone()).collect()
	}

	pub fn content(&self) -> Result<&Arc<ContentStore>> {
		self.content.as_ref().map_err(|reason| Error::Unavailable {
			message: format!("node '{}' content store: {reason}", self.id),
		})
	}

	/// Stores `record` and indexes it everywhere.
	///
	/// Unavailable optional indexes are skipped. Any other failure is returned after the content
	/// write, so a retry converges.
	pub async fn put(&self, record: &Record) -> Result<()> {
		self.ensure_writable()?;

		if record.content.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "content must be non-empty.".to_string() });
		}

		self.content()?.upsert(record).await?;

		for index in &self.indexes {
			let backend = match index.backend() {
				Ok(backend) => backend,
				Err(err) if !index.required => {
					tracing::warn!(
						node = %self.id,
						index = %index.id,
						error = %err,
						"Skipping unavailable index."
					);

					continue;
				},
				Err(err) => return Err(err),
			};

			backend.index(record).await?;
		}

		tracing::debug!(node = %self.id, record = %record.id, "Record stored.");

		Ok(())
	}

	pub async fn get(&self, id: &str) -> Result<Option<Record>> {
		Ok(self.content()?.get(id).await?)
	}

	/// Removes `id` from every available index and then from the content store.
	pub async fn delete(&self, id: &str) -> Result<bool> {
		self.ensure_writable()?;

		for index in &self.indexes {
			if let Ok(backend) = index.backend() {
				backend.remove(id).await?;
			}
		}

		Ok(self.content()?.delete(id).await?)
	}

	pub async fn close(&self) {
		for index in &self.indexes {
			if let Ok(backend) = index.backend() {
				backend.close().await;
			}
		}

		if let Ok(content) = &self.content {
			content.close().await;
		}
	}

	fn ensure_writable(&self) -> Result<()> {
		match self.access {
			NodeAccess::ReadWrite => Ok(()),
			NodeAccess::ReadOnly => Err(Error::ReadOnly { node: self.id.clone() }),
		}
	}
}

fn build_index(
	node_id: &str,
	cfg: &SearchIndexConfig,
	generators: &GeneratorFactory,
	cache: Option<&Arc<EmbeddingCache>>,
) -> NodeIndex {
	match cfg {
		SearchIndexConfig::SqliteFts(fts) => {
			NodeIndex::new(Arc::new(FtsSearchIndex::from_config(fts)), fts.required)
		},
		SearchIndexConfig::SqliteVector(vector) => {
			match generators(&vector.embeddings, vector.dimensions) {
				Ok(generator) => {
					let generator: Arc<dyn EmbeddingGenerator> = match cache {
						Some(cache) => {
							Arc::new(CachedEmbeddingGenerator::new(generator, cache.clone()))
						},
						None => generator,
					};

					NodeIndex::new(
						Arc::new(VectorSearchIndex::from_config(vector, generator)),
						vector.required,
					)
				},
				Err(err) => {
					tracing::warn!(
						node = %node_id,
						index = %vector.id,
						error = %err,
						"Embedding provider is unavailable."
					);

					NodeIndex::unavailable(&vector.id, vector.required, err.to_string())
				},
			}
		},
		SearchIndexConfig::Postgres(postgres) => {
			NodeIndex::unavailable(&postgres.id, postgres.required, POSTGRES_UNSUPPORTED)
		},
	}
}
