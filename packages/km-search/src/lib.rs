//! Multi-node search over embedded SQLite indexes.
//!
//! A [`SearchService`] owns one [`Node`] per configured node. Each node pairs a content store
//! with any number of search indexes; searches fan out to every selected index, merge the hits
//! into one ranked list and render snippets for the requested page.

pub mod index;
pub mod node;
pub mod records;
pub mod search;

mod error;

pub use error::{Error, Result};
pub use index::{FtsSearchIndex, VectorSearchIndex};
pub use node::{Node, NodeIndex};
pub use search::{
	NodeTiming, QueryValidationResult, SearchMetadata, SearchRequest, SearchResponse, SearchResult,
};

use std::{collections::BTreeMap, sync::Arc};

use km_config::{Config, EmbeddingsConfig};
use km_domain::Record;
use km_providers::{BoxFuture, EmbeddingGenerator};
use km_storage::EmbeddingCache;

/// Builds the embedding generator for a vector index.
pub type GeneratorFactory = Arc<
	dyn Fn(&EmbeddingsConfig, u32) -> km_providers::Result<Arc<dyn EmbeddingGenerator>>
		+ Send
		+ Sync,
>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
	FullText,
	Vector,
}
impl IndexKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::FullText => "fullText",
			Self::Vector => "vector",
		}
	}
}

#[derive(Clone, Debug)]
pub struct IndexQuery {
	/// Free text for embedding-based indexes. Empty for filter-only queries.
	pub text: String,
	/// FTS5 `MATCH` expression. `None` lists records without scoring.
	pub fts_expression: Option<String>,
	pub limit: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexMatch {
	pub record_id: String,
	/// Index-local relevance in `[0, 1]`.
	pub relevance: f32,
	pub matched_terms: Vec<String>,
}

pub trait SearchIndex
where
	Self: Send + Sync,
{
	fn id(&self) -> &str;

	fn kind(&self) -> IndexKind;

	fn search<'a>(&'a self, query: &'a IndexQuery) -> BoxFuture<'a, Result<Vec<IndexMatch>>>;

	fn index<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<()>>;

	fn remove<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, Result<()>>;

	/// Makes pending writes visible to readers.
	fn flush(&self) -> BoxFuture<'_, Result<()>>;

	fn close(&self) -> BoxFuture<'_, ()>;
}

pub struct SearchService {
	pub cfg: Config,
	nodes: BTreeMap<String, Arc<Node>>,
	cache: Option<Arc<EmbeddingCache>>,
}
impl SearchService {
	pub fn new(cfg: Config, nodes: Vec<Node>) -> Self {
		let nodes = nodes.into_iter().map(|node| (node.id().to_string(), Arc::new(node))).collect();

		Self { cfg, nodes, cache: None }
	}

	/// Builds every configured node with HTTP embedding providers.
	pub fn from_config(cfg: Config) -> Self {
		let generators: GeneratorFactory = Arc::new(km_providers::from_config);

		Self::with_generators(cfg, generators)
	}

	/// Like [`SearchService::from_config`], with a caller-supplied embedding factory.
	///
	/// Nodes whose stores or providers cannot be built are kept and report the failure when
	/// searched, so one broken node never takes the service down.
	pub fn with_generators(cfg: Config, generators: GeneratorFactory) -> Self {
		let cache = cfg.embeddings_cache.as_ref().and_then(EmbeddingCache::from_config).map(Arc::new);
		let nodes = cfg
			.nodes
			.iter()
			.map(|(key, node_cfg)| {
				let node = Node::from_config(key, node_cfg, &generators, cache.as_ref());

				(node.id().to_string(), Arc::new(node))
			})
			.collect();

		tracing::info!(
			nodes = cfg.nodes.len(),
			embeddings_cache = cache.is_some(),
			"Search service initialized."
		);

		Self { cfg, nodes, cache }
	}

	pub fn node(&self, id: &str) -> Result<&Arc<Node>> {
		self.nodes.get(id).ok_or_else(|| Error::NodeNotFound { node: id.to_string() })
	}

	pub fn node_ids(&self) -> Vec<&str> {
		self.nodes.keys().map(String::as_str).collect()
	}

	pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
		self.nodes.values()
	}

	/// Checkpoints and closes every store. Later operations fail with a disposed error.
	pub async fn close(&self) {
		for node in self.nodes.values() {
			node.close().await;
		}

		if let Some(cache) = &self.cache {
			cache.close().await;
		}
	}
}
