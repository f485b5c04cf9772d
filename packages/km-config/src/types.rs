use std::{
	collections::{BTreeMap, HashMap},
	path::PathBuf,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_HUGGING_FACE_BASE_URL: &str = "https://api-inference.huggingface.co";
const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
	#[serde(default)]
	pub service: Service,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub reranking: Reranking,
	#[serde(default)]
	pub nodes: BTreeMap<String, NodeConfig>,
	#[serde(default)]
	pub embeddings_cache: Option<EmbeddingsCacheConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Service {
	pub log_level: String,
}
impl Default for Service {
	fn default() -> Self {
		Self { log_level: "info".to_string() }
	}
}

/// Request defaults. Every optional search request field falls back to these.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Search {
	/// Nodes searched when a request names none. Empty means every configured node.
	pub default_nodes: Vec<String>,
	pub limit: u32,
	pub offset: u32,
	pub min_relevance: f32,
	/// Per (node, index) cap applied before global reranking.
	pub max_results_per_node: u32,
	pub timeout_seconds: u64,
	pub snippet_length: u32,
	pub max_snippets_per_result: u32,
	pub highlight_prefix: String,
	pub highlight_suffix: String,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			default_nodes: Vec::new(),
			limit: 20,
			offset: 0,
			min_relevance: 0.3,
			max_results_per_node: 1_000,
			timeout_seconds: 30,
			snippet_length: 200,
			max_snippets_per_result: 1,
			highlight_prefix: "<mark>".to_string(),
			highlight_suffix: "</mark>".to_string(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Reranking {
	pub node_weights: HashMap<String, f32>,
	/// Keyed by node id, then index id.
	pub index_weights: HashMap<String, HashMap<String, f32>>,
	pub diminishing_multipliers: Vec<f32>,
}
impl Default for Reranking {
	fn default() -> Self {
		Self {
			node_weights: HashMap::new(),
			index_weights: HashMap::new(),
			diminishing_multipliers: vec![1.0, 0.5, 0.25, 0.125],
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum NodeAccess {
	#[default]
	ReadWrite,
	ReadOnly,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
	/// Filled from the map key when omitted.
	#[serde(default)]
	pub id: Option<String>,
	#[serde(default)]
	pub access: NodeAccess,
	pub content_index: ContentIndexConfig,
	#[serde(default)]
	pub search_indexes: Vec<SearchIndexConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ContentIndexConfig {
	#[serde(rename = "sqlite")]
	Sqlite(SqliteContentIndex),
	#[serde(rename = "postgres")]
	Postgres(PostgresContentIndex),
}
impl ContentIndexConfig {
	pub fn validate(&self, path: &str) -> Result<()> {
		match self {
			Self::Sqlite(cfg) => require_path(&format!("{path}.path"), &cfg.path),
			Self::Postgres(cfg) => {
				require_non_empty(&format!("{path}.connection_string"), &cfg.connection_string)
			},
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteContentIndex {
	pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresContentIndex {
	pub connection_string: String,
	#[serde(default)]
	pub table: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum SearchIndexConfig {
	#[serde(rename = "sqliteFTS")]
	SqliteFts(SqliteFtsIndex),
	#[serde(rename = "sqliteVector")]
	SqliteVector(SqliteVectorIndex),
	#[serde(rename = "postgres")]
	Postgres(PostgresSearchIndex),
}
impl SearchIndexConfig {
	pub fn id(&self) -> &str {
		match self {
			Self::SqliteFts(cfg) => &cfg.id,
			Self::SqliteVector(cfg) => &cfg.id,
			Self::Postgres(cfg) => &cfg.id,
		}
	}

	pub fn required(&self) -> bool {
		match self {
			Self::SqliteFts(cfg) => cfg.required,
			Self::SqliteVector(cfg) => cfg.required,
			Self::Postgres(cfg) => cfg.required,
		}
	}

	pub fn validate(&self, path: &str) -> Result<()> {
		require_identifier(&format!("{path}.id"), self.id())?;

		match self {
			Self::SqliteFts(cfg) => require_path(&format!("{path}.path"), &cfg.path),
			Self::SqliteVector(cfg) => {
				require_path(&format!("{path}.path"), &cfg.path)?;

				if cfg.dimensions == 0 {
					return Err(Error::Validation {
						message: format!("{path}.dimensions must be greater than zero."),
					});
				}
				if let Some(extension) = cfg.sqlite_vec_path.as_deref()
					&& extension.trim().is_empty()
				{
					return Err(Error::Validation {
						message: format!("{path}.sqlite_vec_path must be non-empty when set."),
					});
				}

				cfg.embeddings.validate(&format!("{path}.embeddings"))
			},
			Self::Postgres(cfg) => {
				require_non_empty(&format!("{path}.connection_string"), &cfg.connection_string)
			},
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteFtsIndex {
	pub id: String,
	pub path: PathBuf,
	#[serde(default = "default_true")]
	pub enable_stemming: bool,
	#[serde(default)]
	pub required: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteVectorIndex {
	pub id: String,
	pub path: PathBuf,
	pub dimensions: u32,
	#[serde(default)]
	pub use_sqlite_vec: bool,
	/// Extension entry point handed to SQLite. Defaults to `vec0`.
	#[serde(default)]
	pub sqlite_vec_path: Option<String>,
	pub embeddings: EmbeddingsConfig,
	#[serde(default)]
	pub required: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresSearchIndex {
	pub id: String,
	pub connection_string: String,
	#[serde(default)]
	pub required: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum EmbeddingsConfig {
	#[serde(rename = "ollama")]
	Ollama(OllamaEmbeddings),
	#[serde(rename = "openai")]
	OpenAi(OpenAiEmbeddings),
	#[serde(rename = "azureOpenAI")]
	AzureOpenAi(AzureOpenAiEmbeddings),
	#[serde(rename = "huggingFace")]
	HuggingFace(HuggingFaceEmbeddings),
}
impl EmbeddingsConfig {
	pub fn provider(&self) -> &'static str {
		match self {
			Self::Ollama(_) => "ollama",
			Self::OpenAi(_) => "openai",
			Self::AzureOpenAi(_) => "azureOpenAI",
			Self::HuggingFace(_) => "huggingFace",
		}
	}

	pub fn model(&self) -> &str {
		match self {
			Self::Ollama(cfg) => &cfg.model,
			Self::OpenAi(cfg) => &cfg.model,
			Self::AzureOpenAi(cfg) => &cfg.deployment,
			Self::HuggingFace(cfg) => &cfg.model,
		}
	}

	pub fn validate(&self, path: &str) -> Result<()> {
		match self {
			Self::Ollama(cfg) => {
				require_non_empty(&format!("{path}.model"), &cfg.model)?;
				require_http_url(&format!("{path}.base_url"), &cfg.base_url)
			},
			Self::OpenAi(cfg) => {
				require_non_empty(&format!("{path}.model"), &cfg.model)?;
				require_non_empty(&format!("{path}.api_key"), &cfg.api_key)?;

				match cfg.base_url.as_deref() {
					Some(base_url) => require_http_url(&format!("{path}.base_url"), base_url),
					None => Ok(()),
				}
			},
			Self::AzureOpenAi(cfg) => {
				require_non_empty(&format!("{path}.deployment"), &cfg.deployment)?;
				require_http_url(&format!("{path}.endpoint"), &cfg.endpoint)?;
				require_non_empty(&format!("{path}.api_version"), &cfg.api_version)?;

				let has_key = cfg.api_key.as_deref().is_some_and(|key| !key.trim().is_empty());

				if has_key {
					return Ok(());
				}

				let message = if cfg.use_managed_identity {
					format!("{path}.use_managed_identity is not supported; set api_key.")
				} else {
					format!("{path}.api_key must be set.")
				};

				Err(Error::Validation { message })
			},
			Self::HuggingFace(cfg) => {
				require_non_empty(&format!("{path}.model"), &cfg.model)?;
				require_non_empty(&format!("{path}.api_key"), &cfg.api_key)?;
				require_http_url(&format!("{path}.base_url"), &cfg.base_url)
			},
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OllamaEmbeddings {
	pub model: String,
	#[serde(default = "default_ollama_base_url")]
	pub base_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAiEmbeddings {
	pub model: String,
	pub api_key: String,
	#[serde(default)]
	pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AzureOpenAiEmbeddings {
	pub deployment: String,
	pub endpoint: String,
	#[serde(default)]
	pub api_key: Option<String>,
	#[serde(default)]
	pub use_managed_identity: bool,
	#[serde(default = "default_azure_api_version")]
	pub api_version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HuggingFaceEmbeddings {
	pub model: String,
	pub api_key: String,
	#[serde(default = "default_hugging_face_base_url")]
	pub base_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum CacheMode {
	#[default]
	ReadWrite,
	ReadOnly,
	WriteOnly,
}
impl CacheMode {
	pub fn can_read(self) -> bool {
		matches!(self, Self::ReadWrite | Self::ReadOnly)
	}

	pub fn can_write(self) -> bool {
		matches!(self, Self::ReadWrite | Self::WriteOnly)
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum EmbeddingsCacheConfig {
	#[serde(rename = "sqlite", alias = "Sqlite")]
	Sqlite(SqliteEmbeddingsCache),
}
impl EmbeddingsCacheConfig {
	pub fn validate(&self, path: &str) -> Result<()> {
		match self {
			Self::Sqlite(cfg) => {
				require_path(&format!("{path}.path"), &cfg.path)?;

				if cfg.mode().is_none() {
					return Err(Error::Validation {
						message: format!("{path} must allow read, write, or both."),
					});
				}

				Ok(())
			},
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteEmbeddingsCache {
	pub path: PathBuf,
	#[serde(default = "default_true")]
	pub allow_read: bool,
	#[serde(default = "default_true")]
	pub allow_write: bool,
}
impl SqliteEmbeddingsCache {
	pub fn mode(&self) -> Option<CacheMode> {
		match (self.allow_read, self.allow_write) {
			(true, true) => Some(CacheMode::ReadWrite),
			(true, false) => Some(CacheMode::ReadOnly),
			(false, true) => Some(CacheMode::WriteOnly),
			(false, false) => None,
		}
	}
}

pub(crate) fn require_identifier(path: &str, value: &str) -> Result<()> {
	require_non_empty(path, value)?;

	if value.contains(':') {
		return Err(Error::Validation { message: format!("{path} must not contain ':'.") });
	}

	Ok(())
}

fn require_non_empty(path: &str, value: &str) -> Result<()> {
	if value.trim().is_empty() {
		return Err(Error::Validation { message: format!("{path} must be non-empty.") });
	}

	Ok(())
}

fn require_path(path: &str, value: &std::path::Path) -> Result<()> {
	if value.as_os_str().is_empty() {
		return Err(Error::Validation { message: format!("{path} must be non-empty.") });
	}

	Ok(())
}

fn require_http_url(path: &str, value: &str) -> Result<()> {
	let rest = value
		.strip_prefix("https://")
		.or_else(|| value.strip_prefix("http://"))
		.ok_or_else(|| Error::Validation {
			message: format!("{path} must be an http or https URL."),
		})?;
	let host = rest.split(['/', '?', '#']).next().unwrap_or_default();

	if host.is_empty() || host.chars().any(char::is_whitespace) {
		return Err(Error::Validation { message: format!("{path} must include a valid host.") });
	}

	Ok(())
}

fn default_true() -> bool {
	true
}

fn default_ollama_base_url() -> String {
	DEFAULT_OLLAMA_BASE_URL.to_string()
}

fn default_hugging_face_base_url() -> String {
	DEFAULT_HUGGING_FACE_BASE_URL.to_string()
}

fn default_azure_api_version() -> String {
	DEFAULT_AZURE_API_VERSION.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cache_mode_follows_read_write_flags() {
		let mut cache = SqliteEmbeddingsCache {
			path: PathBuf::from("cache.db"),
			allow_read: true,
			allow_write: false,
		};

		assert_eq!(cache.mode(), Some(CacheMode::ReadOnly));

		cache.allow_read = false;
		cache.allow_write = true;

		assert_eq!(cache.mode(), Some(CacheMode::WriteOnly));

		cache.allow_write = false;

		assert_eq!(cache.mode(), None);
	}

	#[test]
	fn http_url_requires_scheme_and_host() {
		assert!(require_http_url("x", "https://example.com/v1").is_ok());
		assert!(require_http_url("x", "http://localhost:11434").is_ok());
		assert!(require_http_url("x", "example.com").is_err());
		assert!(require_http_url("x", "https:///path").is_err());
	}
}
