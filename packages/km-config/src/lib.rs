mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	AzureOpenAiEmbeddings, CacheMode, Config, ContentIndexConfig, EmbeddingsCacheConfig,
	EmbeddingsConfig, HuggingFaceEmbeddings, NodeAccess, NodeConfig, OllamaEmbeddings,
	OpenAiEmbeddings, PostgresContentIndex, PostgresSearchIndex, Reranking, Search,
	SearchIndexConfig, Service, SqliteContentIndex, SqliteEmbeddingsCache, SqliteFtsIndex,
	SqliteVectorIndex,
};

use std::{collections::HashSet, fs, path::Path};

/// Loads a config file. `.json` files are read as JSON, everything else as TOML.
pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
	let mut cfg: Config = if is_json {
		serde_json::from_str(&raw)
			.map_err(|err| Error::ParseJsonConfig { path: path.to_path_buf(), source: err })?
	} else {
		toml::from_str(&raw)
			.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?
	};

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.nodes.is_empty() {
		return Err(Error::Validation {
			message: "nodes must define at least one node.".to_string(),
		});
	}

	for (key, node) in &cfg.nodes {
		let path = format!("nodes.{key}");

		types::require_identifier(&path, key)?;

		if let Some(id) = node.id.as_deref()
			&& id != key
		{
			return Err(Error::Validation {
				message: format!("{path}.id must match the node key."),
			});
		}

		node.content_index.validate(&format!("{path}.content_index"))?;

		let mut index_ids = HashSet::new();

		for (i, index) in node.search_indexes.iter().enumerate() {
			let index_path = format!("{path}.search_indexes[{i}]");

			index.validate(&index_path)?;

			if !index_ids.insert(index.id()) {
				return Err(Error::Validation {
					message: format!("{index_path}.id '{}' is duplicated.", index.id()),
				});
			}
		}
	}

	for node in &cfg.search.default_nodes {
		if !cfg.nodes.contains_key(node) {
			return Err(Error::Validation {
				message: format!("search.default_nodes references unknown node '{node}'."),
			});
		}
	}

	if cfg.search.limit == 0 {
		return Err(Error::Validation {
			message: "search.limit must be greater than zero.".to_string(),
		});
	}
	if !cfg.search.min_relevance.is_finite() {
		return Err(Error::Validation {
			message: "search.min_relevance must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.search.min_relevance) {
		return Err(Error::Validation {
			message: "search.min_relevance must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.search.max_results_per_node == 0 {
		return Err(Error::Validation {
			message: "search.max_results_per_node must be greater than zero.".to_string(),
		});
	}
	if cfg.search.timeout_seconds == 0 {
		return Err(Error::Validation {
			message: "search.timeout_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.search.snippet_length == 0 {
		return Err(Error::Validation {
			message: "search.snippet_length must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_snippets_per_result == 0 {
		return Err(Error::Validation {
			message: "search.max_snippets_per_result must be greater than zero.".to_string(),
		});
	}
	if cfg.search.highlight_prefix.is_empty() || cfg.search.highlight_suffix.is_empty() {
		return Err(Error::Validation {
			message: "search.highlight_prefix and search.highlight_suffix must be non-empty."
				.to_string(),
		});
	}

	for (node, weight) in &cfg.reranking.node_weights {
		validate_weight(&format!("reranking.node_weights.{node}"), *weight)?;
	}
	for (node, weights) in &cfg.reranking.index_weights {
		if !cfg.nodes.contains_key(node) {
			return Err(Error::Validation {
				message: format!("reranking.index_weights references unknown node '{node}'."),
			});
		}

		for (index, weight) in weights {
			validate_weight(&format!("reranking.index_weights.{node}.{index}"), *weight)?;
		}
	}

	if cfg.reranking.diminishing_multipliers.is_empty() {
		return Err(Error::Validation {
			message: "reranking.diminishing_multipliers must be non-empty.".to_string(),
		});
	}
	if cfg
		.reranking
		.diminishing_multipliers
		.iter()
		.any(|multiplier| !multiplier.is_finite() || *multiplier <= 0.0 || *multiplier > 1.0)
	{
		return Err(Error::Validation {
			message: "reranking.diminishing_multipliers must be in the range (0.0, 1.0]."
				.to_string(),
		});
	}

	if let Some(cache) = cfg.embeddings_cache.as_ref() {
		cache.validate("embeddings_cache")?;
	}

	Ok(())
}

fn validate_weight(path: &str, weight: f32) -> Result<()> {
	if !weight.is_finite() {
		return Err(Error::Validation { message: format!("{path} must be a finite number.") });
	}
	if weight < 0.0 {
		return Err(Error::Validation { message: format!("{path} must be zero or greater.") });
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();

	for (key, node) in cfg.nodes.iter_mut() {
		if node.id.as_deref().map(|id| id.trim().is_empty()).unwrap_or(true) {
			node.id = Some(key.clone());
		}

		for index in node.search_indexes.iter_mut() {
			if let SearchIndexConfig::SqliteVector(vector) = index
				&& let EmbeddingsConfig::AzureOpenAi(azure) = &mut vector.embeddings
				&& azure.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false)
			{
				azure.api_key = None;
			}
		}
	}

	cfg.search.default_nodes = cfg
		.search
		.default_nodes
		.iter()
		.map(|node| node.trim().to_string())
		.filter(|node| !node.is_empty())
		.collect();
}
