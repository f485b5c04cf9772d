mod fanout;
mod query;
mod render;
mod rerank;
mod selector;

pub use query::{ParsedQuery, QueryParseError, QueryValidationResult};

use std::{
	collections::{BTreeMap, HashMap},
	time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result, SearchService};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
	pub query: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub nodes: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub exclude_nodes: Vec<String>,
	/// `indexId` matches that index on every node; `nodeId:indexId` matches one node only.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub search_indexes: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub exclude_indexes: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub offset: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub min_relevance: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_results_per_node: Option<u32>,
	/// Replaces the configured weight of each listed node.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub node_weights: Option<HashMap<String, f32>>,
	#[serde(default)]
	pub snippet_only: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub snippet_length: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_snippets_per_result: Option<u32>,
	#[serde(default)]
	pub highlight: bool,
	#[serde(default)]
	pub wait_for_indexing: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout_seconds: Option<u64>,
}
impl SearchRequest {
	pub fn new(query: impl Into<String>) -> Self {
		Self { query: query.into(), ..Default::default() }
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
	pub id: String,
	pub node_id: String,
	pub relevance: f32,
	pub title: String,
	pub description: String,
	pub content: String,
	pub mime_type: String,
	#[serde(with = "km_domain::time_serde")]
	pub created_at: OffsetDateTime,
	pub tags: Vec<String>,
	pub metadata: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub matched_terms: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTiming {
	pub node_id: String,
	/// Milliseconds.
	pub search_time: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetadata {
	pub nodes_requested: usize,
	pub nodes_searched: usize,
	/// Milliseconds.
	pub execution_time: u64,
	pub node_timings: Vec<NodeTiming>,
	pub warnings: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
	pub query: String,
	/// Results above the relevance threshold, before pagination.
	pub total_results: usize,
	pub results: Vec<SearchResult>,
	pub metadata: SearchMetadata,
}

struct SearchOptions {
	limit: usize,
	offset: usize,
	min_relevance: f32,
	max_results_per_node: usize,
	timeout: Duration,
	snippet_length: usize,
	max_snippets: usize,
}

impl SearchService {
	/// Runs one query across every selected node and index.
	///
	/// Index failures and timeouts become warnings. Only invalid requests, invalid queries and
	/// cancellation fail the call.
	pub async fn search(
		&self,
		req: SearchRequest,
		cancel: CancellationToken,
	) -> Result<SearchResponse> {
		let started = Instant::now();
		let options = resolve_options(self, &req)?;
		let parsed = ParsedQuery::parse(&req.query)
			.map_err(|err| Error::InvalidQuery { message: err.message, position: err.position })?;

		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		let catalog: Vec<(String, Vec<String>)> =
			self.nodes().map(|node| (node.id().to_string(), node.index_ids())).collect();
		let plan = selector::plan(
			&catalog,
			&selector::Selection {
				nodes: &req.nodes,
				exclude_nodes: &req.exclude_nodes,
				indexes: &req.search_indexes,
				exclude_indexes: &req.exclude_indexes,
				default_nodes: &self.cfg.search.default_nodes,
			},
		);
		let mut targets = Vec::with_capacity(plan.targets.len());

		for target in plan.targets {
			let node = self.node(&target.node_id)?;

			targets.push(fanout::Target { node: node.clone(), index_ids: target.index_ids });
		}

		tracing::info!(
			query = %req.query,
			nodes = targets.len(),
			has_text = parsed.has_text(),
			"Search started."
		);

		let outcome = fanout::run(
			targets,
			&parsed,
			&fanout::Settings {
				timeout: options.timeout,
				max_results_per_node: options.max_results_per_node,
				wait_for_indexing: req.wait_for_indexing,
			},
			&cancel,
		)
		.await?;

		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		let mut node_weights = self.cfg.reranking.node_weights.clone();

		if let Some(overrides) = &req.node_weights {
			node_weights.extend(overrides.iter().map(|(node, weight)| (node.clone(), *weight)));
		}

		let ranked = rerank::rerank(
			outcome.hits,
			&rerank::Weights {
				nodes: &node_weights,
				indexes: &self.cfg.reranking.index_weights,
				multipliers: &self.cfg.reranking.diminishing_multipliers,
			},
			options.min_relevance,
		);
		let total_results = ranked.len();
		let render_options = render::RenderOptions {
			snippet_only: req.snippet_only,
			snippet_length: options.snippet_length,
			max_snippets: options.max_snippets,
			highlight: req.highlight,
			prefix: &self.cfg.search.highlight_prefix,
			suffix: &self.cfg.search.highlight_suffix,
		};
		let results: Vec<SearchResult> = ranked
			.into_iter()
			.skip(options.offset)
			.take(options.limit)
			.map(|result| render::render(result, &render_options))
			.collect();
		let mut warnings = plan.warnings;

		warnings.extend(outcome.warnings);

		let metadata = SearchMetadata {
			nodes_requested: outcome.nodes_requested,
			nodes_searched: outcome.nodes_searched,
			execution_time: elapsed_ms(started.elapsed()),
			node_timings: outcome.node_timings,
			warnings,
		};

		tracing::info!(
			total_results,
			returned = results.len(),
			nodes_requested = metadata.nodes_requested,
			nodes_searched = metadata.nodes_searched,
			execution_ms = metadata.execution_time,
			"Search finished."
		);

		Ok(SearchResponse { query: req.query, total_results, results, metadata })
	}

	/// Parses `query` without touching any index.
	pub fn validate_query(&self, query: &str) -> QueryValidationResult {
		query::validate(query)
	}
}

fn resolve_options(service: &SearchService, req: &SearchRequest) -> Result<SearchOptions> {
	let defaults = &service.cfg.search;
	let limit = req.limit.unwrap_or(i64::from(defaults.limit));
	let offset = req.offset.unwrap_or(i64::from(defaults.offset));
	let min_relevance = req.min_relevance.unwrap_or(defaults.min_relevance);

	if req.query.trim().is_empty() {
		return Err(invalid("query must be non-empty."));
	}
	if limit < 0 {
		return Err(invalid("limit must be zero or greater."));
	}
	if offset < 0 {
		return Err(invalid("offset must be zero or greater."));
	}
	if !min_relevance.is_finite() || !(0.0..=1.0).contains(&min_relevance) {
		return Err(invalid("minRelevance must be between 0.0 and 1.0."));
	}
	if let Some(weights) = &req.node_weights
		&& weights.values().any(|weight| !weight.is_finite() || *weight < 0.0)
	{
		return Err(invalid("nodeWeights must be finite and zero or greater."));
	}

	let max_results_per_node = req.max_results_per_node.unwrap_or(defaults.max_results_per_node);
	let timeout_seconds = req.timeout_seconds.unwrap_or(defaults.timeout_seconds);
	let snippet_length = req.snippet_length.unwrap_or(defaults.snippet_length);
	let max_snippets = req.max_snippets_per_result.unwrap_or(defaults.max_snippets_per_result);

	if max_results_per_node == 0 {
		return Err(invalid("maxResultsPerNode must be greater than zero."));
	}
	if timeout_seconds == 0 {
		return Err(invalid("timeoutSeconds must be greater than zero."));
	}
	if snippet_length == 0 || max_snippets == 0 {
		return Err(invalid("snippetLength and maxSnippetsPerResult must be greater than zero."));
	}

	Ok(SearchOptions {
		limit: usize::try_from(limit).unwrap_or(usize::MAX),
		offset: usize::try_from(offset).unwrap_or(usize::MAX),
		min_relevance,
		max_results_per_node: max_results_per_node as usize,
		timeout: Duration::from_secs(timeout_seconds),
		snippet_length: snippet_length as usize,
		max_snippets: max_snippets as usize,
	})
}

fn invalid(message: &str) -> Error {
	Error::InvalidRequest { message: message.to_string() }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
	u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
