//! Concurrent fan-out of one parsed query to every selected (node, index) pair.

use std::{
	collections::BTreeMap,
	sync::Arc,
	time::{Duration, Instant},
};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
	Error, IndexQuery, Node, Result,
	search::{NodeTiming, ParsedQuery},
};
use km_domain::{Record, query::QueryNode};

/// Extra candidates fetched per index when a filter may discard some of them.
const FILTER_OVERFETCH: usize = 4;

pub(crate) struct Target {
	pub(crate) node: Arc<Node>,
	pub(crate) index_ids: Vec<String>,
}

pub(crate) struct Settings {
	pub(crate) timeout: Duration,
	pub(crate) max_results_per_node: usize,
	pub(crate) wait_for_indexing: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct Hit {
	pub(crate) node_id: String,
	pub(crate) index_id: String,
	pub(crate) record: Record,
	/// Index-local relevance before weighting.
	pub(crate) relevance: f32,
	pub(crate) matched_terms: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct Outcome {
	pub(crate) hits: Vec<Hit>,
	pub(crate) nodes_requested: usize,
	pub(crate) nodes_searched: usize,
	pub(crate) node_timings: Vec<NodeTiming>,
	pub(crate) warnings: Vec<String>,
}

#[derive(Default)]
struct IndexHits {
	hits: Vec<Hit>,
	dropped: Vec<String>,
}

enum Failure {
	TimedOut,
	Failed(Error),
}

struct Report {
	node_id: String,
	index_id: String,
	elapsed: Duration,
	result: std::result::Result<IndexHits, Failure>,
}

#[derive(Default)]
struct NodeProgress {
	hits: Vec<Hit>,
	succeeded: usize,
	required_failed: bool,
	elapsed: Duration,
}

/// Waits for every task, or returns [`Error::Cancelled`] as soon as `cancel` fires.
pub(crate) async fn run(
	targets: Vec<Target>,
	query: &ParsedQuery,
	settings: &Settings,
	cancel: &CancellationToken,
) -> Result<Outcome> {
	let fetch_limit = if query.filter == QueryNode::All {
		settings.max_results_per_node
	} else {
		settings.max_results_per_node.saturating_mul(FILTER_OVERFETCH)
	};
	let index_query = Arc::new(IndexQuery {
		text: query.vector_text(),
		fts_expression: query.fts_expression.clone(),
		limit: fetch_limit,
	});
	let filter = Arc::new(query.filter.clone());
	let mut outcome = Outcome { nodes_requested: targets.len(), ..Default::default() };
	let mut progress: BTreeMap<String, NodeProgress> = BTreeMap::new();
	let mut required: BTreeMap<(String, String), bool> = BTreeMap::new();
	let mut tasks = JoinSet::new();

	for target in targets {
		let node_id = target.node.id().to_string();

		progress.entry(node_id.clone()).or_default();

		if let Err(err) = target.node.content() {
			tracing::warn!(node = %node_id, error = %err, "Node is unavailable.");

			outcome.warnings.push(format!("Node '{node_id}' failed: {err}"));

			continue;
		}

		for index_id in target.index_ids {
			let is_required = target.node.index(&index_id).is_some_and(|index| index.required());

			required.insert((node_id.clone(), index_id.clone()), is_required);

			let node = target.node.clone();
			let index_query = index_query.clone();
			let filter = filter.clone();
			let timeout = settings.timeout;
			let max_results = settings.max_results_per_node;
			let wait_for_indexing = settings.wait_for_indexing;

			tasks.spawn(async move {
				let started = Instant::now();
				let search = search_index(
					&node,
					&index_id,
					&index_query,
					&filter,
					wait_for_indexing,
					max_results,
				);
				let result = match tokio::time::timeout(timeout, search).await {
					Ok(Ok(hits)) => Ok(hits),
					Ok(Err(err)) => Err(Failure::Failed(err)),
					Err(_) => Err(Failure::TimedOut),
				};

				Report {
					node_id: node.id().to_string(),
					index_id,
					elapsed: started.elapsed(),
					result,
				}
			});
		}
	}

	loop {
		let joined = tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				tasks.abort_all();

				tracing::info!("Search cancelled.");

				return Err(Error::Cancelled);
			},
			joined = tasks.join_next() => joined,
		};
		let Some(joined) = joined else {
			break;
		};
		let report = match joined {
			Ok(report) => report,
			Err(err) => {
				tracing::error!(error = %err, "Search task did not complete.");

				outcome.warnings.push(format!("A search task did not complete: {err}"));

				continue;
			},
		};
		let node = progress.entry(report.node_id.clone()).or_default();

		node.elapsed = node.elapsed.max(report.elapsed);

		tracing::debug!(
			node = %report.node_id,
			index = %report.index_id,
			elapsed_ms = report.elapsed.as_millis() as u64,
			"Index search settled."
		);

		match report.result {
			Ok(mut index_hits) => {
				node.succeeded += 1;
				node.hits.append(&mut index_hits.hits);

				for warning in index_hits.dropped {
					tracing::warn!(node = %report.node_id, "{warning}");

					outcome.warnings.push(warning);
				}
			},
			Err(failure) => {
				let warning = match failure {
					Failure::TimedOut => format!(
						"Node '{}' index '{}' timed out after {}s.",
						report.node_id,
						report.index_id,
						settings.timeout.as_secs()
					),
					Failure::Failed(err) => format!(
						"Node '{}' index '{}' failed: {err}",
						report.node_id, report.index_id
					),
				};

				tracing::warn!(node = %report.node_id, index = %report.index_id, "{warning}");

				outcome.warnings.push(warning);

				if required
					.get(&(report.node_id.clone(), report.index_id.clone()))
					.copied()
					.unwrap_or(false)
				{
					node.required_failed = true;
				}
			},
		}
	}

	for (node_id, node) in progress {
		outcome.node_timings.push(NodeTiming {
			search_time: u64::try_from(node.elapsed.as_millis()).unwrap_or(u64::MAX),
			node_id: node_id.clone(),
		});

		if node.required_failed {
			outcome.warnings.push(format!(
				"Node '{node_id}' was skipped because a required index failed."
			));

			continue;
		}
		if node.succeeded == 0 {
			continue;
		}

		outcome.nodes_searched += 1;
		outcome.hits.extend(node.hits);
	}

	Ok(outcome)
}

async fn search_index(
	node: &Node,
	index_id: &str,
	query: &IndexQuery,
	filter: &QueryNode,
	wait_for_indexing: bool,
	max_results: usize,
) -> Result<IndexHits> {
	let index = node
		.index(index_id)
		.ok_or_else(|| Error::Unavailable { message: format!("index '{index_id}' is not configured") })?
		.backend()?;

	if wait_for_indexing {
		index.flush().await?;
	}

	let matches = index.search(query).await?;

	if matches.is_empty() {
		return Ok(IndexHits::default());
	}

	let ids: Vec<String> = matches.iter().map(|m| m.record_id.clone()).collect();
	let mut rows = node.content()?.get_many(&ids).await?;
	let mut out = IndexHits::default();

	for m in matches {
		if out.hits.len() >= max_results {
			break;
		}

		let Some(row) = rows.remove(&m.record_id) else {
			tracing::debug!(
				node = node.id(),
				index = index_id,
				record = %m.record_id,
				"Index entry has no content row."
			);

			continue;
		};
		let record = match row.into_record() {
			Ok(record) => record,
			Err(err) => {
				out.dropped.push(format!(
					"Node '{}' dropped record '{}': {err}",
					node.id(),
					m.record_id
				));

				continue;
			},
		};

		if !filter.evaluate(&record) {
			continue;
		}

		out.hits.push(Hit {
			node_id: node.id().to_string(),
			index_id: index_id.to_string(),
			record,
			relevance: m.relevance,
			matched_terms: m.matched_terms,
		});
	}

	Ok(out)
}
