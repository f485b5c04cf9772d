//! Merges index hits from every node into one ranked list.

use std::{cmp::Ordering, collections::HashMap};

use km_domain::Record;

use crate::search::fanout::Hit;

pub(crate) struct Weights<'a> {
	pub(crate) nodes: &'a HashMap<String, f32>,
	/// Keyed by node id, then index id.
	pub(crate) indexes: &'a HashMap<String, HashMap<String, f32>>,
	pub(crate) multipliers: &'a [f32],
}
impl Weights<'_> {
	fn weight(&self, node_id: &str, index_id: &str) -> f32 {
		let node = self.nodes.get(node_id).copied().unwrap_or(1.0);
		let index = self
			.indexes
			.get(node_id)
			.and_then(|indexes| indexes.get(index_id))
			.copied()
			.unwrap_or(1.0);

		node * index
	}

	fn multiplier(&self, rank: usize) -> f32 {
		self.multipliers.get(rank).or(self.multipliers.last()).copied().unwrap_or(1.0)
	}
}

#[derive(Clone, Debug)]
pub(crate) struct Ranked {
	pub(crate) node_id: String,
	pub(crate) record: Record,
	pub(crate) relevance: f32,
	pub(crate) matched_terms: Vec<String>,
}

/// Weights, groups by `(record id, node id)`, aggregates with diminishing returns, drops
/// results under `min_relevance` and sorts.
pub(crate) fn rerank(hits: Vec<Hit>, weights: &Weights<'_>, min_relevance: f32) -> Vec<Ranked> {
	let mut groups: HashMap<(String, String), Vec<(f32, Hit)>> = HashMap::new();

	for hit in hits {
		let weighted = hit.relevance * weights.weight(&hit.node_id, &hit.index_id);

		groups.entry((hit.record.id.clone(), hit.node_id.clone())).or_default().push((weighted, hit));
	}

	let mut ranked: Vec<Ranked> = groups
		.into_values()
		.filter_map(|mut appearances| {
			appearances.sort_by(|a, b| b.0.total_cmp(&a.0));

			let relevance = aggregate(appearances.iter().map(|(weighted, _)| *weighted), weights);

			if relevance < min_relevance {
				return None;
			}

			let mut matched_terms: Vec<String> = Vec::new();

			for (_, hit) in &appearances {
				for term in &hit.matched_terms {
					if !matched_terms.contains(term) {
						matched_terms.push(term.clone());
					}
				}
			}

			let (_, top) = appearances.into_iter().next()?;

			Some(Ranked { node_id: top.node_id, record: top.record, relevance, matched_terms })
		})
		.collect();

	ranked.sort_by(compare);

	ranked
}

/// Sum of `weighted[rank] * multiplier[rank]` over appearances sorted descending, capped at 1.
fn aggregate(sorted: impl Iterator<Item = f32>, weights: &Weights<'_>) -> f32 {
	let total: f32 =
		sorted.enumerate().map(|(rank, weighted)| weighted * weights.multiplier(rank)).sum();

	total.min(1.0)
}

fn compare(a: &Ranked, b: &Ranked) -> Ordering {
	b.relevance
		.total_cmp(&a.relevance)
		.then_with(|| b.record.created_at.cmp(&a.record.created_at))
		.then_with(|| a.record.id.cmp(&b.record.id))
		.then_with(|| a.node_id.cmp(&b.node_id))
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;

	use super::*;

	const MULTIPLIERS: [f32; 4] = [1.0, 0.5, 0.25, 0.125];

	fn hit(node_id: &str, index_id: &str, record_id: &str, relevance: f32) -> Hit {
		let mut record = Record::new(record_id, format!("content of {record_id}"));

		record.created_at = OffsetDateTime::UNIX_EPOCH;

		Hit {
			node_id: node_id.to_string(),
			index_id: index_id.to_string(),
			record,
			relevance,
			matched_terms: vec![format!("{index_id}-term")],
		}
	}

	fn rank_with(
		hits: Vec<Hit>,
		nodes: &HashMap<String, f32>,
		multipliers: &[f32],
		min_relevance: f32,
	) -> Vec<Ranked> {
		let indexes = HashMap::new();

		rerank(hits, &Weights { nodes, indexes: &indexes, multipliers }, min_relevance)
	}

	#[test]
	fn duplicates_aggregate_with_diminishing_returns() {
		let ranked = rank_with(
			vec![hit("n", "fts", "a", 0.4), hit("n", "vec", "a", 0.6)],
			&HashMap::new(),
			&MULTIPLIERS,
			0.0,
		);

		assert_eq!(ranked.len(), 1);
		assert!((ranked[0].relevance - (0.6 + 0.4 * 0.5)).abs() < 1e-6);
		assert_eq!(ranked[0].matched_terms, vec!["vec-term".to_string(), "fts-term".to_string()]);
	}

	#[test]
	fn aggregation_caps_at_one() {
		let ranked = rank_with(
			vec![hit("n", "fts", "a", 0.9), hit("n", "vec", "a", 0.8)],
			&HashMap::new(),
			&MULTIPLIERS,
			0.0,
		);

		assert_eq!(ranked[0].relevance, 1.0);
	}

	#[test]
	fn long_groups_reuse_the_last_multiplier() {
		let hits = (0..5).map(|i| hit("n", &format!("i{i}"), "a", 0.1)).collect();
		let ranked = rank_with(hits, &HashMap::new(), &[1.0, 0.5], 0.0);

		assert!((ranked[0].relevance - (0.1 + 0.05 * 4.0)).abs() < 1e-6);
	}

	#[test]
	fn same_record_on_different_nodes_stays_separate() {
		let ranked = rank_with(
			vec![hit("a", "fts", "doc", 0.5), hit("b", "fts", "doc", 0.5)],
			&HashMap::new(),
			&MULTIPLIERS,
			0.0,
		);
		let nodes: Vec<_> = ranked.iter().map(|r| r.node_id.as_str()).collect();

		assert_eq!(nodes, vec!["a", "b"]);
	}

	#[test]
	fn threshold_applies_after_weighting() {
		let weights = HashMap::from([("low".to_string(), 0.5)]);
		let ranked = rank_with(
			vec![hit("low", "fts", "a", 0.5), hit("high", "fts", "b", 0.5)],
			&weights,
			&MULTIPLIERS,
			0.3,
		);

		assert_eq!(ranked.len(), 1);
		assert_eq!(ranked[0].node_id, "high");
	}

	#[test]
	fn raising_a_node_weight_never_lowers_its_results() {
		let hits = || vec![hit("a", "fts", "x", 0.4), hit("b", "fts", "y", 0.5)];
		let mut previous = 0.0;

		for weight in [0.5_f32, 1.0, 1.5, 2.0, 4.0] {
			let weights = HashMap::from([("a".to_string(), weight)]);
			let ranked = rank_with(hits(), &weights, &MULTIPLIERS, 0.0);
			let relevance = ranked
				.iter()
				.find(|r| r.node_id == "a")
				.map(|r| r.relevance)
				.expect("Missing result from node a.");

			assert!(relevance >= previous);

			previous = relevance;
		}
	}

	#[test]
	fn ties_break_by_newest_then_id() {
		let mut older = hit("n", "fts", "b", 0.7);
		let mut newer = hit("n", "fts", "c", 0.7);
		let same_time = hit("n", "fts", "a", 0.7);

		older.record.created_at = OffsetDateTime::UNIX_EPOCH;
		newer.record.created_at = OffsetDateTime::UNIX_EPOCH + time::Duration::days(1);

		let mut same_time_later = same_time.clone();

		same_time_later.record.id = "d".to_string();

		let ranked =
			rank_with(vec![older, same_time_later, newer, same_time], &HashMap::new(), &MULTIPLIERS, 0.0);
		let ids: Vec<_> = ranked.iter().map(|r| r.record.id.as_str()).collect();

		assert_eq!(ids, vec!["c", "a", "b", "d"]);
	}
}
