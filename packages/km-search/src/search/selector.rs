//! Resolves which nodes and indexes take part in a search.

pub(crate) struct Selection<'a> {
	pub(crate) nodes: &'a [String],
	pub(crate) exclude_nodes: &'a [String],
	pub(crate) indexes: &'a [String],
	pub(crate) exclude_indexes: &'a [String],
	pub(crate) default_nodes: &'a [String],
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Target {
	pub(crate) node_id: String,
	pub(crate) index_ids: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct Plan {
	pub(crate) targets: Vec<Target>,
	pub(crate) warnings: Vec<String>,
}

/// `catalog` lists every configured node with its index ids, in node order.
pub(crate) fn plan(catalog: &[(String, Vec<String>)], selection: &Selection<'_>) -> Plan {
	let mut warnings = Vec::new();
	let is_configured = |name: &str| catalog.iter().any(|(id, _)| id == name);
	let requested: Vec<&str> = if !selection.nodes.is_empty() {
		let mut out = Vec::new();

		for name in selection.nodes.iter().map(|name| name.trim()).filter(|name| !name.is_empty()) {
			if !is_configured(name) {
				warnings.push(format!("Node '{name}' is not configured."));
			} else if !out.contains(&name) {
				out.push(name);
			}
		}

		out
	} else if !selection.default_nodes.is_empty() {
		selection
			.default_nodes
			.iter()
			.map(|name| name.trim())
			.filter(|name| is_configured(*name))
			.collect()
	} else {
		catalog.iter().map(|(id, _)| id.as_str()).collect()
	};
	let mut targets = Vec::new();

	for (node_id, index_ids) in catalog {
		if !requested.contains(&node_id.as_str())
			|| selection.exclude_nodes.iter().any(|name| name.trim() == node_id)
		{
			continue;
		}

		let selected: Vec<String> = index_ids
			.iter()
			.filter(|index_id| {
				(selection.indexes.is_empty() || index_matches(selection.indexes, node_id, index_id))
					&& !index_matches(selection.exclude_indexes, node_id, index_id)
			})
			.cloned()
			.collect();

		if selected.is_empty() {
			if selection.nodes.iter().any(|name| name.trim() == node_id) {
				warnings.push(format!("Node '{node_id}' has no selected indexes."));
			}

			continue;
		}

		targets.push(Target { node_id: node_id.clone(), index_ids: selected });
	}

	Plan { targets, warnings }
}

fn index_matches(patterns: &[String], node_id: &str, index_id: &str) -> bool {
	patterns.iter().any(|pattern| match pattern.trim().split_once(':') {
		Some((node, index)) => node == node_id && index == index_id,
		None => pattern.trim() == index_id,
	})
}
