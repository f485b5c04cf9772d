//! Argument types for each subcommand and their conversion into service calls.

use std::{collections::HashMap, fs, path::PathBuf};

use clap::ArgGroup;
use color_eyre::eyre;
use serde_json::{Value, json};

use km_config::NodeAccess;
use km_domain::{Record, query};
use km_search::{SearchRequest, SearchService};

#[derive(Debug, clap::Args)]
#[command(rename_all = "kebab")]
pub struct SearchArgs {
	pub query: String,
	/// Restrict the search to this node. Repeatable.
	#[arg(long = "node", value_name = "NODE")]
	pub nodes: Vec<String>,
	#[arg(long = "exclude-node", value_name = "NODE")]
	pub exclude_nodes: Vec<String>,
	/// `INDEX` on every node, or `NODE:INDEX` on one node. Repeatable.
	#[arg(long = "index", value_name = "INDEX")]
	pub indexes: Vec<String>,
	#[arg(long = "exclude-index", value_name = "INDEX")]
	pub exclude_indexes: Vec<String>,
	#[arg(long, allow_negative_numbers = true)]
	pub limit: Option<i64>,
	#[arg(long, allow_negative_numbers = true)]
	pub offset: Option<i64>,
	#[arg(long)]
	pub min_relevance: Option<f32>,
	#[arg(long)]
	pub max_results_per_node: Option<u32>,
	/// `NODE=WEIGHT`, replacing the configured weight of that node. Repeatable.
	#[arg(long = "node-weight", value_name = "NODE=WEIGHT", value_parser = parse_node_weight)]
	pub node_weights: Vec<(String, f32)>,
	#[arg(long)]
	pub snippet_only: bool,
	#[arg(long)]
	pub snippet_length: Option<u32>,
	#[arg(long)]
	pub max_snippets: Option<u32>,
	#[arg(long)]
	pub highlight: bool,
	#[arg(long)]
	pub wait_for_indexing: bool,
	#[arg(long)]
	pub timeout_seconds: Option<u64>,
}
impl SearchArgs {
	pub fn into_request(self) -> SearchRequest {
		let node_weights = (!self.node_weights.is_empty())
			.then(|| self.node_weights.into_iter().collect::<HashMap<_, _>>());

		SearchRequest {
			query: self.query,
			nodes: self.nodes,
			exclude_nodes: self.exclude_nodes,
			search_indexes: self.indexes,
			exclude_indexes: self.exclude_indexes,
			limit: self.limit,
			offset: self.offset,
			min_relevance: self.min_relevance,
			max_results_per_node: self.max_results_per_node,
			node_weights,
			snippet_only: self.snippet_only,
			snippet_length: self.snippet_length,
			max_snippets_per_result: self.max_snippets,
			highlight: self.highlight,
			wait_for_indexing: self.wait_for_indexing,
			timeout_seconds: self.timeout_seconds,
		}
	}
}

#[derive(Debug, clap::Args)]
#[command(
	rename_all = "kebab",
	group(ArgGroup::new("body").required(true).args(["content", "file"])),
)]
pub struct PutArgs {
	#[arg(long, value_name = "NODE")]
	pub node: String,
	#[arg(long, value_name = "ID")]
	pub id: String,
	#[arg(long)]
	pub title: Option<String>,
	#[arg(long)]
	pub description: Option<String>,
	#[arg(long)]
	pub content: Option<String>,
	/// Read the content from a UTF-8 file.
	#[arg(long, value_name = "PATH")]
	pub file: Option<PathBuf>,
	#[arg(long)]
	pub mime_type: Option<String>,
	#[arg(long = "tag", value_name = "TAG")]
	pub tags: Vec<String>,
	/// `KEY=VALUE`. Repeatable.
	#[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_metadata)]
	pub metadata: Vec<(String, String)>,
	/// RFC 3339 timestamp or `YYYY-MM-DD`. Defaults to now.
	#[arg(long, value_name = "TIME")]
	pub created_at: Option<String>,
}
impl PutArgs {
	pub fn into_record(self) -> color_eyre::Result<Record> {
		let content = match (self.content, self.file) {
			(Some(content), _) => content,
			(None, Some(path)) => fs::read_to_string(&path)
				.map_err(|err| eyre::eyre!("Failed to read {}: {err}", path.display()))?,
			(None, None) => return Err(eyre::eyre!("Either --content or --file is required.")),
		};
		let mut record = Record::new(self.id, content);

		record.title = self.title;
		record.description = self.description;
		record.tags = self.tags;
		record.metadata = self.metadata.into_iter().collect();

		if let Some(mime_type) = self.mime_type {
			record.mime_type = mime_type;
		}
		if let Some(raw) = self.created_at {
			record.created_at = query::parse_datetime(&raw)?;
		}

		Ok(record)
	}
}

#[derive(Debug, clap::Args)]
#[command(rename_all = "kebab")]
pub struct RecordArgs {
	#[arg(long, value_name = "NODE")]
	pub node: String,
	pub id: String,
}

/// Node ids, access modes and index availability, in node order.
pub fn describe_nodes(service: &SearchService) -> Value {
	let nodes: Vec<Value> = service
		.nodes()
		.map(|node| {
			let indexes: Vec<Value> = node
				.indexes()
				.iter()
				.map(|index| match index.backend() {
					Ok(backend) => json!({
						"id": index.id(),
						"kind": backend.kind().as_str(),
						"required": index.required(),
						"available": true,
					}),
					Err(err) => json!({
						"id": index.id(),
						"required": index.required(),
						"available": false,
						"error": err.to_string(),
					}),
				})
				.collect();
			let access = match node.access() {
				NodeAccess::ReadWrite => "readWrite",
				NodeAccess::ReadOnly => "readOnly",
			};

			json!({
				"id": node.id(),
				"access": access,
				"contentAvailable": node.content().is_ok(),
				"indexes": indexes,
			})
		})
		.collect();

	json!({ "nodes": nodes })
}

fn parse_node_weight(raw: &str) -> Result<(String, f32), String> {
	let (node, weight) = split_pair(raw)?;
	let weight: f32 = weight.parse().map_err(|_| format!("'{weight}' is not a number."))?;

	Ok((node, weight))
}

fn parse_metadata(raw: &str) -> Result<(String, String), String> {
	split_pair(raw)
}

fn split_pair(raw: &str) -> Result<(String, String), String> {
	let Some((key, value)) = raw.split_once('=') else {
		return Err(format!("Expected KEY=VALUE, got '{raw}'."));
	};
	let key = key.trim();

	if key.is_empty() {
		return Err(format!("Missing key in '{raw}'."));
	}

	Ok((key.to_string(), value.trim().to_string()))
}
