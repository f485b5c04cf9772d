pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use tokio_util::sync::CancellationToken;

use km_search::SearchService;

use crate::commands::{PutArgs, RecordArgs, SearchArgs};

#[derive(Debug, Parser)]
#[command(
	version = km_cli::VERSION,
	rename_all = "kebab",
	styles = km_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE", global = true, default_value = "km.toml")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
#[command(rename_all = "kebab")]
pub enum Command {
	/// Search every selected node and print the ranked response as JSON.
	Search(SearchArgs),
	/// Check query syntax without touching any index.
	Validate { query: String },
	/// Store a record and index it on one node.
	Put(PutArgs),
	/// Print one record as JSON.
	Get(RecordArgs),
	/// Remove a record from a node and all of its indexes.
	Delete(RecordArgs),
	/// List configured nodes and their indexes.
	Nodes,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let cfg = km_config::load(&args.config)?;

	km_cli::init_tracing(&cfg.service.log_level);

	let service = SearchService::from_config(cfg);
	let result = dispatch(&service, args.command).await;

	service.close().await;

	result
}

async fn dispatch(service: &SearchService, command: Command) -> color_eyre::Result<()> {
	match command {
		Command::Search(search) => {
			let cancel = CancellationToken::new();
			let interrupt = cancel.clone();

			tokio::spawn(async move {
				if tokio::signal::ctrl_c().await.is_ok() {
					tracing::info!("Interrupt received. Cancelling search.");

					interrupt.cancel();
				}
			});

			let response = service.search(search.into_request(), cancel).await?;

			km_cli::print_json(&response)?;
		},
		Command::Validate { query } => {
			let validation = service.validate_query(&query);

			km_cli::print_json(&validation)?;

			if !validation.is_valid {
				return Err(eyre::eyre!("Query is invalid."));
			}
		},
		Command::Put(put) => {
			let node = put.node.clone();
			let record = put.into_record()?;

			service.put(&node, &record).await?;

			tracing::info!(node = %node, record = %record.id, "Record stored.");
		},
		Command::Get(target) => {
			let Some(record) = service.get(&target.node, &target.id).await? else {
				return Err(eyre::eyre!(
					"Record '{}' was not found on node '{}'.",
					target.id,
					target.node
				));
			};

			km_cli::print_json(&record)?;
		},
		Command::Delete(target) => {
			let removed = service.delete(&target.node, &target.id).await?;

			km_cli::print_json(&serde_json::json!({ "removed": removed }))?;
		},
		Command::Nodes => km_cli::print_json(&commands::describe_nodes(service))?,
	}

	Ok(())
}
