use clap::Parser;

use km::{
	Args, Command,
	commands::{self, PutArgs},
};
use km_testkit::TestDir;

fn parse(argv: &[&str]) -> Args {
	Args::try_parse_from(argv).expect("Failed to parse arguments.")
}

#[test]
fn search_flags_map_onto_the_request() {
	let args = parse(&[
		"km",
		"-c",
		"km.toml",
		"search",
		"rust AND tags:guide",
		"--node",
		"personal",
		"--node",
		"work",
		"--exclude-index",
		"work:vectors",
		"--limit",
		"5",
		"--node-weight",
		"work=0.5",
		"--snippet-only",
		"--highlight",
	]);
	let Command::Search(search) = args.command else {
		panic!("Expected the search command.");
	};
	let request = search.into_request();

	assert_eq!(request.query, "rust AND tags:guide");
	assert_eq!(request.nodes, vec!["personal".to_string(), "work".to_string()]);
	assert_eq!(request.exclude_indexes, vec!["work:vectors".to_string()]);
	assert_eq!(request.limit, Some(5));
	assert_eq!(request.node_weights.and_then(|weights| weights.get("work").copied()), Some(0.5));
	assert!(request.snippet_only && request.highlight);
	assert!(!request.wait_for_indexing);
}

#[test]
fn negative_limits_reach_the_service() {
	let args = parse(&["km", "search", "rust", "--limit", "-1"]);
	let Command::Search(search) = args.command else {
		panic!("Expected the search command.");
	};

	assert_eq!(search.into_request().limit, Some(-1));
}

#[test]
fn malformed_node_weights_are_rejected() {
	assert!(Args::try_parse_from(["km", "search", "rust", "--node-weight", "work"]).is_err());
	assert!(Args::try_parse_from(["km", "search", "rust", "--node-weight", "work=heavy"]).is_err());
}

#[test]
fn put_requires_a_body() {
	assert!(Args::try_parse_from(["km", "put", "--node", "personal", "--id", "doc1"]).is_err());
}

#[test]
fn put_builds_a_record_from_a_file() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let path = dir.write("note.md", "# Heading\nbody").expect("Failed to write note.");
	let path = path.to_string_lossy().into_owned();
	let args = parse(&[
		"km",
		"put",
		"--node",
		"personal",
		"--id",
		"doc1",
		"--file",
		&path,
		"--mime-type",
		"text/markdown",
		"--tag",
		"guide",
		"--meta",
		"author = ada",
		"--created-at",
		"2024-01-02T03:04:05Z",
	]);
	let Command::Put(put) = args.command else {
		panic!("Expected the put command.");
	};
	let record: km_domain::Record = PutArgs::into_record(put).expect("Failed to build record.");

	assert_eq!(record.id, "doc1");
	assert_eq!(record.content, "# Heading\nbody");
	assert_eq!(record.mime_type, "text/markdown");
	assert_eq!(record.tags, vec!["guide".to_string()]);
	assert_eq!(record.metadata.get("author").map(String::as_str), Some("ada"));
	assert_eq!(record.created_at.unix_timestamp(), 1_704_164_645);
}

#[test]
fn nodes_are_described_with_index_availability() {
	let mut cfg = km_config::Config::default();

	cfg.nodes.insert(
		"remote".to_string(),
		km_config::NodeConfig {
			id: None,
			access: km_config::NodeAccess::ReadOnly,
			content_index: km_config::ContentIndexConfig::Postgres(km_config::PostgresContentIndex {
				connection_string: "postgres://localhost/km".to_string(),
				table: None,
			}),
			search_indexes: vec![km_config::SearchIndexConfig::Postgres(
				km_config::PostgresSearchIndex {
					id: "pg".to_string(),
					connection_string: "postgres://localhost/km".to_string(),
					required: true,
				},
			)],
		},
	);

	let service = km_search::SearchService::from_config(cfg);
	let described = commands::describe_nodes(&service);
	let node = &described["nodes"][0];

	assert_eq!(node["id"], "remote");
	assert_eq!(node["access"], "readOnly");
	assert_eq!(node["contentAvailable"], false);
	assert_eq!(node["indexes"][0]["id"], "pg");
	assert_eq!(node["indexes"][0]["available"], false);
	assert_eq!(node["indexes"][0]["required"], true);
}
