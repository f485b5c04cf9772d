use std::collections::BTreeMap;

#[test]
fn version_starts_with_the_package_version() {
	assert!(km_cli::VERSION.starts_with(env!("CARGO_PKG_VERSION")));
}

#[test]
fn json_output_is_pretty_and_newline_terminated() {
	let value = BTreeMap::from([("nodes", 2)]);
	let rendered = km_cli::render_json(&value).expect("Failed to render JSON.");

	assert_eq!(rendered, "{\n  \"nodes\": 2\n}\n");
}

#[test]
fn unparsable_log_levels_fall_back_to_info() {
	assert_eq!(km_cli::log_filter("km=loudest").to_string(), "info");
	assert_eq!(km_cli::log_filter("km_search=debug").to_string(), "km_search=debug");
}
