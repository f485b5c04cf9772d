//! Snippets and highlighting for the returned page.

use std::collections::HashSet;

use km_domain::{Record, text};

use crate::search::{SearchResult, rerank::Ranked};

const ELLIPSIS: char = '…';

pub(crate) struct RenderOptions<'a> {
	pub(crate) snippet_only: bool,
	pub(crate) snippet_length: usize,
	pub(crate) max_snippets: usize,
	pub(crate) highlight: bool,
	pub(crate) prefix: &'a str,
	pub(crate) suffix: &'a str,
}

pub(crate) fn render(ranked: Ranked, options: &RenderOptions<'_>) -> SearchResult {
	let Ranked { node_id, record, relevance, matched_terms } = ranked;
	let Record { id, title, description, content, mime_type, tags, metadata, created_at } = record;
	let terms = term_set(&matched_terms);
	let title = title.unwrap_or_default();
	let description = description.unwrap_or_default();
	let content = if options.snippet_only {
		snippets(&content, &terms, options.snippet_length, options.max_snippets)
	} else {
		content
	};
	let (title, description, content) = if options.highlight && !terms.is_empty() {
		(
			highlight(&title, &terms, options.prefix, options.suffix),
			highlight(&description, &terms, options.prefix, options.suffix),
			highlight(&content, &terms, options.prefix, options.suffix),
		)
	} else {
		(title, description, content)
	};

	SearchResult {
		id,
		node_id,
		relevance,
		title,
		description,
		content,
		mime_type,
		created_at,
		tags,
		metadata,
		matched_terms,
	}
}

/// Lowercased words of every matched term. Multi-word phrases contribute each word.
fn term_set(terms: &[String]) -> HashSet<String> {
	terms.iter().flat_map(|term| text::tokenize(term)).collect()
}

/// Up to `max` non-overlapping windows of `length` characters centred on matched words.
///
/// Falls back to the leading window when nothing matches. Truncated edges get an ellipsis.
fn snippets(content: &str, terms: &HashSet<String>, length: usize, max: usize) -> String {
	let offsets: Vec<usize> = content.char_indices().map(|(offset, _)| offset).collect();
	let total = offsets.len();

	if total <= length {
		return content.to_string();
	}

	let byte_at = |index: usize| offsets.get(index).copied().unwrap_or(content.len());
	let mut windows: Vec<(usize, usize)> = Vec::new();

	for (offset, word) in text::word_spans(content) {
		if windows.len() >= max.max(1) {
			break;
		}
		if !terms.contains(&word.to_lowercase()) {
			continue;
		}

		let first = offsets.partition_point(|&byte| byte < offset);
		let middle = first + word.chars().count() / 2;
		let start = middle.saturating_sub(length / 2).min(total - length);

		if windows.last().is_some_and(|&(_, previous_end)| start < previous_end) {
			continue;
		}

		windows.push((start, start + length));
	}

	if windows.is_empty() {
		windows.push((0, length));
	}

	windows
		.into_iter()
		.map(|(start, end)| {
			let mut snippet = String::new();

			if start > 0 {
				snippet.push(ELLIPSIS);
			}

			snippet.push_str(content[byte_at(start)..byte_at(end)].trim());

			if end < total {
				snippet.push(ELLIPSIS);
			}

			snippet
		})
		.collect::<Vec<_>>()
		.join(" ")
}

/// Wraps whole words found in `terms`, case-insensitively.
fn highlight(input: &str, terms: &HashSet<String>, prefix: &str, suffix: &str) -> String {
	let mut out = String::with_capacity(input.len());
	let mut cursor = 0;

	for (offset, word) in text::word_spans(input) {
		if !terms.contains(&word.to_lowercase()) {
			continue;
		}

		out.push_str(&input[cursor..offset]);
		out.push_str(prefix);
		out.push_str(word);
		out.push_str(suffix);

		cursor = offset + word.len();
	}

	out.push_str(&input[cursor..]);

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	fn terms(values: &[&str]) -> HashSet<String> {
		term_set(&values.iter().map(|value| value.to_string()).collect::<Vec<_>>())
	}

	#[test]
	fn short_content_is_returned_whole() {
		assert_eq!(snippets("tiny text", &terms(&["text"]), 50, 1), "tiny text");
	}

	#[test]
	fn snippet_is_centred_on_the_match() {
		let content = format!("{}needle{}", "x ".repeat(100), " y".repeat(100));
		let snippet = snippets(&content, &terms(&["needle"]), 20, 1);

		assert!(snippet.contains("needle"), "{snippet}");
		assert!(snippet.starts_with(ELLIPSIS) && snippet.ends_with(ELLIPSIS), "{snippet}");
		assert!(snippet.chars().count() <= 22, "{snippet}");
	}

	#[test]
	fn leading_window_is_used_without_matches() {
		let content = "alpha beta gamma delta epsilon zeta eta theta";
		let snippet = snippets(content, &terms(&["omega"]), 10, 2);

		assert_eq!(snippet, format!("alpha beta{ELLIPSIS}"));
	}

	#[test]
	fn multiple_snippets_do_not_overlap() {
		let content = format!("first {} second {} first again", "z ".repeat(60), "z ".repeat(60));
		let snippet = snippets(&content, &terms(&["first", "second"]), 16, 3);

		assert_eq!(snippet.matches("first").count(), 2, "{snippet}");
		assert_eq!(snippet.matches("second").count(), 1, "{snippet}");
	}

	#[test]
	fn snippets_respect_multibyte_boundaries() {
		let content = format!("{}café crème{}", "é ".repeat(40), " ü".repeat(40));
		let snippet = snippets(&content, &terms(&["crème"]), 12, 1);

		assert!(snippet.contains("crème"), "{snippet}");
	}

	#[test]
	fn highlighting_wraps_whole_words_only() {
		let highlighted =
			highlight("Rust and rusty RUST.", &terms(&["rust"]), "<mark>", "</mark>");

		assert_eq!(highlighted, "<mark>Rust</mark> and rusty <mark>RUST</mark>.");
	}

	#[test]
	fn only_reported_surface_forms_are_highlighted() {
		let highlighted =
			highlight("We were testing tests.", &terms(&["testing"]), "[", "]");

		assert_eq!(highlighted, "We were [testing] tests.");
	}
}
