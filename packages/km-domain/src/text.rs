use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

/// Lowercased unique words of `text` in first-seen order. Single-character words are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for word in text.unicode_words() {
		if word.chars().count() < 2 {
			continue;
		}

		let lowered = word.to_lowercase();

		if seen.insert(lowered.clone()) {
			out.push(lowered);
		}
	}

	out
}

/// Byte offset and text of every word in `text`.
pub fn word_spans(text: &str) -> Vec<(usize, &str)> {
	text.unicode_word_indices().collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokenize_lowercases_and_dedupes() {
		assert_eq!(tokenize("Rust, rust and RUST a b"), vec!["rust".to_string(), "and".to_string()]);
	}

	#[test]
	fn word_spans_report_byte_offsets() {
		let spans = word_spans("héllo world");

		assert_eq!(spans, vec![(0, "héllo"), (7, "world")]);
	}
}
