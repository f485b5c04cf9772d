use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// A stored document as every index and the content store see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
	pub id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub content: String,
	#[serde(default = "default_mime_type")]
	pub mime_type: String,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub metadata: BTreeMap<String, String>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}
impl Record {
	pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			title: None,
			description: None,
			content: content.into(),
			mime_type: default_mime_type(),
			tags: Vec::new(),
			metadata: BTreeMap::new(),
			created_at: OffsetDateTime::now_utc(),
		}
	}

	/// Text handed to embedding generators: title, description and content, one per line.
	pub fn embedding_text(&self) -> String {
		[self.title.as_deref(), self.description.as_deref(), Some(self.content.as_str())]
			.into_iter()
			.flatten()
			.map(str::trim)
			.filter(|part| !part.is_empty())
			.collect::<Vec<_>>()
			.join("\n")
	}
}

fn default_mime_type() -> String {
	DEFAULT_MIME_TYPE.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deserializes_with_defaults() {
		let record: Record = serde_json::from_value(serde_json::json!({
			"id": "doc-1",
			"content": "hello",
			"createdAt": "2024-05-01T10:00:00Z"
		}))
		.expect("Failed to parse record.");

		assert_eq!(record.mime_type, DEFAULT_MIME_TYPE);
		assert!(record.tags.is_empty());
		assert!(record.title.is_none());
	}

	#[test]
	fn embedding_text_skips_missing_parts() {
		let mut record = Record::new("doc-1", "body");

		record.description = Some("  ".to_string());
		record.title = Some("Title".to_string());

		assert_eq!(record.embedding_text(), "Title\nbody");
	}
}
