use std::collections::BTreeMap;

use sqlx::FromRow;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{Error, Result};
use km_domain::Record;

#[derive(Clone, Debug, PartialEq)]
pub struct VectorMatch {
	pub content_id: String,
	/// Cosine similarity of the unit-normalized vectors, in `[-1, 1]`.
	pub score: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FtsMatch {
	pub content_id: String,
	/// Negated BM25; larger is better.
	pub score: f32,
	/// Lowercased surface forms the tokenizer matched, stems included.
	pub matched_terms: Vec<String>,
}

#[derive(Clone, Debug, FromRow)]
pub struct ContentRow {
	pub id: String,
	pub title: Option<String>,
	pub description: Option<String>,
	pub content: String,
	pub mime_type: String,
	pub tags: String,
	pub metadata: String,
	pub created_at: String,
}
impl ContentRow {
	/// Rows with empty content or an unreadable timestamp cannot be rendered.
	pub fn into_record(self) -> Result<Record> {
		if self.content.trim().is_empty() {
			return Err(Error::InvalidRecord { id: self.id, message: "content is empty".to_string() });
		}

		let created_at = OffsetDateTime::parse(&self.created_at, &Rfc3339).map_err(|err| {
			Error::InvalidRecord { id: self.id.clone(), message: format!("createdAt: {err}") }
		})?;
		let tags: Vec<String> = serde_json::from_str(&self.tags)?;
		let metadata: BTreeMap<String, String> = serde_json::from_str(&self.metadata)?;

		Ok(Record {
			id: self.id,
			title: self.title,
			description: self.description,
			content: self.content,
			mime_type: self.mime_type,
			tags,
			metadata,
			created_at,
		})
	}
}
