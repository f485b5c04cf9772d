//! Query AST shared by the parser and the indexes, plus predicate evaluation against records.

use std::{borrow::Cow, cmp::Ordering};

use time::{
	Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};

use crate::{Error, Record, Result};

/// Field names accepted by the parser. `metadata.<key>` is accepted for any key.
pub const AVAILABLE_FIELDS: &[&str] =
	&["id", "title", "description", "content", "tags", "createdAt", "mimeType", "metadata.*"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
	Id,
	Title,
	Description,
	Content,
	Tags,
	CreatedAt,
	MimeType,
	Metadata(String),
}
impl Field {
	pub fn parse(raw: &str) -> Option<Self> {
		if let Some(key) = raw.strip_prefix("metadata.") {
			return (!key.is_empty()).then(|| Self::Metadata(key.to_string()));
		}

		match raw.to_ascii_lowercase().as_str() {
			"id" => Some(Self::Id),
			"title" => Some(Self::Title),
			"description" => Some(Self::Description),
			"content" => Some(Self::Content),
			"tags" | "tag" => Some(Self::Tags),
			"createdat" | "created_at" => Some(Self::CreatedAt),
			"mimetype" | "mime_type" => Some(Self::MimeType),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Cow<'_, str> {
		match self {
			Self::Id => Cow::Borrowed("id"),
			Self::Title => Cow::Borrowed("title"),
			Self::Description => Cow::Borrowed("description"),
			Self::Content => Cow::Borrowed("content"),
			Self::Tags => Cow::Borrowed("tags"),
			Self::CreatedAt => Cow::Borrowed("createdAt"),
			Self::MimeType => Cow::Borrowed("mimeType"),
			Self::Metadata(key) => Cow::Owned(format!("metadata.{key}")),
		}
	}

	/// Fields the full-text engine indexes. All others are filter-only.
	pub fn is_full_text(&self) -> bool {
		matches!(self, Self::Title | Self::Description | Self::Content)
	}

	/// Converts a literal to the representation this field compares against.
	pub fn coerce(&self, value: Value) -> Result<Value> {
		match (self, value) {
			(Self::CreatedAt, Value::String(raw)) => parse_datetime(&raw).map(Value::DateTime),
			(Self::CreatedAt, Value::Number(_)) | (Self::CreatedAt, Value::Bool(_)) => {
				Err(Error::InvalidValue {
					message: "createdAt must be compared with an RFC3339 timestamp or a date."
						.to_string(),
				})
			},
			(_, value) => Ok(value),
		}
	}

	fn lookup<'a>(&self, record: &'a Record) -> FieldValue<'a> {
		match self {
			Self::Id => FieldValue::Text(&record.id),
			Self::Title => record.title.as_deref().map(FieldValue::Text).unwrap_or(FieldValue::Missing),
			Self::Description => record
				.description
				.as_deref()
				.map(FieldValue::Text)
				.unwrap_or(FieldValue::Missing),
			Self::Content => FieldValue::Text(&record.content),
			Self::Tags => FieldValue::List(&record.tags),
			Self::CreatedAt => FieldValue::DateTime(record.created_at),
			Self::MimeType => FieldValue::Text(&record.mime_type),
			Self::Metadata(key) => {
				record.metadata.get(key).map(|value| FieldValue::Text(value)).unwrap_or(FieldValue::Missing)
			},
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
	String(String),
	Number(f64),
	Bool(bool),
	DateTime(OffsetDateTime),
	Null,
}
impl Value {
	fn as_text(&self) -> Option<Cow<'_, str>> {
		match self {
			Self::String(value) => Some(Cow::Borrowed(value)),
			Self::Number(value) => Some(Cow::Owned(value.to_string())),
			Self::Bool(value) => Some(Cow::Owned(value.to_string())),
			Self::DateTime(value) => value.format(&Rfc3339).ok().map(Cow::Owned),
			Self::Null => None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
	Eq,
	Ne,
	Gt,
	Gte,
	Lt,
	Lte,
	Contains,
}
impl CompareOp {
	fn accepts(self, ordering: Ordering) -> bool {
		match self {
			Self::Eq => ordering == Ordering::Equal,
			Self::Ne => ordering != Ordering::Equal,
			Self::Gt => ordering == Ordering::Greater,
			Self::Gte => ordering != Ordering::Less,
			Self::Lt => ordering == Ordering::Less,
			Self::Lte => ordering != Ordering::Greater,
			Self::Contains => false,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueryNode {
	/// Matches every record.
	All,
	And(Vec<QueryNode>),
	Or(Vec<QueryNode>),
	Not(Box<QueryNode>),
	/// Free text routed to the full-text engine, optionally scoped to one full-text field.
	Text { field: Option<Field>, term: String },
	Compare { field: Field, op: CompareOp, value: Value },
	In { field: Field, values: Vec<Value>, negated: bool },
	Exists { field: Field, exists: bool },
}
impl QueryNode {
	/// The predicate left after removing positive free text.
	///
	/// Only text that every match must contain is dropped, since the indexes already require it.
	/// `OR` and `NOT` branches that carry text stay whole and are decided per record through
	/// [`QueryNode::evaluate`].
	pub fn filter(&self) -> QueryNode {
		match self {
			Self::Text { .. } => Self::All,
			Self::And(nodes) => {
				let mut kept: Vec<_> =
					nodes.iter().map(Self::filter).filter(|node| *node != Self::All).collect();

				match kept.len() {
					0 => Self::All,
					1 => kept.remove(0),
					_ => Self::And(kept),
				}
			},
			Self::Or(_) | Self::Not(_) => self.clone(),
			other => other.clone(),
		}
	}

	/// Free-text terms that contribute to matching, in query order. Negated terms are skipped.
	pub fn text_terms(&self) -> Vec<String> {
		let mut out = Vec::new();

		self.collect_text_terms(&mut out);

		out
	}

	pub fn evaluate(&self, record: &Record) -> bool {
		match self {
			Self::All => true,
			Self::And(nodes) => nodes.iter().all(|node| node.evaluate(record)),
			Self::Or(nodes) => nodes.iter().any(|node| node.evaluate(record)),
			Self::Not(node) => !node.evaluate(record),
			Self::Text { field, term } => evaluate_text(field.as_ref(), term, record),
			Self::Compare { field, op, value } => {
				evaluate_compare(&field.lookup(record), *op, value)
			},
			Self::In { field, values, negated } => {
				let actual = field.lookup(record);
				let found =
					values.iter().any(|value| evaluate_compare(&actual, CompareOp::Eq, value));

				found != *negated
			},
			Self::Exists { field, exists } => {
				let present = match field.lookup(record) {
					FieldValue::Missing => false,
					FieldValue::List(values) => !values.is_empty(),
					_ => true,
				};

				present == *exists
			},
		}
	}

	fn collect_text_terms(&self, out: &mut Vec<String>) {
		match self {
			Self::Text { term, .. } => out.push(term.clone()),
			Self::And(nodes) | Self::Or(nodes) => {
				for node in nodes {
					node.collect_text_terms(out);
				}
			},
			_ => {},
		}
	}
}

enum FieldValue<'a> {
	Text(&'a str),
	List(&'a [String]),
	DateTime(OffsetDateTime),
	Missing,
}

fn evaluate_text(field: Option<&Field>, term: &str, record: &Record) -> bool {
	let needle = term.to_lowercase();
	let haystacks: Vec<Option<&str>> = match field {
		Some(Field::Title) => vec![record.title.as_deref()],
		Some(Field::Description) => vec![record.description.as_deref()],
		Some(Field::Content) => vec![Some(record.content.as_str())],
		_ => vec![
			record.title.as_deref(),
			record.description.as_deref(),
			Some(record.content.as_str()),
		],
	};

	haystacks.into_iter().flatten().any(|text| text.to_lowercase().contains(&needle))
}

fn evaluate_compare(actual: &FieldValue<'_>, op: CompareOp, expected: &Value) -> bool {
	match actual {
		FieldValue::Text(text) => compare_text(text, op, expected),
		FieldValue::List(values) => match op {
			CompareOp::Ne => !values.iter().any(|value| compare_text(value, CompareOp::Eq, expected)),
			_ => values.iter().any(|value| compare_text(value, op, expected)),
		},
		FieldValue::DateTime(actual) => match expected {
			Value::DateTime(expected) => op.accepts(actual.cmp(expected)),
			Value::String(raw) => match parse_datetime(raw) {
				Ok(expected) => op.accepts(actual.cmp(&expected)),
				Err(_) => false,
			},
			_ => op == CompareOp::Ne,
		},
		FieldValue::Missing => match (op, expected) {
			(CompareOp::Eq, Value::Null) => true,
			(CompareOp::Ne, Value::Null) => false,
			(CompareOp::Ne, _) => true,
			_ => false,
		},
	}
}

fn compare_text(actual: &str, op: CompareOp, expected: &Value) -> bool {
	if op == CompareOp::Contains {
		return expected
			.as_text()
			.is_some_and(|needle| actual.to_lowercase().contains(&needle.to_lowercase()));
	}

	match ordering(actual, expected) {
		Some(ordering) => op.accepts(ordering),
		None => op == CompareOp::Ne,
	}
}

fn ordering(actual: &str, expected: &Value) -> Option<Ordering> {
	match expected {
		Value::String(expected) => Some(actual.to_lowercase().cmp(&expected.to_lowercase())),
		Value::Number(expected) => actual.trim().parse::<f64>().ok()?.partial_cmp(expected),
		Value::Bool(expected) => {
			actual.trim().parse::<bool>().ok().map(|actual| actual.cmp(expected))
		},
		Value::DateTime(expected) => parse_datetime(actual).ok().map(|actual| actual.cmp(expected)),
		Value::Null => None,
	}
}

/// Accepts RFC3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_datetime(raw: &str) -> Result<OffsetDateTime> {
	let trimmed = raw.trim();

	if let Ok(value) = OffsetDateTime::parse(trimmed, &Rfc3339) {
		return Ok(value);
	}

	Date::parse(trimmed, format_description!("[year]-[month]-[day]"))
		.map(|date| date.midnight().assume_utc())
		.map_err(|_| Error::InvalidValue {
			message: format!("'{trimmed}' is not an RFC3339 timestamp or YYYY-MM-DD date."),
		})
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	fn record() -> Record {
		let mut record = Record::new("doc-1", "Rust makes systems programming approachable.");

		record.title = Some("Rust Guide".to_string());
		record.tags = vec!["rust".to_string(), "guide".to_string()];
		record.metadata.insert("pages".to_string(), "42".to_string());
		record.created_at = datetime!(2024-05-01 10:00 UTC);

		record
	}

	fn compare(field: Field, op: CompareOp, value: Value) -> QueryNode {
		QueryNode::Compare { field, op, value }
	}

	#[test]
	fn tags_match_any_element() {
		let node = compare(Field::Tags, CompareOp::Eq, Value::String("GUIDE".to_string()));

		assert!(node.evaluate(&record()));

		let node = compare(Field::Tags, CompareOp::Ne, Value::String("rust".to_string()));

		assert!(!node.evaluate(&record()));
	}

	#[test]
	fn metadata_compares_numerically() {
		let node = compare(Field::Metadata("pages".to_string()), CompareOp::Gt, Value::Number(40.0));

		assert!(node.evaluate(&record()));

		let node = compare(Field::Metadata("missing".to_string()), CompareOp::Eq, Value::Null);

		assert!(node.evaluate(&record()));
	}

	#[test]
	fn created_at_accepts_dates() {
		let value = Field::CreatedAt
			.coerce(Value::String("2024-04-30".to_string()))
			.expect("Failed to coerce date.");
		let node = compare(Field::CreatedAt, CompareOp::Gte, value);

		assert!(node.evaluate(&record()));
		assert!(Field::CreatedAt.coerce(Value::String("yesterday".to_string())).is_err());
	}

	#[test]
	fn filter_prunes_only_required_text() {
		let tag = compare(Field::Tags, CompareOp::Eq, Value::String("rust".to_string()));
		let text = QueryNode::Text { field: None, term: "systems".to_string() };
		let query = QueryNode::And(vec![
			text.clone(),
			tag.clone(),
			QueryNode::Or(vec![text.clone(), tag.clone()]),
		]);

		assert_eq!(
			query.filter(),
			QueryNode::And(vec![tag.clone(), QueryNode::Or(vec![text.clone(), tag])])
		);
		assert_eq!(query.text_terms(), vec!["systems".to_string(), "systems".to_string()]);

		let negated = QueryNode::Not(Box::new(text));

		assert_eq!(negated.filter(), negated);
	}

	#[test]
	fn retained_text_branches_decide_per_record() {
		let query = QueryNode::Or(vec![
			QueryNode::Text { field: None, term: "ownership".to_string() },
			QueryNode::Not(Box::new(QueryNode::Text { field: None, term: "rust".to_string() })),
		]);
		let mut other = record();

		other.title = None;
		other.content = "python garbage collection".to_string();

		assert!(!query.filter().evaluate(&record()));
		assert!(query.filter().evaluate(&other));
	}

	#[test]
	fn in_and_exists_respect_negation() {
		let node = QueryNode::In {
			field: Field::MimeType,
			values: vec![Value::String("text/markdown".to_string())],
			negated: true,
		};

		assert!(node.evaluate(&record()));
		assert!(
			!QueryNode::Exists { field: Field::Description, exists: true }.evaluate(&record())
		);
	}

	#[test]
	fn text_matches_case_insensitively() {
		let node = QueryNode::Text { field: Some(Field::Title), term: "guide".to_string() };

		assert!(node.evaluate(&record()));
	}
}
