//! Query parsing.
//!
//! A query whose trimmed text starts with `{` is a Mongo-style JSON predicate. Anything else is
//! infix notation: free-text words and quoted phrases, `field op value` comparisons, `AND`, `OR`,
//! `NOT` and parentheses, with adjacency meaning `AND`. Both forms produce the same
//! [`QueryNode`] tree; free text is routed to the full-text engine and the rest is evaluated as a
//! filter against hydrated records.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use km_domain::query::{AVAILABLE_FIELDS, CompareOp, Field, QueryNode, Value};

const MAX_QUERY_DEPTH: usize = 8;
const MAX_QUERY_NODES: usize = 128;
const MAX_IN_LIST_ITEMS: usize = 128;
const MAX_STRING_BYTES: usize = 512;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryParseError {
	pub message: String,
	/// Character offset into the raw query.
	pub position: Option<usize>,
}
impl QueryParseError {
	fn at(message: impl Into<String>, position: usize) -> Self {
		Self { message: message.into(), position: Some(position) }
	}

	fn unplaced(message: impl Into<String>) -> Self {
		Self { message: message.into(), position: None }
	}
}
impl Display for QueryParseError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self.position {
			Some(position) => write!(f, "{} (at position {position})", self.message),
			None => write!(f, "{}", self.message),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryValidationResult {
	pub is_valid: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_position: Option<usize>,
	pub available_fields: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ParsedQuery {
	pub root: QueryNode,
	/// `root` without the free text every match must contain.
	pub filter: QueryNode,
	pub text_terms: Vec<String>,
	/// FTS5 `MATCH` expression, absent when no free text is required of every match.
	pub fts_expression: Option<String>,
}
impl ParsedQuery {
	pub fn parse(raw: &str) -> Result<Self, QueryParseError> {
		let trimmed = raw.trim();

		if trimmed.is_empty() {
			return Err(QueryParseError::at("query must be non-empty.", 0));
		}

		let root = if trimmed.starts_with('{') {
			JsonParser::new(raw).parse()?
		} else {
			InfixParser::new(raw)?.parse()?
		};

		Ok(Self::from_root(root))
	}

	pub fn has_text(&self) -> bool {
		!self.text_terms.is_empty()
	}

	/// Text handed to embedding-based indexes.
	pub fn vector_text(&self) -> String {
		self.text_terms.join(" ")
	}

	fn from_root(root: QueryNode) -> Self {
		Self {
			filter: root.filter(),
			text_terms: root.text_terms(),
			fts_expression: fts_expression(&root),
			root,
		}
	}
}

/// Dry-run parse. Never touches an index.
pub fn validate(raw: &str) -> QueryValidationResult {
	let available_fields = AVAILABLE_FIELDS.iter().map(|field| field.to_string()).collect();

	match ParsedQuery::parse(raw) {
		Ok(_) => QueryValidationResult {
			is_valid: true,
			error_message: None,
			error_position: None,
			available_fields,
		},
		Err(err) => QueryValidationResult {
			is_valid: false,
			error_message: Some(err.message),
			error_position: err.position,
			available_fields,
		},
	}
}

fn fts_expression(node: &QueryNode) -> Option<String> {
	match node {
		QueryNode::Text { field, term } => {
			let phrase = quote_fts(term)?;

			Some(match field {
				Some(field) => format!("{}:{phrase}", field.as_str()),
				None => phrase,
			})
		},
		QueryNode::And(nodes) => {
			let mut positive = Vec::new();
			let mut negative = Vec::new();

			for node in nodes {
				match node {
					// Exclusions must be exact; anything looser is left to the filter.
					QueryNode::Not(inner) if is_plain_text(inner) => {
						negative.extend(fts_expression(inner))
					},
					QueryNode::Not(_) => {},
					other => positive.extend(fts_expression(other)),
				}
			}

			let mut expression = join_fts(positive, " AND ")?;

			for excluded in negative {
				expression = format!("{expression} NOT {excluded}");
			}

			Some(expression)
		},
		QueryNode::Or(nodes) => {
			// A branch without required text can match records the engine would never return.
			let branches = nodes.iter().map(fts_expression).collect::<Option<Vec<_>>>()?;

			join_fts(branches, " OR ")
		},
		_ => None,
	}
}

fn is_plain_text(node: &QueryNode) -> bool {
	match node {
		QueryNode::Text { .. } => true,
		QueryNode::And(nodes) | QueryNode::Or(nodes) => nodes.iter().all(is_plain_text),
		_ => false,
	}
}

fn join_fts(mut parts: Vec<String>, separator: &str) -> Option<String> {
	match parts.len() {
		0 => None,
		1 => parts.pop(),
		_ => Some(format!("({})", parts.join(separator))),
	}
}

fn quote_fts(term: &str) -> Option<String> {
	let cleaned = term.trim();

	if cleaned.is_empty() {
		return None;
	}

	Some(format!("\"{}\"", cleaned.replace('"', "\"\"")))
}

fn literal(raw: &str) -> Value {
	match raw.to_ascii_lowercase().as_str() {
		"null" => Value::Null,
		"true" => Value::Bool(true),
		"false" => Value::Bool(false),
		_ => match raw.parse::<f64>() {
			Ok(number) if number.is_finite() => Value::Number(number),
			_ => Value::String(raw.to_string()),
		},
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InfixOp {
	Colon,
	Eq,
	Ne,
	Gt,
	Gte,
	Lt,
	Lte,
}
impl InfixOp {
	fn compare_op(self) -> CompareOp {
		match self {
			Self::Colon => CompareOp::Contains,
			Self::Eq => CompareOp::Eq,
			Self::Ne => CompareOp::Ne,
			Self::Gt => CompareOp::Gt,
			Self::Gte => CompareOp::Gte,
			Self::Lt => CompareOp::Lt,
			Self::Lte => CompareOp::Lte,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
	LParen,
	RParen,
	Word(String),
	Quoted(String),
	Op(InfixOp),
	And,
	Or,
	Not,
}

#[derive(Clone, Debug)]
struct Token {
	kind: TokenKind,
	position: usize,
}

fn lex(raw: &str) -> Result<Vec<Token>, QueryParseError> {
	let chars: Vec<char> = raw.chars().collect();
	let mut tokens = Vec::new();
	let mut i = 0;
	let mut after_op = false;

	while i < chars.len() {
		let c = chars[i];

		if c.is_whitespace() {
			i += 1;

			continue;
		}

		let start = i;
		let kind = match c {
			'(' => {
				i += 1;

				TokenKind::LParen
			},
			')' => {
				i += 1;

				TokenKind::RParen
			},
			'"' => {
				let mut text = String::new();
				let mut closed = false;

				i += 1;

				while i < chars.len() {
					match chars[i] {
						'\\' if i + 1 < chars.len() => {
							text.push(chars[i + 1]);
							i += 2;
						},
						'"' => {
							closed = true;
							i += 1;

							break;
						},
						other => {
							text.push(other);
							i += 1;
						},
					}
				}

				if !closed {
					return Err(QueryParseError::at("unterminated quoted string.", start));
				}

				TokenKind::Quoted(text)
			},
			':' | '=' | '!' | '<' | '>' if !after_op => {
				let next_is_eq = chars.get(i + 1) == Some(&'=');
				let (op, width) = match c {
					':' => (InfixOp::Colon, 1),
					'=' => (InfixOp::Eq, if next_is_eq { 2 } else { 1 }),
					'!' if next_is_eq => (InfixOp::Ne, 2),
					'!' => return Err(QueryParseError::at("expected '=' after '!'.", start)),
					'>' if next_is_eq => (InfixOp::Gte, 2),
					'>' => (InfixOp::Gt, 1),
					'<' if next_is_eq => (InfixOp::Lte, 2),
					_ => (InfixOp::Lt, 1),
				};

				i += width;

				tokens.push(Token { kind: TokenKind::Op(op), position: start });

				after_op = true;

				continue;
			},
			_ => {
				let mut word = String::new();

				while i < chars.len() {
					let ch = chars[i];

					if ch.is_whitespace()
						|| matches!(ch, '(' | ')' | '"')
						|| (!after_op && matches!(ch, ':' | '=' | '!' | '<' | '>'))
					{
						break;
					}

					word.push(ch);
					i += 1;
				}

				if after_op {
					TokenKind::Word(word)
				} else {
					match word.to_ascii_uppercase().as_str() {
						"AND" => TokenKind::And,
						"OR" => TokenKind::Or,
						"NOT" => TokenKind::Not,
						_ => TokenKind::Word(word),
					}
				}
			},
		};

		tokens.push(Token { kind, position: start });

		after_op = false;
	}

	Ok(tokens)
}

struct InfixParser {
	tokens: Vec<Token>,
	pos: usize,
	end: usize,
	nodes: usize,
}
impl InfixParser {
	fn new(raw: &str) -> Result<Self, QueryParseError> {
		Ok(Self { tokens: lex(raw)?, pos: 0, end: raw.chars().count(), nodes: 0 })
	}

	fn parse(mut self) -> Result<QueryNode, QueryParseError> {
		let node = self.parse_or(0)?;

		if let Some(token) = self.peek() {
			let message = match token.kind {
				TokenKind::RParen => "unexpected ')'.",
				_ => "unexpected token.",
			};

			return Err(QueryParseError::at(message, token.position));
		}

		Ok(node)
	}

	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.pos)
	}

	fn next(&mut self) -> Option<Token> {
		let token = self.tokens.get(self.pos).cloned();

		if token.is_some() {
			self.pos += 1;
		}

		token
	}

	fn count_node(&mut self, position: usize) -> Result<(), QueryParseError> {
		self.nodes += 1;

		if self.nodes > MAX_QUERY_NODES {
			return Err(QueryParseError::at(
				format!("query must not contain more than {MAX_QUERY_NODES} terms."),
				position,
			));
		}

		Ok(())
	}

	fn parse_or(&mut self, depth: usize) -> Result<QueryNode, QueryParseError> {
		let mut items = vec![self.parse_and(depth)?];

		while matches!(self.peek().map(|token| &token.kind), Some(TokenKind::Or)) {
			self.pos += 1;
			items.push(self.parse_and(depth)?);
		}

		Ok(if items.len() == 1 { items.remove(0) } else { QueryNode::Or(items) })
	}

	fn parse_and(&mut self, depth: usize) -> Result<QueryNode, QueryParseError> {
		let mut items = vec![self.parse_unary(depth)?];

		loop {
			match self.peek().map(|token| &token.kind) {
				Some(TokenKind::And) => {
					self.pos += 1;
					items.push(self.parse_unary(depth)?);
				},
				Some(TokenKind::Or) | Some(TokenKind::RParen) | None => break,
				Some(_) => items.push(self.parse_unary(depth)?),
			}
		}

		Ok(if items.len() == 1 { items.remove(0) } else { QueryNode::And(items) })
	}

	fn parse_unary(&mut self, depth: usize) -> Result<QueryNode, QueryParseError> {
		if let Some(Token { kind: TokenKind::Not, position }) = self.peek() {
			let position = *position;

			if depth + 1 > MAX_QUERY_DEPTH {
				return Err(QueryParseError::at(
					format!("query nesting must not exceed {MAX_QUERY_DEPTH} levels."),
					position,
				));
			}

			self.pos += 1;
			self.count_node(position)?;

			return Ok(QueryNode::Not(Box::new(self.parse_unary(depth + 1)?)));
		}

		self.parse_primary(depth)
	}

	fn parse_primary(&mut self, depth: usize) -> Result<QueryNode, QueryParseError> {
		let Some(token) = self.next() else {
			return Err(QueryParseError::at("unexpected end of query.", self.end));
		};

		match token.kind {
			TokenKind::LParen => {
				if depth + 1 > MAX_QUERY_DEPTH {
					return Err(QueryParseError::at(
						format!("query nesting must not exceed {MAX_QUERY_DEPTH} levels."),
						token.position,
					));
				}

				let inner = self.parse_or(depth + 1)?;

				match self.next() {
					Some(Token { kind: TokenKind::RParen, .. }) => Ok(inner),
					_ => Err(QueryParseError::at("unbalanced '('.", token.position)),
				}
			},
			TokenKind::Word(word) => {
				if matches!(self.peek().map(|next| &next.kind), Some(TokenKind::Op(_))) {
					return self.parse_comparison(word, token.position);
				}

				self.count_node(token.position)?;

				Ok(QueryNode::Text { field: None, term: word })
			},
			TokenKind::Quoted(phrase) => {
				self.count_node(token.position)?;

				Ok(QueryNode::Text { field: None, term: phrase })
			},
			TokenKind::RParen => Err(QueryParseError::at("unexpected ')'.", token.position)),
			TokenKind::Op(_) => {
				Err(QueryParseError::at("comparison is missing a field name.", token.position))
			},
			TokenKind::And | TokenKind::Or | TokenKind::Not => {
				Err(QueryParseError::at("operator is missing an operand.", token.position))
			},
		}
	}

	fn parse_comparison(
		&mut self,
		name: String,
		position: usize,
	) -> Result<QueryNode, QueryParseError> {
		let field = Field::parse(&name)
			.ok_or_else(|| QueryParseError::at(format!("unknown field '{name}'."), position))?;
		let Some(Token { kind: TokenKind::Op(op), position: op_position }) = self.next() else {
			return Err(QueryParseError::at("expected an operator.", position));
		};
		let (raw, quoted, value_position) = match self.next() {
			Some(Token { kind: TokenKind::Word(word), position }) if !word.is_empty() => {
				(word, false, position)
			},
			Some(Token { kind: TokenKind::Quoted(text), position }) => (text, true, position),
			_ => {
				return Err(QueryParseError::at(
					format!("expected a value after '{name}'."),
					op_position,
				));
			},
		};

		if raw.len() > MAX_STRING_BYTES {
			return Err(QueryParseError::at(
				format!("values must be at most {MAX_STRING_BYTES} bytes."),
				value_position,
			));
		}

		self.count_node(position)?;

		if op == InfixOp::Colon {
			if field.is_full_text() {
				return Ok(QueryNode::Text { field: Some(field), term: raw });
			}

			return match field {
				Field::Tags => {
					Ok(QueryNode::Compare { field, op: CompareOp::Eq, value: Value::String(raw) })
				},
				Field::CreatedAt => {
					let value = field
						.coerce(Value::String(raw))
						.map_err(|err| QueryParseError::at(err.to_string(), value_position))?;

					Ok(QueryNode::Compare { field, op: CompareOp::Eq, value })
				},
				field => Ok(QueryNode::Compare {
					field,
					op: CompareOp::Contains,
					value: Value::String(raw),
				}),
			};
		}

		let value = if quoted { Value::String(raw) } else { literal(&raw) };
		let value =
			field.coerce(value).map_err(|err| QueryParseError::at(err.to_string(), value_position))?;

		Ok(QueryNode::Compare { field, op: op.compare_op(), value })
	}
}

struct JsonParser<'a> {
	raw: &'a str,
	nodes: usize,
}
impl<'a> JsonParser<'a> {
	fn new(raw: &'a str) -> Self {
		Self { raw, nodes: 0 }
	}

	fn parse(mut self) -> Result<QueryNode, QueryParseError> {
		let value: JsonValue = serde_json::from_str(self.raw).map_err(|err| QueryParseError {
			message: format!("invalid JSON: {err}"),
			position: json_error_position(self.raw, &err),
		})?;
		let object = value
			.as_object()
			.ok_or_else(|| QueryParseError::at("JSON query must be an object.", 0))?;

		self.parse_object(object, 1)
	}

	fn position_of(&self, key: &str) -> Option<usize> {
		let needle = format!("\"{key}\"");

		self.raw.find(&needle).map(|byte| self.raw[..byte].chars().count())
	}

	fn error(&self, message: impl Into<String>, key: &str) -> QueryParseError {
		QueryParseError { message: message.into(), position: self.position_of(key) }
	}

	fn count_node(&mut self, key: &str) -> Result<(), QueryParseError> {
		self.nodes += 1;

		if self.nodes > MAX_QUERY_NODES {
			return Err(self.error(
				format!("query must not contain more than {MAX_QUERY_NODES} clauses."),
				key,
			));
		}

		Ok(())
	}

	fn parse_object(
		&mut self,
		object: &Map<String, JsonValue>,
		depth: usize,
	) -> Result<QueryNode, QueryParseError> {
		if depth > MAX_QUERY_DEPTH {
			return Err(QueryParseError::unplaced(format!(
				"query nesting must not exceed {MAX_QUERY_DEPTH} levels."
			)));
		}

		let mut clauses = Vec::with_capacity(object.len());

		for (key, value) in object {
			let clause = match key.as_str() {
				"$and" => QueryNode::And(self.parse_list(key, value, depth)?),
				"$or" => QueryNode::Or(self.parse_list(key, value, depth)?),
				"$nor" => QueryNode::Not(Box::new(QueryNode::Or(self.parse_list(key, value, depth)?))),
				"$not" => {
					let inner = value
						.as_object()
						.ok_or_else(|| self.error("$not must be an object.", key))?;

					QueryNode::Not(Box::new(self.parse_object(inner, depth + 1)?))
				},
				"$text" => self.parse_text(key, value)?,
				operator if operator.starts_with('$') => {
					return Err(self.error(format!("unknown operator '{operator}'."), key));
				},
				_ => self.parse_field(key, value)?,
			};

			clauses.push(clause);
		}

		Ok(match clauses.len() {
			0 => QueryNode::All,
			1 => clauses.remove(0),
			_ => QueryNode::And(clauses),
		})
	}

	fn parse_list(
		&mut self,
		key: &str,
		value: &JsonValue,
		depth: usize,
	) -> Result<Vec<QueryNode>, QueryParseError> {
		let items = value
			.as_array()
			.filter(|items| !items.is_empty())
			.ok_or_else(|| self.error(format!("{key} must be a non-empty array."), key))?;
		let mut out = Vec::with_capacity(items.len());

		for item in items {
			let object =
				item.as_object().ok_or_else(|| self.error(format!("{key} items must be objects."), key))?;

			out.push(self.parse_object(object, depth + 1)?);
		}

		Ok(out)
	}

	fn parse_text(&mut self, key: &str, value: &JsonValue) -> Result<QueryNode, QueryParseError> {
		let search = value
			.get("$search")
			.and_then(JsonValue::as_str)
			.filter(|search| !search.trim().is_empty())
			.ok_or_else(|| self.error("$text requires a non-empty $search string.", key))?;

		self.count_node(key)?;

		InfixParser::new(search)
			.and_then(InfixParser::parse)
			.map_err(|err| self.error(format!("$text.$search: {}", err.message), key))
	}

	fn parse_field(&mut self, key: &str, value: &JsonValue) -> Result<QueryNode, QueryParseError> {
		let field =
			Field::parse(key).ok_or_else(|| self.error(format!("unknown field '{key}'."), key))?;

		self.count_node(key)?;

		match value {
			JsonValue::Object(operators)
				if !operators.is_empty() && operators.keys().all(|op| op.starts_with('$')) =>
			{
				let mut clauses = Vec::with_capacity(operators.len());

				for (operator, operand) in operators {
					clauses.push(self.parse_operator(key, &field, operator, operand)?);
				}

				Ok(if clauses.len() == 1 { clauses.remove(0) } else { QueryNode::And(clauses) })
			},
			JsonValue::Object(_) => Err(self.error(
				format!("'{key}' must be a scalar, an array, or an operator object."),
				key,
			)),
			JsonValue::Array(items) => {
				Ok(QueryNode::In { field: field.clone(), values: self.scalars(key, &field, items)?, negated: false })
			},
			scalar => Ok(QueryNode::Compare {
				field: field.clone(),
				op: CompareOp::Eq,
				value: self.scalar(key, &field, scalar)?,
			}),
		}
	}

	fn parse_operator(
		&mut self,
		key: &str,
		field: &Field,
		operator: &str,
		operand: &JsonValue,
	) -> Result<QueryNode, QueryParseError> {
		let op = match operator {
			"$eq" => CompareOp::Eq,
			"$ne" => CompareOp::Ne,
			"$gt" => CompareOp::Gt,
			"$gte" => CompareOp::Gte,
			"$lt" => CompareOp::Lt,
			"$lte" => CompareOp::Lte,
			"$contains" => CompareOp::Contains,
			"$in" | "$nin" => {
				let items = operand
					.as_array()
					.ok_or_else(|| self.error(format!("{operator} must be an array."), key))?;

				return Ok(QueryNode::In {
					field: field.clone(),
					values: self.scalars(key, field, items)?,
					negated: operator == "$nin",
				});
			},
			"$exists" => {
				let exists = operand
					.as_bool()
					.ok_or_else(|| self.error("$exists must be a boolean.", key))?;

				return Ok(QueryNode::Exists { field: field.clone(), exists });
			},
			"$not" => {
				let inner = self.parse_field(key, operand)?;

				return Ok(QueryNode::Not(Box::new(inner)));
			},
			_ => return Err(self.error(format!("unknown operator '{operator}'."), key)),
		};

		Ok(QueryNode::Compare { field: field.clone(), op, value: self.scalar(key, field, operand)? })
	}

	fn scalars(
		&self,
		key: &str,
		field: &Field,
		items: &[JsonValue],
	) -> Result<Vec<Value>, QueryParseError> {
		if items.is_empty() || items.len() > MAX_IN_LIST_ITEMS {
			return Err(self.error(
				format!("'{key}' lists must contain 1 to {MAX_IN_LIST_ITEMS} values."),
				key,
			));
		}

		items.iter().map(|item| self.scalar(key, field, item)).collect()
	}

	fn scalar(&self, key: &str, field: &Field, value: &JsonValue) -> Result<Value, QueryParseError> {
		let value = match value {
			JsonValue::String(text) => {
				if text.len() > MAX_STRING_BYTES {
					return Err(self.error(
						format!("values must be at most {MAX_STRING_BYTES} bytes."),
						key,
					));
				}

				Value::String(text.clone())
			},
			JsonValue::Number(number) => Value::Number(
				number.as_f64().ok_or_else(|| self.error("number is out of range.", key))?,
			),
			JsonValue::Bool(flag) => Value::Bool(*flag),
			JsonValue::Null => Value::Null,
			JsonValue::Array(_) | JsonValue::Object(_) => {
				return Err(self.error(format!("'{key}' values must be scalars."), key));
			},
		};

		field.coerce(value).map_err(|err| self.error(err.to_string(), key))
	}
}

/// Converts serde_json's 1-based line and column into a character offset.
fn json_error_position(raw: &str, err: &serde_json::Error) -> Option<usize> {
	let line = err.line();

	if line == 0 {
		return None;
	}

	let mut offset = 0;

	for (index, text) in raw.split('\n').enumerate() {
		let width = text.chars().count();

		if index + 1 == line {
			return Some(offset + err.column().saturating_sub(1).min(width));
		}

		offset += width + 1;
	}

	Some(raw.chars().count())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn text(term: &str) -> QueryNode {
		QueryNode::Text { field: None, term: term.to_string() }
	}

	#[test]
	fn adjacency_is_implicit_and() {
		let parsed = ParsedQuery::parse("rust ownership").expect("Failed to parse.");

		assert_eq!(parsed.root, QueryNode::And(vec![text("rust"), text("ownership")]));
		assert_eq!(parsed.fts_expression.as_deref(), Some("(\"rust\" AND \"ownership\")"));
		assert_eq!(parsed.vector_text(), "rust ownership");
		assert_eq!(parsed.filter, QueryNode::All);
	}

	#[test]
	fn or_binds_looser_than_and() {
		let parsed = ParsedQuery::parse("a b OR c").expect("Failed to parse.");

		assert_eq!(
			parsed.root,
			QueryNode::Or(vec![QueryNode::And(vec![text("a"), text("b")]), text("c")])
		);
		assert_eq!(
			parsed.fts_expression.as_deref(),
			Some("((\"a\" AND \"b\") OR \"c\")")
		);
	}

	#[test]
	fn comparisons_become_filters() {
		let parsed = ParsedQuery::parse("title:rust AND tags:guide AND metadata.pages >= 10")
			.expect("Failed to parse.");

		assert_eq!(parsed.text_terms, vec!["rust".to_string()]);
		assert_eq!(parsed.fts_expression.as_deref(), Some("title:\"rust\""));
		assert_eq!(
			parsed.filter,
			QueryNode::And(vec![
				QueryNode::Compare {
					field: Field::Tags,
					op: CompareOp::Eq,
					value: Value::String("guide".to_string()),
				},
				QueryNode::Compare {
					field: Field::Metadata("pages".to_string()),
					op: CompareOp::Gte,
					value: Value::Number(10.0),
				},
			])
		);
	}

	#[test]
	fn values_after_operators_may_contain_colons() {
		let parsed =
			ParsedQuery::parse("createdAt>=2024-01-01T10:00:00Z").expect("Failed to parse.");

		assert!(matches!(
			parsed.filter,
			QueryNode::Compare { field: Field::CreatedAt, op: CompareOp::Gte, value: Value::DateTime(_) }
		));
	}

	#[test]
	fn negated_text_is_excluded_from_terms_and_match() {
		let parsed = ParsedQuery::parse("rust NOT python").expect("Failed to parse.");

		assert_eq!(parsed.text_terms, vec!["rust".to_string()]);
		assert_eq!(parsed.fts_expression.as_deref(), Some("\"rust\" NOT \"python\""));
	}

	#[test]
	fn negation_without_required_text_is_left_to_the_filter() {
		let parsed = ParsedQuery::parse("NOT python").expect("Failed to parse.");
		let negated = QueryNode::Not(Box::new(text("python")));

		assert!(parsed.fts_expression.is_none());
		assert!(!parsed.has_text());
		assert_eq!(parsed.filter, negated);

		let parsed = ParsedQuery::parse("NOT python NOT java").expect("Failed to parse.");

		assert!(parsed.fts_expression.is_none());
		assert!(matches!(parsed.filter, QueryNode::And(ref items) if items.len() == 2));

		let parsed = ParsedQuery::parse("rust NOT python").expect("Failed to parse.");

		assert_eq!(parsed.filter, negated);
	}

	#[test]
	fn or_with_a_filter_branch_is_not_narrowed_by_match() {
		for query in ["rust OR tags:x", "rust OR NOT python"] {
			let parsed = ParsedQuery::parse(query).expect("Failed to parse.");

			assert!(parsed.fts_expression.is_none(), "query {query:?}");
			assert_eq!(parsed.filter, parsed.root, "query {query:?}");
			assert_eq!(parsed.text_terms, vec!["rust".to_string()], "query {query:?}");
		}
	}

	#[test]
	fn mixed_exclusions_are_not_sent_to_match() {
		let parsed = ParsedQuery::parse("rust NOT (python tags:x)").expect("Failed to parse.");

		assert_eq!(parsed.fts_expression.as_deref(), Some("\"rust\""));
		assert!(matches!(parsed.filter, QueryNode::Not(_)));
	}

	#[test]
	fn quoted_phrases_escape_quotes() {
		let parsed = ParsedQuery::parse(r#""say \"hi\"""#).expect("Failed to parse.");

		assert_eq!(parsed.fts_expression.as_deref(), Some("\"say \"\"hi\"\"\""));
	}

	#[test]
	fn infix_errors_report_positions() {
		let cases = [
			("rust AND", 8),
			("(rust", 0),
			("rust)", 4),
			("\"open", 0),
			("colour:red", 0),
			("title:", 5),
			("createdAt > soon", 12),
		];

		for (query, position) in cases {
			let err = ParsedQuery::parse(query).expect_err("Expected parse error.");

			assert_eq!(err.position, Some(position), "query {query:?}: {}", err.message);
		}
	}

	#[test]
	fn json_predicates_parse() {
		let parsed = ParsedQuery::parse(
			r#"{"$text": {"$search": "vector search"}, "tags": {"$in": ["db", "ml"]}, "mimeType": "text/plain"}"#,
		)
		.expect("Failed to parse.");

		assert_eq!(parsed.text_terms, vec!["vector".to_string(), "search".to_string()]);

		let QueryNode::And(filters) = parsed.filter else {
			panic!("Expected a conjunction of filters.");
		};

		assert_eq!(filters.len(), 2);
		assert!(filters.contains(&QueryNode::In {
			field: Field::Tags,
			values: vec![Value::String("db".to_string()), Value::String("ml".to_string())],
			negated: false,
		}));
		assert!(filters.contains(&QueryNode::Compare {
			field: Field::MimeType,
			op: CompareOp::Eq,
			value: Value::String("text/plain".to_string()),
		}));
	}

	#[test]
	fn json_logical_operators_nest() {
		let parsed = ParsedQuery::parse(
			r#"{"$or": [{"id": "a"}, {"metadata.rank": {"$gt": 3, "$lte": 9}}], "$not": {"tags": "draft"}}"#,
		)
		.expect("Failed to parse.");

		assert!(!parsed.has_text());
		assert!(parsed.fts_expression.is_none());
		assert!(matches!(parsed.filter, QueryNode::And(ref items) if items.len() == 2));
	}

	#[test]
	fn invalid_json_reports_a_position() {
		let result = validate("{invalid json");

		assert!(!result.is_valid);
		assert!(result.error_position.is_some());
		assert!(result.available_fields.contains(&"createdAt".to_string()));
	}

	#[test]
	fn unknown_json_field_points_at_key() {
		let err = ParsedQuery::parse(r#"{"id": "a", "colour": "red"}"#)
			.expect_err("Expected unknown field.");

		assert_eq!(err.position, Some(12));
	}

	#[test]
	fn empty_query_is_invalid() {
		assert!(!validate("   ").is_valid);
	}

	#[test]
	fn nesting_is_bounded() {
		let depth = MAX_QUERY_DEPTH + 1;
		let query = format!("{}rust{}", "(".repeat(depth), ")".repeat(depth));

		assert!(ParsedQuery::parse(&query).is_err());
	}

	#[test]
	fn not_chains_are_bounded() {
		let query = format!("{}rust", "NOT ".repeat(5000));
		let err = ParsedQuery::parse(&query).expect_err("Expected nesting error.");

		assert_eq!(err.position, Some(4 * MAX_QUERY_DEPTH));

		let allowed = format!("{}rust", "NOT ".repeat(MAX_QUERY_DEPTH));

		assert!(ParsedQuery::parse(&allowed).is_ok());
	}
}
