use std::time::Duration;

use reqwest::{Client, header::HeaderMap};
use serde_json::Value;

use crate::{BoxFuture, EmbeddingGenerator, Error, Result};
use km_config::EmbeddingsConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Embedding generator backed by one of the supported HTTP providers.
pub struct HttpEmbeddingGenerator {
	client: Client,
	cfg: EmbeddingsConfig,
	dimensions: u32,
}
impl HttpEmbeddingGenerator {
	pub fn new(cfg: EmbeddingsConfig, dimensions: u32) -> Result<Self> {
		if let EmbeddingsConfig::AzureOpenAi(azure) = &cfg
			&& azure.api_key.is_none()
		{
			return Err(Error::InvalidConfig {
				message: "Azure OpenAI managed identity is not available; configure api_key."
					.to_string(),
			});
		}

		let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

		Ok(Self { client, cfg, dimensions })
	}

	async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		let (url, headers, body) = self.request(text)?;
		let res = self.client.post(url).headers(headers).json(&body).send().await?;
		let json: Value = res.error_for_status()?.json().await?;
		let vector = match &self.cfg {
			EmbeddingsConfig::Ollama(_) => parse_ollama_response(json)?,
			EmbeddingsConfig::OpenAi(_) | EmbeddingsConfig::AzureOpenAi(_) => {
				parse_openai_response(json)?
			},
			EmbeddingsConfig::HuggingFace(_) => parse_hugging_face_response(json)?,
		};

		tracing::debug!(
			provider = self.cfg.provider(),
			model = self.cfg.model(),
			dimensions = vector.len(),
			"Embedding generated."
		);

		Ok(vector)
	}

	fn request(&self, text: &str) -> Result<(String, HeaderMap, Value)> {
		match &self.cfg {
			EmbeddingsConfig::Ollama(cfg) => Ok((
				format!("{}/api/embed", cfg.base_url.trim_end_matches('/')),
				HeaderMap::new(),
				serde_json::json!({ "model": cfg.model, "input": text }),
			)),
			EmbeddingsConfig::OpenAi(cfg) => Ok((
				format!(
					"{}/v1/embeddings",
					cfg.base_url.as_deref().unwrap_or(OPENAI_BASE_URL).trim_end_matches('/')
				),
				crate::bearer_headers(&cfg.api_key)?,
				serde_json::json!({
					"model": cfg.model,
					"input": [text],
					"dimensions": self.dimensions,
				}),
			)),
			EmbeddingsConfig::AzureOpenAi(cfg) => {
				let api_key = cfg.api_key.as_deref().ok_or_else(|| Error::InvalidConfig {
					message: "Azure OpenAI api_key is required.".to_string(),
				})?;

				Ok((
					format!(
						"{}/openai/deployments/{}/embeddings?api-version={}",
						cfg.endpoint.trim_end_matches('/'),
						cfg.deployment,
						cfg.api_version
					),
					crate::api_key_headers(api_key)?,
					serde_json::json!({ "input": [text] }),
				))
			},
			EmbeddingsConfig::HuggingFace(cfg) => Ok((
				format!("{}/models/{}", cfg.base_url.trim_end_matches('/'), cfg.model),
				crate::bearer_headers(&cfg.api_key)?,
				serde_json::json!({ "inputs": [text] }),
			)),
		}
	}
}
impl EmbeddingGenerator for HttpEmbeddingGenerator {
	fn provider(&self) -> &str {
		self.cfg.provider()
	}

	fn model(&self) -> &str {
		self.cfg.model()
	}

	fn dimensions(&self) -> u32 {
		self.dimensions
	}

	fn generate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(self.embed(text))
	}
}

fn parse_ollama_response(json: Value) -> Result<Vec<f32>> {
	let first = json
		.get("embeddings")
		.and_then(Value::as_array)
		.and_then(|rows| rows.first())
		.or_else(|| json.get("embedding"))
		.ok_or_else(|| Error::InvalidResponse {
			message: "Ollama response is missing embeddings.".to_string(),
		})?;

	parse_vector(first)
}

fn parse_openai_response(json: Value) -> Result<Vec<f32>> {
	let data = json.get("data").and_then(Value::as_array).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let first = data
		.iter()
		.min_by_key(|item| item.get("index").and_then(Value::as_u64).unwrap_or(0))
		.and_then(|item| item.get("embedding"))
		.ok_or_else(|| Error::InvalidResponse {
			message: "Embedding item missing embedding array.".to_string(),
		})?;

	parse_vector(first)
}

/// Feature-extraction endpoints answer with either `[[f32]]` or `[f32]`.
fn parse_hugging_face_response(json: Value) -> Result<Vec<f32>> {
	let rows = json.as_array().ok_or_else(|| Error::InvalidResponse {
		message: "Hugging Face response must be an array.".to_string(),
	})?;

	match rows.first() {
		Some(first) if first.is_array() => parse_vector(first),
		_ => parse_vector(&json),
	}
}

fn parse_vector(value: &Value) -> Result<Vec<f32>> {
	let items = value.as_array().ok_or_else(|| Error::InvalidResponse {
		message: "Embedding must be an array.".to_string(),
	})?;
	let mut out = Vec::with_capacity(items.len());

	for item in items {
		let number = item.as_f64().ok_or_else(|| Error::InvalidResponse {
			message: "Embedding value must be numeric.".to_string(),
		})?;

		out.push(number as f32);
	}

	if out.is_empty() {
		return Err(Error::InvalidResponse { message: "Embedding is empty.".to_string() });
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_ollama_embeddings() {
		let json = serde_json::json!({ "model": "nomic", "embeddings": [[0.5, 1.5, -2.0]] });

		assert_eq!(parse_ollama_response(json).expect("parse failed"), vec![0.5, 1.5, -2.0]);
	}

	#[test]
	fn parses_openai_lowest_index_first() {
		let json = serde_json::json!({
			"data": [
				{ "index": 1, "embedding": [2.0, 3.0] },
				{ "index": 0, "embedding": [0.5, 1.5] }
			]
		});

		assert_eq!(parse_openai_response(json).expect("parse failed"), vec![0.5, 1.5]);
	}

	#[test]
	fn parses_nested_and_flat_hugging_face_payloads() {
		let nested = serde_json::json!([[0.25, 0.75]]);
		let flat = serde_json::json!([0.25, 0.75]);

		assert_eq!(parse_hugging_face_response(nested).expect("parse failed"), vec![0.25, 0.75]);
		assert_eq!(parse_hugging_face_response(flat).expect("parse failed"), vec![0.25, 0.75]);
	}

	#[test]
	fn rejects_non_numeric_values() {
		let json = serde_json::json!({ "embeddings": [["x"]] });

		assert!(parse_ollama_response(json).is_err());
	}
}
