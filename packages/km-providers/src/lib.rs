pub mod embedding;

mod error;

pub use embedding::HttpEmbeddingGenerator;
pub use error::{Error, Result};

use std::{future::Future, pin::Pin, sync::Arc};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use km_config::EmbeddingsConfig;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Turns text into an embedding vector.
///
/// Implementations describe themselves so caches can key entries by provider, model and size.
pub trait EmbeddingGenerator
where
	Self: Send + Sync,
{
	fn provider(&self) -> &str;

	fn model(&self) -> &str;

	fn dimensions(&self) -> u32;

	fn generate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;
}

/// Builds the HTTP generator for an embeddings config variant.
pub fn from_config(
	cfg: &EmbeddingsConfig,
	dimensions: u32,
) -> Result<Arc<dyn EmbeddingGenerator>> {
	Ok(Arc::new(HttpEmbeddingGenerator::new(cfg.clone(), dimensions)?))
}

pub fn bearer_headers(api_key: &str) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	Ok(headers)
}

pub fn api_key_headers(api_key: &str) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(HeaderName::from_static("api-key"), HeaderValue::from_str(api_key)?);

	Ok(headers)
}
