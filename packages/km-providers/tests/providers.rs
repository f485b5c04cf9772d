use reqwest::header::AUTHORIZATION;

use km_config::{AzureOpenAiEmbeddings, EmbeddingsConfig, OllamaEmbeddings};

#[test]
fn builds_bearer_auth_header() {
	let headers = km_providers::bearer_headers("secret").expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn builds_azure_api_key_header() {
	let headers = km_providers::api_key_headers("secret").expect("Failed to build headers.");

	assert_eq!(headers.get("api-key").expect("Missing api-key header."), "secret");
}

#[test]
fn generator_describes_its_model() {
	let cfg = EmbeddingsConfig::Ollama(OllamaEmbeddings {
		model: "nomic-embed-text".to_string(),
		base_url: "http://localhost:11434".to_string(),
	});
	let generator = km_providers::from_config(&cfg, 768).expect("Failed to build generator.");

	assert_eq!(generator.provider(), "ollama");
	assert_eq!(generator.model(), "nomic-embed-text");
	assert_eq!(generator.dimensions(), 768);
}

#[test]
fn azure_managed_identity_is_rejected_at_build_time() {
	let cfg = EmbeddingsConfig::AzureOpenAi(AzureOpenAiEmbeddings {
		deployment: "embeddings".to_string(),
		endpoint: "https://example.openai.azure.com".to_string(),
		api_key: None,
		use_managed_identity: true,
		api_version: "2024-02-01".to_string(),
	});
	let err = km_providers::from_config(&cfg, 1536)
		.err()
		.expect("Expected managed identity to be rejected.");

	assert!(matches!(err, km_providers::Error::InvalidConfig { .. }), "Unexpected error: {err}");
}
