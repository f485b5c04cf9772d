use std::sync::Arc;

use km_config::CacheMode;
use km_providers::EmbeddingGenerator;
use km_storage::{CachedEmbeddingGenerator, ContentStore, EmbeddingCache, Error, SqliteFtsIndex};
use km_testkit::{HashEmbedding, TestDir};

#[tokio::test]
async fn stemming_matches_inflected_forms() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let index = SqliteFtsIndex::new(dir.path("fts.db"), true);
	let docs = [
		km_testkit::record("d1", "Unit test", "A small test of the parser.", 1),
		km_testkit::record("d2", "", "We are testing the tokenizer.", 2),
		km_testkit::record("d3", "", "All tests passed yesterday.", 3),
		km_testkit::record("d4", "", "Nothing relevant here.", 4),
	];

	for doc in &docs {
		index.index(doc).await.expect("Failed to index doc.");
	}

	for query in ["\"testing\"", "\"tested\""] {
		let mut ids: Vec<_> = index
			.search(query, 10)
			.await
			.expect("Failed to search.")
			.into_iter()
			.map(|m| m.content_id)
			.collect();

		ids.sort();

		assert_eq!(ids, vec!["d1", "d2", "d3"], "query {query}");
	}

	let matches = index.search("\"tests\"", 10).await.expect("Failed to search.");
	let d2 = matches.iter().find(|m| m.content_id == "d2").expect("Missing d2.");

	assert_eq!(d2.matched_terms, vec!["testing".to_string()]);
	assert!(matches.iter().all(|m| m.score > 0.0));

	index.close().await;
}

#[tokio::test]
async fn without_stemming_only_exact_tokens_match() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let index = SqliteFtsIndex::new(dir.path("fts.db"), false);

	index
		.index(&km_testkit::record("d1", "", "We are testing the tokenizer.", 1))
		.await
		.expect("Failed to index doc.");

	assert!(index.search("\"test\"", 10).await.expect("Failed to search.").is_empty());
	assert_eq!(index.search("\"testing\"", 10).await.expect("Failed to search.").len(), 1);

	index.close().await;
}

#[tokio::test]
async fn fts_upsert_replaces_previous_text() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let index = SqliteFtsIndex::new(dir.path("fts.db"), true);

	index
		.index(&km_testkit::record("d1", "", "apples and pears", 1))
		.await
		.expect("Failed to index doc.");
	index
		.index(&km_testkit::record("d1", "", "oranges only", 1))
		.await
		.expect("Failed to re-index doc.");

	assert_eq!(index.count().await.expect("Failed to count."), 1);
	assert!(index.search("\"apples\"", 10).await.expect("Failed to search.").is_empty());
	assert_eq!(index.list(10).await.expect("Failed to list."), vec!["d1".to_string()]);

	index.remove("d1").await.expect("Failed to remove.");

	assert_eq!(index.count().await.expect("Failed to count."), 0);

	index.close().await;
}

#[tokio::test]
async fn content_store_round_trips_records() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let store = ContentStore::new(dir.path("content.db"));
	let mut record = km_testkit::record("d1", "Title", "Body text", 1_700_000_000);

	record.tags = vec!["alpha".to_string(), "beta".to_string()];
	record.metadata.insert("author".to_string(), "kim".to_string());

	store.upsert(&record).await.expect("Failed to upsert.");

	assert_eq!(store.get("d1").await.expect("Failed to get."), Some(record.clone()));

	record.content = "Updated body".to_string();

	store.upsert(&record).await.expect("Failed to update.");

	assert_eq!(store.count().await.expect("Failed to count."), 1);

	let rows = store
		.get_many(&["d1".to_string(), "missing".to_string()])
		.await
		.expect("Failed to get many.");

	assert_eq!(rows.len(), 1);
	assert_eq!(rows["d1"].content, "Updated body");
	assert!(store.delete("d1").await.expect("Failed to delete."));
	assert!(!store.delete("d1").await.expect("Failed to delete twice."));
	assert_eq!(store.get("d1").await.expect("Failed to get."), None);

	store.close().await;

	let err = store.get("d1").await.expect_err("Expected closed store to fail.");

	assert!(matches!(err, Error::Disposed { .. }), "{err}");
}

#[tokio::test]
async fn content_store_rejects_blank_ids() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let store = ContentStore::new(dir.path("content.db"));
	let err = store
		.upsert(&km_testkit::record(" ", "", "Body", 1))
		.await
		.expect_err("Expected blank id to fail.");

	assert!(matches!(err, Error::InvalidArgument(_)), "{err}");

	store.close().await;
}

#[tokio::test]
async fn cache_hit_skips_generation_in_read_write_mode() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let inner = Arc::new(HashEmbedding::new(16));
	let cache = Arc::new(EmbeddingCache::new(dir.path("cache.db"), CacheMode::ReadWrite));
	let cached = CachedEmbeddingGenerator::new(inner.clone(), cache.clone());
	let first = cached.generate("same text").await.expect("Failed to generate.");
	let second = cached.generate("same text").await.expect("Failed to generate.");

	assert_eq!(first, second);
	assert_eq!(inner.calls(), 1);
	assert_eq!(cache.count().await.expect("Failed to count."), 1);

	cache.close().await;
}

#[tokio::test]
async fn read_only_cache_never_writes() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let inner = Arc::new(HashEmbedding::new(16));
	let cache = Arc::new(EmbeddingCache::new(dir.path("cache.db"), CacheMode::ReadOnly));
	let cached = CachedEmbeddingGenerator::new(inner.clone(), cache.clone());

	cached.generate("text").await.expect("Failed to generate.");
	cached.generate("text").await.expect("Failed to generate.");

	assert_eq!(inner.calls(), 2);
	assert_eq!(cache.count().await.expect("Failed to count."), 0);

	cache.close().await;
}

#[tokio::test]
async fn write_only_cache_always_regenerates() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let inner = Arc::new(HashEmbedding::new(16));
	let cache = Arc::new(EmbeddingCache::new(dir.path("cache.db"), CacheMode::WriteOnly));
	let cached = CachedEmbeddingGenerator::new(inner.clone(), cache.clone());

	cached.generate("text").await.expect("Failed to generate.");
	cached.generate("text").await.expect("Failed to generate.");

	assert_eq!(inner.calls(), 2);
	assert_eq!(cache.count().await.expect("Failed to count."), 1);

	cache.close().await;
}

#[test]
fn cache_keys_depend_on_model_and_dimensions() {
	let base = EmbeddingCache::key("ollama", "nomic", 768, "text");

	assert_eq!(base, EmbeddingCache::key("ollama", "nomic", 768, "text"));
	assert_ne!(base, EmbeddingCache::key("ollama", "nomic", 384, "text"));
	assert_ne!(base, EmbeddingCache::key("ollama", "other", 768, "text"));
}
