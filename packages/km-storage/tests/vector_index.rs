use std::sync::Arc;

use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};

use km_storage::{Error, SqliteVectorIndex};
use km_testkit::{FailingEmbedding, FixedEmbedding, HashEmbedding, TestDir};

fn unit_x_generator() -> Arc<FixedEmbedding> {
	Arc::new(
		FixedEmbedding::new(3)
			.with("alpha", vec![1.0, 0.0, 0.0])
			.with("beta", vec![2.0, 0.0, 0.0])
			.with("gamma", vec![0.0, 3.0, 4.0])
			.with("query", vec![1.0, 0.0, 0.0])
			.with("zero", vec![0.0, 0.0, 0.0])
			.with("wide", vec![1.0, 0.0, 0.0, 0.0]),
	)
}

#[tokio::test]
async fn reindexing_keeps_one_row_per_id() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let index = SqliteVectorIndex::new(dir.path("vectors.db"), 3, unit_x_generator());

	index.index("a", "alpha").await.expect("Failed to index a.");
	index.index("a", "gamma").await.expect("Failed to re-index a.");

	assert_eq!(index.count().await.expect("Failed to count."), 1);

	let matches = index.search("query", 10).await.expect("Failed to search.");

	assert_eq!(matches.len(), 1);
	assert!(matches[0].score.abs() < 1e-6, "Re-indexed vector should be orthogonal.");

	index.close().await;
}

#[tokio::test]
async fn identical_vectors_tie_at_full_score() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let index = SqliteVectorIndex::new(dir.path("vectors.db"), 3, unit_x_generator());

	index.index("b", "beta").await.expect("Failed to index b.");
	index.index("a", "alpha").await.expect("Failed to index a.");
	index.index("c", "gamma").await.expect("Failed to index c.");

	let matches = index.search("query", 2).await.expect("Failed to search.");
	let ids: Vec<_> = matches.iter().map(|m| m.content_id.as_str()).collect();

	assert_eq!(ids, vec!["a", "b"]);
	assert!(matches.iter().all(|m| (m.score - 1.0).abs() < 1e-6));

	index.close().await;
}

#[tokio::test]
async fn stored_blobs_are_four_bytes_per_dimension() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let path = dir.path("vectors.db");
	let index = SqliteVectorIndex::new(&path, 3, unit_x_generator());

	index.index("b", "beta").await.expect("Failed to index b.");
	index.close().await;

	let pool = SqlitePool::connect_with(SqliteConnectOptions::new().filename(&path))
		.await
		.expect("Failed to open vector database.");
	let (len,): (i64,) =
		sqlx::query_as("SELECT length(vector) FROM km_vectors WHERE content_id = 'b'")
			.fetch_one(&pool)
			.await
			.expect("Failed to read blob length.");

	assert_eq!(len, 12);

	pool.close().await;
}

#[tokio::test]
async fn dimension_mismatch_fails_without_writing() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let index = SqliteVectorIndex::new(dir.path("vectors.db"), 3, unit_x_generator());
	let err = index.index("w", "wide").await.expect_err("Expected dimension mismatch.");

	assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 4 }), "{err}");
	assert_eq!(index.count().await.expect("Failed to count."), 0);
	assert_eq!(index.dimensions(), 3);

	index.close().await;
}

#[tokio::test]
async fn zero_vectors_are_stored_without_failing() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let index = SqliteVectorIndex::new(dir.path("vectors.db"), 3, unit_x_generator());

	index.index("z", "zero").await.expect("Zero vector should be accepted.");

	let matches = index.search("query", 5).await.expect("Failed to search.");

	assert_eq!(matches.len(), 1);
	assert_eq!(matches[0].score, 0.0);

	index.close().await;
}

#[tokio::test]
async fn provider_errors_propagate() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let index = SqliteVectorIndex::new(
		dir.path("vectors.db"),
		3,
		Arc::new(FailingEmbedding { dimensions: 3 }),
	);
	let err = index.search("anything", 5).await.expect_err("Expected provider failure.");

	assert!(matches!(err, Error::Provider(_)), "{err}");

	index.close().await;
}

#[tokio::test]
async fn remove_and_clear_are_safe_on_empty_index() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let index = SqliteVectorIndex::new(dir.path("vectors.db"), 3, unit_x_generator());

	index.remove("missing").await.expect("Remove on empty index failed.");
	index.clear().await.expect("Clear on empty index failed.");
	index.index("a", "alpha").await.expect("Failed to index a.");
	index.index("b", "beta").await.expect("Failed to index b.");
	index.remove("a").await.expect("Failed to remove a.");

	assert_eq!(index.count().await.expect("Failed to count."), 1);

	index.clear().await.expect("Failed to clear.");

	assert_eq!(index.count().await.expect("Failed to count."), 0);

	index.close().await;
}

#[tokio::test]
async fn closed_index_rejects_operations() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let index = SqliteVectorIndex::new(dir.path("vectors.db"), 3, unit_x_generator());

	index.initialize().await.expect("Failed to initialize.");
	index.initialize().await.expect("Initialize should be idempotent.");
	index.close().await;

	let err = index.index("a", "alpha").await.expect_err("Expected disposed index to fail.");

	assert!(matches!(err, Error::Disposed { .. }), "{err}");
}

#[tokio::test]
async fn missing_extension_falls_back_to_linear_scan() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let index = SqliteVectorIndex::new(dir.path("vectors.db"), 3, unit_x_generator())
		.with_sqlite_vec(dir.path("no-such-extension").display().to_string());

	assert!(!index.is_accelerated().await.expect("Failed to initialize."));

	index.index("a", "alpha").await.expect("Failed to index a.");

	assert_eq!(index.search("query", 1).await.expect("Failed to search.").len(), 1);

	index.close().await;
}

#[tokio::test]
async fn linear_scan_keeps_best_matches() {
	let dir = TestDir::new().expect("Failed to create test dir.");
	let generator = Arc::new(HashEmbedding::new(64));
	let index = SqliteVectorIndex::new(dir.path("vectors.db"), 64, generator);
	let docs = [
		("rust", "rust ownership and borrowing"),
		("python", "python generators and decorators"),
		("cooking", "slow cooked tomato sauce"),
	];

	for (id, text) in docs {
		index.index(id, text).await.expect("Failed to index doc.");
	}

	let matches = index.search("rust ownership and borrowing", 2).await.expect("Failed to search.");

	assert_eq!(matches.len(), 2);
	assert_eq!(matches[0].content_id, "rust");
	assert!((matches[0].score - 1.0).abs() < 1e-5);
	assert!(matches[0].score >= matches[1].score);

	index.close().await;
}
