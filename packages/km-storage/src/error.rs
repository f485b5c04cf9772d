use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	Provider(#[from] km_providers::Error),
	#[error(transparent)]
	Domain(#[from] km_domain::Error),
	#[error(transparent)]
	Serialization(#[from] serde_json::Error),
	#[error("Embedding has {actual} dimensions but the index expects {expected}.")]
	DimensionMismatch { expected: u32, actual: usize },
	#[error("Storage at {path:?} has been closed.")]
	Disposed { path: PathBuf },
	#[error("Failed to prepare storage directory for {path:?}.")]
	Io { path: PathBuf, source: std::io::Error },
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Invalid record {id}: {message}")]
	InvalidRecord { id: String, message: String },
}
