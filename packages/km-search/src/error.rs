pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Invalid query: {message}")]
	InvalidQuery { message: String, position: Option<usize> },
	#[error("Search was cancelled.")]
	Cancelled,
	#[error("Node '{node}' is not configured.")]
	NodeNotFound { node: String },
	#[error("Node '{node}' is read-only.")]
	ReadOnly { node: String },
	#[error("Unavailable: {message}")]
	Unavailable { message: String },
	#[error(transparent)]
	Storage(#[from] km_storage::Error),
}
