pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Vector blob length {len} is not a multiple of 4 bytes.")]
	InvalidBlob { len: usize },
	#[error("{message}")]
	InvalidValue { message: String },
}
