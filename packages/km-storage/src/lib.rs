pub mod content;
pub mod db;
pub mod embedding_cache;
pub mod fts_index;
pub mod models;
pub mod schema;
pub mod vector_index;

mod error;

pub use content::ContentStore;
pub use embedding_cache::{CachedEmbeddingGenerator, EmbeddingCache};
pub use error::{Error, Result};
pub use fts_index::SqliteFtsIndex;
pub use models::{ContentRow, FtsMatch, VectorMatch};
pub use vector_index::SqliteVectorIndex;
