pub const CONTENT_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS km_content (
	id TEXT PRIMARY KEY,
	title TEXT NULL,
	description TEXT NULL,
	content TEXT NOT NULL,
	mime_type TEXT NOT NULL,
	tags TEXT NOT NULL,
	metadata TEXT NOT NULL,
	created_at TEXT NOT NULL,
	updated_at TEXT NOT NULL
)";

pub const VECTOR_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS km_vectors (
	content_id TEXT PRIMARY KEY,
	vector BLOB NOT NULL,
	created_at TEXT NOT NULL
)";

pub const EMBEDDINGS_CACHE_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS embeddings_cache (
	key TEXT PRIMARY KEY,
	provider TEXT NOT NULL,
	model TEXT NOT NULL,
	dimensions INTEGER NOT NULL,
	vector BLOB NOT NULL,
	token_count INTEGER NULL,
	timestamp TEXT NOT NULL
)";

pub fn fts_table(enable_stemming: bool) -> String {
	let tokenizer = if enable_stemming { "porter unicode61" } else { "unicode61" };

	format!(
		"CREATE VIRTUAL TABLE IF NOT EXISTS km_fts USING fts5(\
content_id UNINDEXED, title, description, content, tokenize = '{tokenizer}')"
	)
}
