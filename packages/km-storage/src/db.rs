use std::{fs, path::Path, time::Duration};

use sqlx::{
	SqlitePool,
	sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};

use crate::{Error, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a single-connection pool over a SQLite file in WAL mode.
///
/// Returns whether `extension` was loaded. A failed extension load is retried without it.
pub async fn open(path: &Path, extension: Option<&str>) -> Result<(SqlitePool, bool)> {
	if let Some(parent) = path.parent()
		&& !parent.as_os_str().is_empty()
	{
		fs::create_dir_all(parent)
			.map_err(|err| Error::Io { path: path.to_path_buf(), source: err })?;
	}

	let options = SqliteConnectOptions::new()
		.filename(path)
		.create_if_missing(true)
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.busy_timeout(BUSY_TIMEOUT);

	if let Some(extension) = extension {
		match connect(options.clone().extension(extension.to_string())).await {
			Ok(pool) => return Ok((pool, true)),
			Err(err) => {
				tracing::warn!(
					error = %err,
					path = %path.display(),
					extension,
					"Failed to load SQLite extension. Falling back to linear scan."
				);
			},
		}
	}

	Ok((connect(options).await?, false))
}

/// Flushes the write-ahead log into the main file and closes the pool.
pub async fn checkpoint_and_close(pool: &SqlitePool) {
	if let Err(err) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(pool).await {
		tracing::warn!(error = %err, "Failed to checkpoint SQLite WAL.");
	}

	pool.close().await;
}

pub async fn checkpoint(pool: &SqlitePool) -> Result<()> {
	sqlx::query("PRAGMA wal_checkpoint(PASSIVE)").execute(pool).await?;

	Ok(())
}

async fn connect(options: SqliteConnectOptions) -> Result<SqlitePool> {
	Ok(SqlitePoolOptions::new().max_connections(1).connect_with(options).await?)
}
