//! SQLite pool setup and schema migration.

use crate::config::StoreConfig;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{path::Path, str::FromStr};
use tracing::{debug, info};

/// Schema of the backing table, applied statement by statement.
const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Open a connection pool for `cfg.database_url`.
///
/// File databases get their parent directory created and run in WAL mode.
/// An in-memory database is pinned to a single connection that is never
/// recycled, since closing it would drop every table.
pub async fn connect(cfg: &StoreConfig) -> Result<SqlitePool, sqlx::Error> {
    let db_url = &cfg.database_url;
    debug!("Connecting using raw URL => {}", db_url);

    let mut options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .busy_timeout(cfg.busy_timeout);

    let pool_options = if cfg.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        ensure_parent_dir(db_url)?;
        options = options.journal_mode(SqliteJournalMode::Wal);
        SqlitePoolOptions::new().max_connections(cfg.max_connections)
    };

    pool_options.connect_with(options).await
}

/// Create the directory holding a file-backed database if it is missing.
fn ensure_parent_dir(db_url: &str) -> std::io::Result<()> {
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            info!("Created missing directory {:?}", parent);
        }
    }
    Ok(())
}

/// Apply the embedded schema. Every statement is idempotent.
pub async fn run_migrations(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let cfg = StoreConfig {
            database_url: "sqlite::memory:".into(),
            max_connections: 4,
            busy_timeout: Duration::from_millis(100),
        };
        let pool = connect(&cfg).await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'stored_objects'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 1);
    }

    #[tokio::test]
    async fn creates_parent_directory_for_file_databases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");
        let cfg = StoreConfig {
            database_url: format!("sqlite://{}", path.display()),
            ..StoreConfig::default()
        };

        let pool = connect(&cfg).await.unwrap();
        run_migrations(&pool).await.unwrap();
        assert!(path.exists());
        pool.close().await;
    }
}
