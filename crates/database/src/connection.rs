use crate::error::DbError;
use crate::pool::{ManageConnection, Pool};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::path::Path;

/// The pool type used for the ticker cache.
pub type TickerPool = Pool<SqliteConnectionManager>;

/// Opens connections to a single SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteConnectionManager {
    options: SqliteConnectOptions,
}

impl SqliteConnectionManager {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        Self { options }
    }
}

#[async_trait]
impl ManageConnection for SqliteConnectionManager {
    type Connection = SqliteConnection;
    type Error = sqlx::Error;

    async fn connect(&self) -> Result<SqliteConnection, sqlx::Error> {
        self.options.connect().await
    }

    async fn is_valid(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok(())
    }

    async fn close(&self, conn: SqliteConnection) {
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "Error while closing a discarded SQLite connection.");
        }
    }
}

/// Builds the connection pool for the ticker cache at `path`.
///
/// The parent directory is created when missing, and one connection is opened
/// and returned to the pool up front so a bad path fails at startup rather than
/// on the first request.
pub async fn connect(path: impl AsRef<Path>, max_idle: usize) -> Result<TickerPool, DbError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            DbError::ConnectionConfigError(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    let pool = Pool::new(SqliteConnectionManager::new(path), max_idle);
    pool.get().await?.release().await;
    tracing::info!(path = %path.display(), max_idle, "Ticker database pool ready.");

    Ok(pool)
}
