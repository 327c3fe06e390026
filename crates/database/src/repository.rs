use crate::DbError;
use crate::connection::TickerPool;
use core_types::{NewTicker, TickerRecord};
use sqlx::sqlite::Sqlite;
use sqlx::{Connection, QueryBuilder, Row};
use std::fmt::Display;
use std::future::Future;

/// Number of rows returned by a search when the caller does not ask for a limit.
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

// Three bind parameters per row keeps each statement under SQLite's
// 999-variable limit.
const INSERT_CHUNK_ROWS: usize = 300;

const CREATE_TICKERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS tickers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticker TEXT NOT NULL,
        company_name TEXT,
        exchange TEXT
    )
"#;

/// What `seed_if_empty` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The table already held this many rows; nothing was fetched.
    AlreadyPopulated(i64),
    /// The table was empty and this many rows were inserted.
    Populated(u64),
}

/// The `TickerRepository` owns the `tickers` table. Every operation borrows one
/// connection from the pool and hands it back when it succeeds.
#[derive(Debug, Clone)]
pub struct TickerRepository {
    pool: TickerPool,
}

impl TickerRepository {
    pub fn new(pool: TickerPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &TickerPool {
        &self.pool
    }

    /// Creates the `tickers` table if it is absent.
    ///
    /// A failing `CREATE TABLE` is logged and not returned, since a concurrent
    /// first run may already have created it. The table's presence is then
    /// checked, and only a verifiably missing table is an error.
    pub async fn initialize(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;

        match sqlx::query(CREATE_TICKERS_TABLE).execute(&mut *conn).await {
            Ok(_) => tracing::info!("Ticker table is ready."),
            Err(e) => tracing::error!(error = %e, "Ticker table creation failed; checking whether it already exists."),
        }

        let table: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'tickers'")
                .fetch_optional(&mut *conn)
                .await?;
        conn.release().await;

        match table {
            Some(_) => Ok(()),
            None => Err(DbError::SchemaMissing),
        }
    }

    /// Total number of cached tickers. Zero means the cache is cold.
    pub async fn count(&self) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickers")
            .fetch_one(&mut *conn)
            .await?;
        conn.release().await;
        Ok(count)
    }

    /// Finds tickers whose symbol or company name contains `query`.
    ///
    /// Matching is a case-sensitive substring test. Callers upper-case the
    /// query, so symbols match regardless of input case while mixed-case
    /// company names generally do not. The row order is whatever SQLite
    /// returns. An empty query returns nothing without touching the database.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<TickerRecord>, DbError> {
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.get().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, ticker, company_name, exchange
            FROM tickers
            WHERE instr(ticker, ?) > 0 OR instr(company_name, ?) > 0
            LIMIT ?
            "#,
        )
        .bind(query)
        .bind(query)
        .bind(i64::from(limit))
        .fetch_all(&mut *conn)
        .await?;
        conn.release().await;

        let tickers = rows
            .into_iter()
            .map(|row| {
                Ok(TickerRecord {
                    id: row.try_get("id")?,
                    ticker: row.try_get("ticker")?,
                    company_name: row.try_get("company_name")?,
                    exchange: row.try_get("exchange")?,
                })
            })
            .collect::<Result<Vec<TickerRecord>, sqlx::Error>>()?;

        Ok(tickers)
    }

    /// Inserts all `records` in a single transaction and returns the number of
    /// rows written.
    pub async fn bulk_insert(&self, records: &[NewTicker]) -> Result<u64, DbError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.get().await?;
        let mut tx = conn.begin().await?;
        let mut inserted = 0;

        for chunk in records.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO tickers (ticker, company_name, exchange) ");
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.ticker.as_str())
                    .push_bind(record.company_name.as_deref())
                    .push_bind(record.exchange.as_deref());
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        conn.release().await;

        tracing::info!(rows = inserted, "Inserted tickers into the cache.");
        Ok(inserted)
    }

    /// Fills the table from `fetch` if, and only if, it is currently empty.
    pub async fn seed_if_empty<F, Fut, E>(&self, fetch: F) -> Result<SeedOutcome, DbError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<NewTicker>, E>>,
        E: Display,
    {
        let existing = self.count().await?;
        if existing > 0 {
            tracing::info!(rows = existing, "Ticker cache already populated.");
            return Ok(SeedOutcome::AlreadyPopulated(existing));
        }

        tracing::info!("Populating the ticker cache for the first time...");
        let tickers = fetch()
            .await
            .map_err(|e| DbError::SeedSourceError(e.to_string()))?;
        let inserted = self.bulk_insert(&tickers).await?;

        Ok(SeedOutcome::Populated(inserted))
    }
}
