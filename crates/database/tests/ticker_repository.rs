//! Integration tests for the ticker cache against a real SQLite file.

use core_types::{NewTicker, TickerRecord};
use database::{DbError, SeedOutcome, TickerRepository};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

async fn repository() -> (TempDir, TickerRepository) {
    let dir = tempfile::tempdir().unwrap();
    let pool = database::connect(dir.path().join("data").join("tickers.db"), 4)
        .await
        .unwrap();
    let repo = TickerRepository::new(pool);
    repo.initialize().await.unwrap();
    (dir, repo)
}

fn sample_universe() -> Vec<NewTicker> {
    vec![
        NewTicker::new("AAPL", Some("Apple Inc"), Some("NASDAQ")),
        NewTicker::new("AMZN", Some("Amazon.com, Inc."), Some("NASDAQ")),
        NewTicker::new("MSFT", Some("Microsoft Corporation"), Some("NASDAQ")),
        NewTicker::new("BRK.A", Some("BERKSHIRE HATHAWAY INC"), Some("NYSE")),
        NewTicker::new("APLE", Some("Apple Hospitality REIT, Inc."), Some("NYSE")),
        NewTicker::new("ZZZ", None, None),
    ]
}

#[tokio::test]
async fn initialize_is_idempotent_and_starts_empty() {
    let (_dir, repo) = repository().await;
    repo.initialize().await.unwrap();
    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn initialize_reports_a_table_that_could_not_be_created() {
    let dir = tempfile::tempdir().unwrap();
    let pool = database::connect(dir.path().join("tickers.db"), 4).await.unwrap();

    // An index already owns the name, so CREATE TABLE fails.
    let mut conn = pool.get().await.unwrap();
    sqlx::query("CREATE TABLE other (symbol TEXT)").execute(&mut *conn).await.unwrap();
    sqlx::query("CREATE INDEX tickers ON other (symbol)").execute(&mut *conn).await.unwrap();
    conn.release().await;

    let repo = TickerRepository::new(pool);
    assert!(matches!(repo.initialize().await, Err(DbError::SchemaMissing)));
}

#[tokio::test]
async fn inserted_ticker_can_be_found() {
    let (_dir, repo) = repository().await;
    repo.bulk_insert(&[NewTicker::new("AAPL", Some("Apple Inc"), Some("NASDAQ"))])
        .await
        .unwrap();

    let found = repo.search("AAPL", 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].ticker, "AAPL");
    assert_eq!(found[0].company_name.as_deref(), Some("Apple Inc"));
    assert_eq!(found[0].exchange.as_deref(), Some("NASDAQ"));
}

#[tokio::test]
async fn empty_query_returns_nothing() {
    let (_dir, repo) = repository().await;
    repo.bulk_insert(&sample_universe()).await.unwrap();
    assert!(repo.search("", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn count_grows_by_the_number_of_inserted_rows() {
    let (_dir, repo) = repository().await;

    let before = repo.count().await.unwrap();
    let inserted = repo.bulk_insert(&sample_universe()).await.unwrap();
    assert_eq!(inserted, 6);
    assert_eq!(repo.count().await.unwrap(), before + 6);

    // Tickers are not unique, so inserting the same batch again doubles the count.
    repo.bulk_insert(&sample_universe()).await.unwrap();
    assert_eq!(repo.count().await.unwrap(), before + 12);
}

#[tokio::test]
async fn large_batches_are_inserted_in_full() {
    let (_dir, repo) = repository().await;
    let batch: Vec<NewTicker> = (0..1_250)
        .map(|i| NewTicker::new(format!("T{i:04}"), Some("Test Corp"), Some("NYSE")))
        .collect();

    assert_eq!(repo.bulk_insert(&batch).await.unwrap(), 1_250);
    assert_eq!(repo.count().await.unwrap(), 1_250);
}

#[tokio::test]
async fn results_respect_limit_and_contain_the_query() {
    let (_dir, repo) = repository().await;
    repo.bulk_insert(&sample_universe()).await.unwrap();

    for (query, limit) in [("A", 2), ("A", 10), ("NASDAQ", 5), ("Inc", 3), ("Q", 1)] {
        let found = repo.search(query, limit).await.unwrap();
        assert!(found.len() <= limit as usize, "{query}: {found:?}");
        for TickerRecord { ticker, company_name, .. } in &found {
            let in_name = company_name.as_deref().is_some_and(|name| name.contains(query));
            assert!(ticker.contains(query) || in_name, "{query} not in {ticker}");
        }
    }
}

#[tokio::test]
async fn search_is_case_sensitive() {
    let (_dir, repo) = repository().await;
    repo.bulk_insert(&sample_universe()).await.unwrap();

    // Upper-cased queries match symbols and upper-case names only.
    let upper: Vec<String> = repo
        .search("BERKSHIRE", 10)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.ticker)
        .collect();
    assert_eq!(upper, vec!["BRK.A"]);
    assert!(repo.search("APPLE", 10).await.unwrap().is_empty());

    let mixed = repo.search("Apple", 10).await.unwrap();
    assert_eq!(mixed.len(), 2);
}

#[tokio::test]
async fn rows_without_company_name_match_on_ticker_only() {
    let (_dir, repo) = repository().await;
    repo.bulk_insert(&sample_universe()).await.unwrap();

    let found = repo.search("ZZZ", 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].company_name, None);
    assert_eq!(found[0].exchange, None);
}

#[tokio::test]
async fn ids_are_assigned_and_unique() {
    let (_dir, repo) = repository().await;
    repo.bulk_insert(&sample_universe()).await.unwrap();

    let mut ids: Vec<i64> = repo.search("A", 10).await.unwrap().iter().map(|t| t.id).collect();
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);
    assert!(ids.iter().all(|id| *id > 0));
}

#[tokio::test]
async fn operations_do_not_leak_connections() {
    let (_dir, repo) = repository().await;
    let idle = repo.pool().idle_count().await;

    repo.bulk_insert(&sample_universe()).await.unwrap();
    assert_eq!(repo.pool().idle_count().await, idle);
    repo.search("AAPL", 10).await.unwrap();
    assert_eq!(repo.pool().idle_count().await, idle);
    repo.count().await.unwrap();
    assert_eq!(repo.pool().idle_count().await, idle);
}

#[tokio::test]
async fn data_survives_a_new_pool_on_the_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tickers.db");

    let repo = TickerRepository::new(database::connect(&path, 2).await.unwrap());
    repo.initialize().await.unwrap();
    repo.bulk_insert(&sample_universe()).await.unwrap();
    drop(repo);

    let reopened = TickerRepository::new(database::connect(&path, 2).await.unwrap());
    reopened.initialize().await.unwrap();
    assert_eq!(reopened.count().await.unwrap(), 6);
}

#[tokio::test]
async fn seeding_only_happens_on_an_empty_table() {
    let (_dir, repo) = repository().await;
    let counter = AtomicUsize::new(0);
    let calls = &counter;

    let outcome = repo
        .seed_if_empty(move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(sample_universe())
        })
        .await
        .unwrap();
    assert_eq!(outcome, SeedOutcome::Populated(6));

    let outcome = repo
        .seed_if_empty(move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(sample_universe())
        })
        .await
        .unwrap();
    assert_eq!(outcome, SeedOutcome::AlreadyPopulated(6));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_seed_source_leaves_the_table_empty() {
    let (_dir, repo) = repository().await;

    let err = repo
        .seed_if_empty(|| async { Err::<Vec<NewTicker>, _>("upstream unavailable") })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::SeedSourceError(message) if message == "upstream unavailable"));
    assert_eq!(repo.count().await.unwrap(), 0);
}
