//! # Ticker Database Crate
//!
//! The local SQLite cache of tradable symbols. It exists so that live ticker
//! searches do not have to download the whole brokerage asset universe on
//! every keystroke.
//!
//! ## Public API
//!
//! - `Pool` / `ManageConnection`: a bounded stack of reusable connections with a
//!   liveness probe on borrow and on return.
//! - `connect`: opens the pool over the SQLite file, creating it if needed.
//! - `TickerRepository`: schema creation, bulk insert, substring search and count
//!   for the `tickers` table.
//! - `DbError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod pool;
pub mod repository;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{SqliteConnectionManager, TickerPool, connect};
pub use error::DbError;
pub use pool::{ManageConnection, Pool, PooledConnection};
pub use repository::{DEFAULT_SEARCH_LIMIT, SeedOutcome, TickerRepository};
