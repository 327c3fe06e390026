use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to prepare the database location: {0}")]
    ConnectionConfigError(String),

    #[error("Database operation failed: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("The tickers table does not exist after initialisation.")]
    SchemaMissing,

    #[error("Failed to fetch tickers for seeding: {0}")]
    SeedSourceError(String),
}
