/// Connection and startup probe failures
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sea_orm::DbErr),

    #[error("Database is not answering queries: {0}")]
    Unhealthy(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
