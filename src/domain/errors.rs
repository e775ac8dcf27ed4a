use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Transient persistence failure. Reads are retried on the next tick,
    /// writes inside a sweep are logged and skipped.
    #[error("Store error: {0}")]
    Store(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message();
                if message.contains("UNIQUE") || message.contains("unique") {
                    DomainError::Conflict(format!("Duplicate record: {}", message))
                } else {
                    DomainError::Store(format!("Database error: {}", message))
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DomainError::Store(err.to_string())
            }
            other => DomainError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Internal(format!("Serialization error: {}", err))
    }
}
