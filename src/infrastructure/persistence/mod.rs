use crate::domain::errors::{DomainError, DomainResult};
use chrono::{DateTime, SecondsFormat, Utc};
use log::LevelFilter;
use sqlx::{
    any::{AnyConnectOptions, AnyPoolOptions},
    AnyPool, ConnectOptions,
};
use std::str::FromStr;

mod agents;
mod conversations;
mod escalation_rules;
mod routing_rules;

pub struct Database {
    pub(crate) pool: AnyPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        // Ensure drivers are installed for AnyPool
        sqlx::any::install_default_drivers();

        let connect_options = AnyConnectOptions::from_str(database_url)?
            .log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, std::time::Duration::from_secs(1));

        let is_sqlite = database_url.starts_with("sqlite");

        // busy_timeout and foreign_keys are per connection, so every pooled
        // connection gets them
        let pool = AnyPoolOptions::new()
            .max_connections(20)
            .min_connections(1)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if is_sqlite {
                        sqlx::query("PRAGMA busy_timeout = 5000")
                            .execute(&mut *conn)
                            .await?;
                        sqlx::query("PRAGMA synchronous = NORMAL")
                            .execute(&mut *conn)
                            .await?;
                        sqlx::query("PRAGMA foreign_keys = ON")
                            .execute(&mut *conn)
                            .await?;
                    }
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await?;

        // WAL mode is stored in the database file
        if is_sqlite {
            sqlx::query("PRAGMA journal_mode = WAL")
                .execute(&pool)
                .await?;
        }

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("migrations/sqlite").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

/// Timestamps are stored as fixed-width RFC 3339 text so that string
/// comparison in SQL matches chronological order.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(value: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Internal(format!("Invalid timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_optional_timestamp(value: Option<String>) -> DomainResult<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

/// Enum columns go through `FromStr`; a bad value is data corruption.
pub(crate) fn parse_column<T>(value: &str) -> DomainResult<T>
where
    T: FromStr<Err = String>,
{
    value.parse::<T>().map_err(DomainError::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_text_sorts_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert!(format_timestamp(earlier) < format_timestamp(later));
        assert_eq!(
            parse_timestamp(&format_timestamp(later)).unwrap(),
            later
        );
    }

    #[test]
    fn test_bad_timestamp_is_internal_error() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(DomainError::Internal(_))
        ));
    }
}
