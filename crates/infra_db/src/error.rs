//! Database error types
//!
//! Errors raised by the repositories and the job queue, and their
//! translation into the port-level `PortError` the domain layer handles.

use thiserror::Error;

use core_kernel::PortError;
use domain_claims::ClaimWriteError;

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Transaction error
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped to its domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Generic SQL error
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Creates a not found error for a specific entity type and identifier
    ///
    /// # Example
    ///
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::not_found("Claim", "CLM-123");
    /// assert!(error.to_string().contains("Claim"));
    /// ```
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound(format!("{} with id '{}' not found", entity, id))
    }

    /// Creates a serialization error for an unreadable column value
    pub fn invalid_column(column: &str, value: impl std::fmt::Display) -> Self {
        DatabaseError::SerializationError(format!("invalid value '{}' in column {}", value, column))
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }

    /// Replaces a raw SQLx error by its classified variant
    fn classified(self) -> Self {
        match self {
            DatabaseError::SqlError(ref e) => DatabaseError::from(e),
            other => other,
        }
    }
}

/// Converts SQLx errors to more specific DatabaseError variants
///
/// The mapping is based on the PostgreSQL error code.
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound("Record not found".to_string())
            }
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::PoolClosed => DatabaseError::ConnectionFailed("pool closed".to_string()),
            sqlx::Error::Database(db_err) => {
                // https://www.postgresql.org/docs/current/errcodes-appendix.html
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(db_err.message().to_string()),
                    Some("23503") => {
                        DatabaseError::ForeignKeyViolation(db_err.message().to_string())
                    }
                    Some("23514") => {
                        DatabaseError::ConstraintViolation(db_err.message().to_string())
                    }
                    _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

/// Translation at the port boundary
///
/// - `NotFound` -> `PortError::NotFound`
/// - connection and pool failures -> `PortError::Connection` (transient)
/// - constraint violations -> `PortError::Conflict`
/// - unreadable rows -> `PortError::Transformation`
/// - everything else -> `PortError::Internal`
impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        let error = error.classified();
        match error {
            DatabaseError::NotFound(message) => PortError::NotFound {
                entity_type: "Record".to_string(),
                id: message,
            },
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted => {
                PortError::connection(error.to_string())
            }
            DatabaseError::DuplicateEntry(_)
            | DatabaseError::ForeignKeyViolation(_)
            | DatabaseError::ConstraintViolation(_) => PortError::conflict(error.to_string()),
            DatabaseError::SerializationError(message) => PortError::transformation(message),
            other => PortError::internal(other.to_string()),
        }
    }
}

impl From<DatabaseError> for ClaimWriteError {
    fn from(error: DatabaseError) -> Self {
        ClaimWriteError::Port(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_mapping() {
        let not_found: PortError = DatabaseError::not_found("Claim", "CLM-1").into();
        assert!(matches!(not_found, PortError::NotFound { .. }));

        let exhausted: PortError = DatabaseError::PoolExhausted.into();
        assert!(exhausted.is_transient());

        let pool_timeout: PortError = DatabaseError::SqlError(sqlx::Error::PoolTimedOut).into();
        assert!(pool_timeout.is_transient());

        let row_missing: PortError = DatabaseError::SqlError(sqlx::Error::RowNotFound).into();
        assert!(matches!(row_missing, PortError::NotFound { .. }));

        let bad_status: PortError = DatabaseError::invalid_column("status", "archived").into();
        assert!(matches!(bad_status, PortError::Transformation { .. }));

        let failed: PortError = DatabaseError::TransactionFailed("rollback".into()).into();
        assert!(matches!(failed, PortError::Internal { .. }));
    }

    #[test]
    fn test_classification() {
        assert!(DatabaseError::PoolExhausted.is_connection_error());
        assert!(DatabaseError::DuplicateEntry("job".into()).is_constraint_violation());
        assert!(DatabaseError::not_found("Event", "EVT-1").is_not_found());
    }
}
