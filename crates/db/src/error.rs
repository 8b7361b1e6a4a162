//! Translation of database failures into workflow errors.

use changeflow_core::error::CoreError;

/// Internal error type for store operations that mix SQL and domain failures.
///
/// Converted to [`CoreError`] at the collaborator boundary.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Core(core) => core,
            DbError::Sqlx(sqlx_err) => classify_sqlx_error(sqlx_err),
        }
    }
}

/// Map a sqlx error to the closest [`CoreError`].
///
/// Unique violations on constraints named `uq_*` become [`CoreError::Conflict`],
/// foreign-key violations become [`CoreError::Validation`]. Everything else is
/// a [`CoreError::Persistence`] failure.
pub fn classify_sqlx_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        match db_err.code().as_deref() {
            Some("23505") => {
                if let Some(constraint) = db_err.constraint() {
                    if constraint.starts_with("uq_") {
                        return CoreError::Conflict(format!(
                            "Duplicate value violates unique constraint: {constraint}"
                        ));
                    }
                }
            }
            Some("23503") => {
                return CoreError::Validation("Referenced record does not exist".to_string());
            }
            _ => {}
        }
    }

    tracing::error!(error = %err, "Database error");
    CoreError::Persistence(err.to_string())
}

/// Error for a column holding a value outside its closed set.
pub(crate) fn corrupt_value(column: &str, err: CoreError) -> CoreError {
    CoreError::Persistence(format!("Corrupt value in column '{column}': {err}"))
}
