//! Error type for `orbits-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("person not found: {0}")]
  PersonNotFound(uuid::Uuid),

  #[error("orbit not found: {0}")]
  OrbitNotFound(uuid::Uuid),
}

impl Error {
  /// Whether the database rejected a write on a UNIQUE or other constraint.
  pub fn is_constraint_violation(&self) -> bool {
    match self {
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) => {
        e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation)
      }
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
