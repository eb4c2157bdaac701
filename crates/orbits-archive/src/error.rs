//! Error type for `orbits-archive`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The archive file exists but cannot be read, or does not exist. On macOS
  /// this means Full Disk Access has not been granted.
  #[error("cannot read message archive at {0:?}")]
  AccessDenied(PathBuf),

  /// Opening the connection or running a query failed. Usually means the
  /// archive schema is not one we understand.
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),
}

impl Error {
  pub fn is_access_denied(&self) -> bool { matches!(self, Self::AccessDenied(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
