//! Error type for `orbits-sync`.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// Nobody is signed in. The user must re-authenticate.
  #[error("no active user session")]
  NoSession,

  /// A capability the run cannot do without was refused.
  #[error("permission denied: {0}")]
  PermissionDenied(String),

  #[error("a sync is already running")]
  AlreadyRunning,

  #[error("contact directory error: {0}")]
  Directory(#[source] BoxError),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  /// Every row of an insert batch failed, even when retried one at a time.
  /// Rows committed by earlier batches stay committed.
  #[error("all rows of insert batch {batch} failed ({inserted} rows inserted before it): {source}")]
  InsertBatchFailed {
    batch:    usize,
    inserted: usize,
    #[source]
    source:   BoxError,
  },
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
