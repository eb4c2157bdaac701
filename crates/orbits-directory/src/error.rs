//! Error type for `orbits-directory`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("cannot list contact containers under {path:?}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("no contact containers found under {0:?}")]
  NoContainers(PathBuf),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("container scan did not complete: {0}")]
  Scan(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
