//! Local data sources: the contact directory, the message archive, and the
//! capability oracle that says whether either may be read.

use std::future::Future;

use crate::{
  contact::ContactRecord,
  message::{MessageThreadStat, QueryMode},
};

/// A read-only provider of local contact records.
pub trait ContactDirectory: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Every contact across every container. Any access error is returned
  /// as-is; there is no partial result.
  fn fetch_all_contacts(
    &self,
  ) -> impl Future<Output = Result<Vec<ContactRecord>, Self::Error>> + Send + '_;
}

/// A read-only provider of message-thread statistics.
pub trait MessageArchive: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Whether the archive is currently readable. A capability probe, not a
  /// precondition.
  fn can_access(&self) -> bool;

  fn fetch_threads(
    &self,
    mode: QueryMode,
  ) -> impl Future<Output = Result<Vec<MessageThreadStat>, Self::Error>> + Send + '_;
}

/// Answers whether the OS lets us read each local source.
pub trait CapabilityOracle: Send + Sync {
  fn has_directory_permission(&self) -> impl Future<Output = bool> + Send + '_;

  fn has_archive_permission(&self) -> bool;
}
