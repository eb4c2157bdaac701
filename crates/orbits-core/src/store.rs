//! The `PersonStore` trait: the remote record store the sync engine writes.
//!
//! Implemented by `orbits-store-sqlite` and by the HTTP client in
//! `orbits-cli`. The sync engine depends on this abstraction only, and
//! receives a concrete store at construction time.

use std::{collections::HashSet, future::Future};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::person::Person;

/// The authenticated user a sync runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub user_id: Uuid,
  pub email:   Option<String>,
}

/// Abstraction over the store holding `person` rows.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait PersonStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The active session, or `None` if nobody is signed in.
  fn current_session(&self) -> Option<Session>;

  /// Every person row owned by `user_id`, with its orbit joined in.
  fn list_persons(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Person>, Self::Error>> + Send + '_;

  /// The subset of `contact_identifiers` that already have a row for
  /// `user_id`.
  fn existing_keys(
    &self,
    user_id: Uuid,
    contact_identifiers: Vec<String>,
  ) -> impl Future<Output = Result<HashSet<String>, Self::Error>> + Send + '_;

  /// Insert all rows or none of them. Fails if any natural key already
  /// exists.
  fn insert_persons(
    &self,
    rows: Vec<Person>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Insert rows whose natural key is not yet taken; rows that conflict are
  /// skipped and existing rows are left untouched. Returns the number of rows
  /// actually inserted.
  fn insert_persons_ignoring_conflicts(
    &self,
    rows: Vec<Person>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Overwrite the row with `row.id`. The joined orbit is ignored.
  fn update_person(
    &self,
    row: Person,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
