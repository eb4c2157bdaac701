//! Candidate set + stored rows → minimal write plan.
//!
//! Rows are matched on the natural key `(user_id, contact_identifier)`. A
//! matched row becomes a point update that carries forward its server-owned
//! state (row id, orbit assignment, creation time, needs-response pair). An
//! unmatched candidate becomes an insert with fresh defaults.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use orbits_core::person::{Person, PersonCandidate};
use uuid::Uuid;

/// The writes one sync run will perform.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
  pub updates: Vec<Person>,
  pub inserts: Vec<Person>,
}

impl SyncPlan {
  /// Natural keys of every planned insert.
  pub fn insert_keys(&self) -> Vec<String> {
    self
      .inserts
      .iter()
      .map(|p| p.contact_identifier.clone())
      .collect()
  }

  /// Remove planned inserts whose key is in `taken`. Returns how many were
  /// removed.
  pub fn drop_inserts(&mut self, taken: &HashSet<String>) -> usize {
    let before = self.inserts.len();
    self
      .inserts
      .retain(|p| !taken.contains(&p.contact_identifier));
    before - self.inserts.len()
  }
}

/// Diff `candidates` against the rows `user_id` already owns.
pub fn plan(
  user_id: Uuid,
  existing: &[Person],
  candidates: Vec<PersonCandidate>,
  now: DateTime<Utc>,
) -> SyncPlan {
  let by_key: HashMap<&str, &Person> = existing
    .iter()
    .filter(|p| p.user_id == user_id)
    .map(|p| (p.contact_identifier.as_str(), p))
    .collect();

  let mut out = SyncPlan::default();
  for candidate in candidates {
    match by_key.get(candidate.contact_identifier.as_str()) {
      Some(current) => out.updates.push(candidate.apply_to(current, now)),
      None => out.inserts.push(candidate.into_new_person(user_id, now)),
    }
  }
  out
}
