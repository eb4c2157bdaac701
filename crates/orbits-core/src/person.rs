//! Person rows, orbits, and the locally observed candidates that feed them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Orbit ───────────────────────────────────────────────────────────────────

/// A user-defined check-in cadence bucket. Orbits are owned by the user and
/// never created by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orbit {
  pub id:            Uuid,
  pub user_id:       Uuid,
  pub name:          String,
  pub interval_days: i32,
  pub slack_days:    i32,
  pub position:      i32,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

// ─── Person ──────────────────────────────────────────────────────────────────

/// One row of the `person` collection.
///
/// `(user_id, contact_identifier)` is the natural key and is unique in the
/// store. `id`, `created_at`, `orbit_id` and the needs-response pair are owned
/// by the server side; everything else is re-observed on every sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
  pub id:                       Uuid,
  pub user_id:                  Uuid,
  pub contact_identifier:       String,
  pub phone:                    Option<String>,
  pub email:                    Option<String>,
  pub display_name:             String,
  pub photo_hash:               Option<String>,
  pub photo_available:          bool,
  pub orbit_id:                 Option<Uuid>,
  pub unread_count:             u32,
  pub last_message_at:          Option<DateTime<Utc>>,
  pub conversation_guid:        Option<String>,
  pub needs_response:           bool,
  pub needs_response_marked_at: Option<DateTime<Utc>>,
  pub created_at:               DateTime<Utc>,
  pub updated_at:               DateTime<Utc>,
  /// Joined orbit; read-only, never written back.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub orbit:                    Option<Orbit>,
}

// ─── Candidate ───────────────────────────────────────────────────────────────

/// A person as observed locally during one sync run: directory fields joined
/// with message activity. Carries no server-owned state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonCandidate {
  pub contact_identifier: String,
  pub phone:              Option<String>,
  pub email:              Option<String>,
  pub display_name:       String,
  pub photo_hash:         Option<String>,
  pub photo_available:    bool,
  pub unread_count:       u32,
  pub last_message_at:    Option<DateTime<Utc>>,
  pub conversation_guid:  Option<String>,
  /// `Some` only when a local source derived the flag this run.
  pub needs_response:     Option<bool>,
}

impl PersonCandidate {
  /// A brand-new row for `user_id` with fresh server-side defaults.
  pub fn into_new_person(self, user_id: Uuid, now: DateTime<Utc>) -> Person {
    let needs_response = self.needs_response.unwrap_or(false);
    Person {
      id: Uuid::new_v4(),
      user_id,
      contact_identifier: self.contact_identifier,
      phone: self.phone,
      email: self.email,
      display_name: self.display_name,
      photo_hash: self.photo_hash,
      photo_available: self.photo_available,
      orbit_id: None,
      unread_count: self.unread_count,
      last_message_at: self.last_message_at,
      conversation_guid: self.conversation_guid,
      needs_response,
      needs_response_marked_at: needs_response.then_some(now),
      created_at: now,
      updated_at: now,
      orbit: None,
    }
  }

  /// Overlay this observation onto an existing row.
  ///
  /// Row id, creation time and orbit assignment are carried forward. The
  /// needs-response pair is carried forward too, unless this observation
  /// derived a different value.
  pub fn apply_to(self, existing: &Person, now: DateTime<Utc>) -> Person {
    let (needs_response, needs_response_marked_at) = match self.needs_response {
      Some(derived) if derived != existing.needs_response => {
        (derived, derived.then_some(now))
      }
      _ => (existing.needs_response, existing.needs_response_marked_at),
    };

    Person {
      id: existing.id,
      user_id: existing.user_id,
      contact_identifier: existing.contact_identifier.clone(),
      phone: self.phone,
      email: self.email,
      display_name: self.display_name,
      photo_hash: self.photo_hash,
      photo_available: self.photo_available,
      orbit_id: existing.orbit_id,
      unread_count: self.unread_count,
      last_message_at: self.last_message_at,
      conversation_guid: self.conversation_guid,
      needs_response,
      needs_response_marked_at,
      created_at: existing.created_at,
      updated_at: now,
      orbit: None,
    }
  }
}
