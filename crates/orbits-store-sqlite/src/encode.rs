//! Encoding and decoding helpers between the domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, UUIDs as hyphenated lowercase
//! strings, and booleans as 0/1 integers.

use chrono::{DateTime, Utc};
use orbits_core::person::{Orbit, Person};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc>
// ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Person → columns ────────────────────────────────────────────────────────

/// Owned column values for one `person` row, in `INSERT_PERSON` parameter
/// order. Built on the async side and moved into the database thread.
pub struct PersonColumns {
  pub id:                       String,
  pub user_id:                  String,
  pub contact_identifier:       String,
  pub phone:                    Option<String>,
  pub email:                    Option<String>,
  pub display_name:             String,
  pub photo_hash:               Option<String>,
  pub photo_available:          bool,
  pub orbit_id:                 Option<String>,
  pub unread_count:             i64,
  pub last_message_at:          Option<String>,
  pub conversation_guid:        Option<String>,
  pub needs_response:           bool,
  pub needs_response_marked_at: Option<String>,
  pub created_at:               String,
  pub updated_at:               String,
}

impl PersonColumns {
  pub fn encode(person: Person) -> Self {
    Self {
      id:                       encode_uuid(person.id),
      user_id:                  encode_uuid(person.user_id),
      contact_identifier:       person.contact_identifier,
      phone:                    person.phone,
      email:                    person.email,
      display_name:             person.display_name,
      photo_hash:               person.photo_hash,
      photo_available:          person.photo_available,
      orbit_id:                 person.orbit_id.map(encode_uuid),
      unread_count:             i64::from(person.unread_count),
      last_message_at:          person.last_message_at.map(encode_dt),
      conversation_guid:        person.conversation_guid,
      needs_response:           person.needs_response,
      needs_response_marked_at: person.needs_response_marked_at.map(encode_dt),
      created_at:               encode_dt(person.created_at),
      updated_at:               encode_dt(person.updated_at),
    }
  }

  /// Execute `sql` (one of the `*_PERSON` statements) with these columns
  /// bound. Returns the number of rows changed.
  pub fn execute(&self, conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<usize> {
    conn.execute(
      sql,
      rusqlite::params![
        self.id,
        self.user_id,
        self.contact_identifier,
        self.phone,
        self.email,
        self.display_name,
        self.photo_hash,
        self.photo_available,
        self.orbit_id,
        self.unread_count,
        self.last_message_at,
        self.conversation_guid,
        self.needs_response,
        self.needs_response_marked_at,
        self.created_at,
        self.updated_at,
      ],
    )
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read from an `orbit` row (or the orbit half of a person join).
pub struct RawOrbit {
  pub id:            String,
  pub user_id:       String,
  pub name:          String,
  pub interval_days: i32,
  pub slack_days:    i32,
  pub position:      i32,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawOrbit {
  /// Read the eight orbit columns starting at `offset`; `None` when the join
  /// found no orbit.
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Option<Self>> {
    let id: Option<String> = row.get(offset)?;
    let Some(id) = id else { return Ok(None) };
    Ok(Some(Self {
      id,
      user_id:       row.get(offset + 1)?,
      name:          row.get(offset + 2)?,
      interval_days: row.get(offset + 3)?,
      slack_days:    row.get(offset + 4)?,
      position:      row.get(offset + 5)?,
      created_at:    row.get(offset + 6)?,
      updated_at:    row.get(offset + 7)?,
    }))
  }

  pub fn into_orbit(self) -> Result<Orbit> {
    Ok(Orbit {
      id:            decode_uuid(&self.id)?,
      user_id:       decode_uuid(&self.user_id)?,
      name:          self.name,
      interval_days: self.interval_days,
      slack_days:    self.slack_days,
      position:      self.position,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read from a `SELECT_PERSON` row.
pub struct RawPerson {
  pub id:                       String,
  pub user_id:                  String,
  pub contact_identifier:       String,
  pub phone:                    Option<String>,
  pub email:                    Option<String>,
  pub display_name:             String,
  pub photo_hash:               Option<String>,
  pub photo_available:          bool,
  pub orbit_id:                 Option<String>,
  pub unread_count:             i64,
  pub last_message_at:          Option<String>,
  pub conversation_guid:        Option<String>,
  pub needs_response:           bool,
  pub needs_response_marked_at: Option<String>,
  pub created_at:               String,
  pub updated_at:               String,
  pub orbit:                    Option<RawOrbit>,
}

impl RawPerson {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                       row.get(0)?,
      user_id:                  row.get(1)?,
      contact_identifier:       row.get(2)?,
      phone:                    row.get(3)?,
      email:                    row.get(4)?,
      display_name:             row.get(5)?,
      photo_hash:               row.get(6)?,
      photo_available:          row.get(7)?,
      orbit_id:                 row.get(8)?,
      unread_count:             row.get(9)?,
      last_message_at:          row.get(10)?,
      conversation_guid:        row.get(11)?,
      needs_response:           row.get(12)?,
      needs_response_marked_at: row.get(13)?,
      created_at:               row.get(14)?,
      updated_at:               row.get(15)?,
      orbit:                    RawOrbit::from_row(row, 16)?,
    })
  }

  pub fn into_person(self) -> Result<Person> {
    Ok(Person {
      id:                       decode_uuid(&self.id)?,
      user_id:                  decode_uuid(&self.user_id)?,
      contact_identifier:       self.contact_identifier,
      phone:                    self.phone,
      email:                    self.email,
      display_name:             self.display_name,
      photo_hash:               self.photo_hash,
      photo_available:          self.photo_available,
      orbit_id:                 self.orbit_id.as_deref().map(decode_uuid).transpose()?,
      unread_count:             self.unread_count.clamp(0, i64::from(u32::MAX)) as u32,
      last_message_at:          decode_opt_dt(self.last_message_at)?,
      conversation_guid:        self.conversation_guid,
      needs_response:           self.needs_response,
      needs_response_marked_at: decode_opt_dt(self.needs_response_marked_at)?,
      created_at:               decode_dt(&self.created_at)?,
      updated_at:               decode_dt(&self.updated_at)?,
      orbit:                    self.orbit.map(RawOrbit::into_orbit).transpose()?,
    })
  }
}
