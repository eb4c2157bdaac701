//! [`SqliteStore`]: the SQLite implementation of [`PersonStore`].

use std::{collections::HashSet, path::Path};

use chrono::Utc;
use orbits_core::{
  person::{Orbit, Person},
  store::{PersonStore, Session},
};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{PersonColumns, RawOrbit, RawPerson, encode_dt, encode_uuid},
  schema::{
    INSERT_PERSON, INSERT_PERSON_IGNORING_CONFLICTS, SCHEMA, SELECT_PERSON,
    UPDATE_PERSON,
  },
};

/// Keys per `IN (...)` lookup; keeps well under SQLite's parameter limit.
const KEY_CHUNK: usize = 500;

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Orbits person store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  session: Option<Session>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, session: None };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, session: None };
    store.init_schema().await?;
    Ok(store)
  }

  /// Attach the session reported by [`PersonStore::current_session`].
  pub fn with_session(mut self, session: Session) -> Self {
    self.session = Some(session);
    self
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Orbits ────────────────────────────────────────────────────────────────

  /// Create an orbit for `user_id`, placed after any existing ones.
  pub async fn create_orbit(
    &self,
    user_id:       Uuid,
    name:          &str,
    interval_days: i32,
    slack_days:    i32,
  ) -> Result<Orbit> {
    let now = Utc::now();
    let user_id_str = encode_uuid(user_id);
    let position: i32 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COALESCE(MAX(position) + 1, 0) FROM orbit WHERE user_id = ?1",
          rusqlite::params![user_id_str],
          |row| row.get(0),
        )?)
      })
      .await?;

    let orbit = Orbit {
      id: Uuid::new_v4(),
      user_id,
      name: name.to_owned(),
      interval_days,
      slack_days,
      position,
      created_at: now,
      updated_at: now,
    };

    let raw = RawOrbit {
      id:            encode_uuid(orbit.id),
      user_id:       encode_uuid(orbit.user_id),
      name:          orbit.name.clone(),
      interval_days: orbit.interval_days,
      slack_days:    orbit.slack_days,
      position:      orbit.position,
      created_at:    encode_dt(orbit.created_at),
      updated_at:    encode_dt(orbit.updated_at),
    };

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO orbit (id, user_id, name, interval_days, slack_days, position,
                              created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            raw.id,
            raw.user_id,
            raw.name,
            raw.interval_days,
            raw.slack_days,
            raw.position,
            raw.created_at,
            raw.updated_at,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(orbit)
  }

  /// Orbits owned by `user_id`, in position order.
  pub async fn list_orbits(&self, user_id: Uuid) -> Result<Vec<Orbit>> {
    let user_id_str = encode_uuid(user_id);
    let raws: Vec<RawOrbit> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, user_id, name, interval_days, slack_days, position,
                  created_at, updated_at
           FROM orbit WHERE user_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user_id_str], |row| RawOrbit::from_row(row, 0))?
          .filter_map(|r| r.transpose())
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawOrbit::into_orbit).collect()
  }

  /// Assign (or clear) a person's orbit. User-driven; never called by sync.
  pub async fn assign_orbit(&self, person_id: Uuid, orbit_id: Option<Uuid>) -> Result<()> {
    let person_str = encode_uuid(person_id);
    let orbit_str = orbit_id.map(encode_uuid);
    let now_str = encode_dt(Utc::now());

    let result = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE person SET orbit_id = ?2, updated_at = ?3 WHERE id = ?1",
          rusqlite::params![person_str, orbit_str, now_str],
        )?)
      })
      .await
      .map_err(Error::from);

    match result {
      Ok(0) => Err(Error::PersonNotFound(person_id)),
      Ok(_) => Ok(()),
      Err(e) => match orbit_id {
        Some(id) if e.is_constraint_violation() => Err(Error::OrbitNotFound(id)),
        _ => Err(e),
      },
    }
  }

  /// Set or clear a person's needs-response flag, stamping when it was set.
  pub async fn mark_needs_response(&self, person_id: Uuid, needs_response: bool) -> Result<()> {
    let person_str = encode_uuid(person_id);
    let now = Utc::now();
    let marked_str = needs_response.then(|| encode_dt(now));
    let now_str = encode_dt(now);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE person
           SET needs_response = ?2, needs_response_marked_at = ?3, updated_at = ?4
           WHERE id = ?1",
          rusqlite::params![person_str, needs_response, marked_str, now_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::PersonNotFound(person_id));
    }
    Ok(())
  }
}

// ─── PersonStore impl ────────────────────────────────────────────────────────

impl PersonStore for SqliteStore {
  type Error = Error;

  fn current_session(&self) -> Option<Session> { self.session.clone() }

  async fn list_persons(&self, user_id: Uuid) -> Result<Vec<Person>> {
    let user_id_str = encode_uuid(user_id);

    let raws: Vec<RawPerson> = self
      .conn
      .call(move |conn| {
        let sql = format!("{SELECT_PERSON} WHERE p.user_id = ?1 ORDER BY p.display_name");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![user_id_str], RawPerson::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPerson::into_person).collect()
  }

  async fn existing_keys(
    &self,
    user_id:             Uuid,
    contact_identifiers: Vec<String>,
  ) -> Result<HashSet<String>> {
    if contact_identifiers.is_empty() {
      return Ok(HashSet::new());
    }
    let user_id_str = encode_uuid(user_id);

    let found = self
      .conn
      .call(move |conn| {
        let mut found = HashSet::new();
        for chunk in contact_identifiers.chunks(KEY_CHUNK) {
          let placeholders = vec!["?"; chunk.len()].join(", ");
          let sql = format!(
            "SELECT contact_identifier FROM person
             WHERE user_id = ? AND contact_identifier IN ({placeholders})"
          );
          let mut stmt = conn.prepare(&sql)?;
          let params = std::iter::once(&user_id_str).chain(chunk);
          let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          found.extend(rows);
        }
        Ok(found)
      })
      .await?;

    Ok(found)
  }

  async fn insert_persons(&self, rows: Vec<Person>) -> Result<()> {
    let columns: Vec<PersonColumns> = rows.into_iter().map(PersonColumns::encode).collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for row in &columns {
          row.execute(&tx, INSERT_PERSON)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn insert_persons_ignoring_conflicts(&self, rows: Vec<Person>) -> Result<usize> {
    let columns: Vec<PersonColumns> = rows.into_iter().map(PersonColumns::encode).collect();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for row in &columns {
          inserted += row.execute(&tx, INSERT_PERSON_IGNORING_CONFLICTS)?;
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    tracing::trace!(inserted, "conflict-ignoring insert");
    Ok(inserted)
  }

  async fn update_person(&self, row: Person) -> Result<()> {
    let id = row.id;
    let columns = PersonColumns::encode(row);

    let changed = self
      .conn
      .call(move |conn| Ok(columns.execute(conn, UPDATE_PERSON)?))
      .await?;

    if changed == 0 {
      return Err(Error::PersonNotFound(id));
    }
    Ok(())
  }
}
