//! [`RestStore`]: a [`PersonStore`] over a PostgREST endpoint.
//!
//! Rows live in the `person` table under `/rest/v1/person`; the joined orbit
//! is requested with `select=*,orbit(*)`. Every request carries the project
//! API key plus a bearer token for the signed-in user.

use std::{collections::HashSet, time::Duration};

use chrono::{DateTime, Utc};
use orbits_core::{
  person::{Orbit, Person},
  store::{PersonStore, Session},
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Keys per `contact_identifier=in.(...)` filter; keeps URLs well below
/// common proxy limits.
const KEY_CHUNK: usize = 100;

/// Rows requested per page when listing. PostgREST may return fewer.
const PAGE_SIZE: usize = 1000;

/// Natural key used for conflict-ignoring inserts.
const NATURAL_KEY: &str = "user_id,contact_identifier";

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{method} {path} → {status}: {body}")]
  Status {
    method: &'static str,
    path:   &'static str,
    status: StatusCode,
    body:   String,
  },

  #[error("person not found: {0}")]
  PersonNotFound(Uuid),
}

/// Connection settings for the remote store.
#[derive(Debug, Clone)]
pub struct RestConfig {
  pub base_url:     String,
  pub api_key:      String,
  pub access_token: Option<String>,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct RestStore {
  client:  Client,
  config:  RestConfig,
  session: Option<Session>,
}

impl RestStore {
  pub fn new(config: RestConfig, session: Option<Session>) -> Result<Self, Error> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, config, session })
  }

  fn url(&self, table: &str) -> String {
    format!(
      "{}/rest/v1/{}",
      self.config.base_url.trim_end_matches('/'),
      table
    )
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    let token = self
      .config
      .access_token
      .as_deref()
      .unwrap_or(&self.config.api_key);
    req
      .header("apikey", &self.config.api_key)
      .bearer_auth(token)
  }

  async fn check(
    resp: reqwest::Response,
    method: &'static str,
    path: &'static str,
  ) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Status { method, path, status, body })
  }
}

impl PersonStore for RestStore {
  type Error = Error;

  fn current_session(&self) -> Option<Session> { self.session.clone() }

  /// `GET /rest/v1/person?select=*,orbit(*)&user_id=eq.<id>`, one `Range`
  /// page at a time. The server may cap a page below [`PAGE_SIZE`]; paging
  /// continues until the `Content-Range` total is reached, or, when the
  /// server does not report a total, until a short page arrives.
  async fn list_persons(&self, user_id: Uuid) -> Result<Vec<Person>, Error> {
    let mut persons = Vec::new();
    loop {
      let start = persons.len();
      let resp = self
        .auth(self.client.get(self.url("person")))
        .query(&[
          ("select", "*,orbit(*)".to_owned()),
          ("user_id", eq(user_id)),
          ("order", "id".to_owned()),
        ])
        .header("Range-Unit", "items")
        .header("Range", format!("{start}-{}", start + PAGE_SIZE - 1))
        .header("Prefer", "count=exact")
        .send()
        .await?;
      let resp = Self::check(resp, "GET", "/person").await?;
      let total = content_range_total(resp.headers());
      let page: Vec<PersonRow> = resp.json().await?;
      let fetched = page.len();
      persons.extend(page.into_iter().map(Person::from));

      let done = match total {
        Some(total) => persons.len() >= total,
        None => fetched < PAGE_SIZE,
      };
      if fetched == 0 || done {
        break;
      }
    }

    tracing::debug!(rows = persons.len(), "listed persons");
    Ok(persons)
  }

  /// `GET /rest/v1/person?select=contact_identifier&contact_identifier=in.(...)`
  async fn existing_keys(
    &self,
    user_id: Uuid,
    contact_identifiers: Vec<String>,
  ) -> Result<HashSet<String>, Error> {
    #[derive(Deserialize)]
    struct KeyRow {
      contact_identifier: String,
    }

    let mut found = HashSet::new();
    for chunk in contact_identifiers.chunks(KEY_CHUNK) {
      let resp = self
        .auth(self.client.get(self.url("person")))
        .query(&[
          ("select", "contact_identifier".to_owned()),
          ("user_id", eq(user_id)),
          ("contact_identifier", in_list(chunk)),
        ])
        .send()
        .await?;
      let rows: Vec<KeyRow> = Self::check(resp, "GET", "/person").await?.json().await?;
      found.extend(rows.into_iter().map(|r| r.contact_identifier));
    }
    Ok(found)
  }

  /// `POST /rest/v1/person`. PostgREST inserts a JSON array in a single
  /// statement, so the batch lands whole or not at all.
  async fn insert_persons(&self, rows: Vec<Person>) -> Result<(), Error> {
    let body: Vec<PersonRow> = rows.into_iter().map(PersonRow::from).collect();
    let resp = self
      .auth(self.client.post(self.url("person")))
      .header("Prefer", "return=minimal")
      .json(&body)
      .send()
      .await?;
    Self::check(resp, "POST", "/person").await?;
    Ok(())
  }

  /// `POST /rest/v1/person?on_conflict=user_id,contact_identifier` with
  /// `resolution=ignore-duplicates`; only inserted rows come back.
  async fn insert_persons_ignoring_conflicts(&self, rows: Vec<Person>) -> Result<usize, Error> {
    #[derive(Deserialize)]
    struct IdRow {
      #[allow(dead_code)]
      id: Uuid,
    }

    let body: Vec<PersonRow> = rows.into_iter().map(PersonRow::from).collect();
    let resp = self
      .auth(self.client.post(self.url("person")))
      .query(&[("on_conflict", NATURAL_KEY), ("select", "id")])
      .header("Prefer", "resolution=ignore-duplicates,return=representation")
      .json(&body)
      .send()
      .await?;
    let inserted: Vec<IdRow> = Self::check(resp, "POST", "/person").await?.json().await?;
    Ok(inserted.len())
  }

  /// `PATCH /rest/v1/person?id=eq.<id>&user_id=eq.<user>`
  async fn update_person(&self, row: Person) -> Result<(), Error> {
    let (id, user_id) = (row.id, row.user_id);
    let resp = self
      .auth(self.client.patch(self.url("person")))
      .query(&[
        ("id", eq(id)),
        ("user_id", eq(user_id)),
        ("select", "id".to_owned()),
      ])
      .header("Prefer", "return=representation")
      .json(&PersonRow::from(row))
      .send()
      .await?;
    let updated: Vec<serde_json::Value> =
      Self::check(resp, "PATCH", "/person").await?.json().await?;
    if updated.is_empty() {
      return Err(Error::PersonNotFound(id));
    }
    Ok(())
  }
}

// ─── Filters ─────────────────────────────────────────────────────────────────

fn eq(value: impl std::fmt::Display) -> String { format!("eq.{value}") }

/// The total from a `Content-Range: <start>-<end>/<total>` header, if the
/// server counted.
fn content_range_total(headers: &reqwest::header::HeaderMap) -> Option<usize> {
  headers
    .get(reqwest::header::CONTENT_RANGE)?
    .to_str()
    .ok()?
    .rsplit_once('/')?
    .1
    .parse()
    .ok()
}

/// A PostgREST `in.(...)` filter. Every value is double-quoted so commas and
/// parentheses inside identifiers survive.
fn in_list(values: &[String]) -> String {
  let quoted: Vec<String> = values
    .iter()
    .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
    .collect();
  format!("in.({})", quoted.join(","))
}

// ─── Wire rows ───────────────────────────────────────────────────────────────

/// The `person` table as PostgREST sees it. Counts are `int4`; the joined
/// `orbit` is read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersonRow {
  id:                       Uuid,
  user_id:                  Uuid,
  contact_identifier:       String,
  phone:                    Option<String>,
  email:                    Option<String>,
  display_name:             String,
  photo_hash:               Option<String>,
  #[serde(default)]
  photo_available:          bool,
  orbit_id:                 Option<Uuid>,
  #[serde(default)]
  unread_count:             i32,
  last_message_at:          Option<DateTime<Utc>>,
  conversation_guid:        Option<String>,
  #[serde(default)]
  needs_response:           bool,
  needs_response_marked_at: Option<DateTime<Utc>>,
  created_at:               DateTime<Utc>,
  updated_at:               DateTime<Utc>,
  #[serde(default, skip_serializing)]
  orbit:                    Option<Orbit>,
}

impl From<Person> for PersonRow {
  fn from(p: Person) -> Self {
    Self {
      id:                       p.id,
      user_id:                  p.user_id,
      contact_identifier:       p.contact_identifier,
      phone:                    p.phone,
      email:                    p.email,
      display_name:             p.display_name,
      photo_hash:               p.photo_hash,
      photo_available:          p.photo_available,
      orbit_id:                 p.orbit_id,
      unread_count:             i32::try_from(p.unread_count).unwrap_or(i32::MAX),
      last_message_at:          p.last_message_at,
      conversation_guid:        p.conversation_guid,
      needs_response:           p.needs_response,
      needs_response_marked_at: p.needs_response_marked_at,
      created_at:               p.created_at,
      updated_at:               p.updated_at,
      orbit:                    None,
    }
  }
}

impl From<PersonRow> for Person {
  fn from(r: PersonRow) -> Self {
    Self {
      id:                       r.id,
      user_id:                  r.user_id,
      contact_identifier:       r.contact_identifier,
      phone:                    r.phone,
      email:                    r.email,
      display_name:             r.display_name,
      photo_hash:               r.photo_hash,
      photo_available:          r.photo_available,
      orbit_id:                 r.orbit_id,
      unread_count:             u32::try_from(r.unread_count).unwrap_or(0),
      last_message_at:          r.last_message_at,
      conversation_guid:        r.conversation_guid,
      needs_response:           r.needs_response,
      needs_response_marked_at: r.needs_response_marked_at,
      created_at:               r.created_at,
      updated_at:               r.updated_at,
      orbit:                    r.orbit,
    }
  }
}
