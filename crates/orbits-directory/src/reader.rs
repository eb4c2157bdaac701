//! [`AddressBook`]: the on-disk implementation of [`ContactDirectory`].

use std::{
  collections::{HashMap, HashSet},
  fs,
  path::{Path, PathBuf},
};

use orbits_core::{contact::ContactRecord, source::ContactDirectory};
use rusqlite::OpenFlags;

use crate::{
  Error, Result,
  schema::{DATABASE_FILE, EMAIL_ADDRESSES, PHONE_NUMBERS, RECORDS},
};

/// Raw columns of a [`RECORDS`] row.
struct RawRecord {
  pk:           i64,
  identifier:   String,
  given_name:   Option<String>,
  family_name:  Option<String>,
  organization: Option<String>,
  thumbnail:    Option<Vec<u8>>,
}

impl RawRecord {
  fn into_contact(self, phones: Vec<String>, emails: Vec<String>) -> ContactRecord {
    let photo = self.thumbnail.filter(|bytes| !bytes.is_empty());
    ContactRecord {
      identifier:      self.identifier,
      given_name:      self.given_name.unwrap_or_default(),
      family_name:     self.family_name.unwrap_or_default(),
      organization:    self.organization.unwrap_or_default(),
      phone_numbers:   phones,
      email_addresses: emails,
      photo_available: photo.is_some(),
      photo,
    }
  }
}

// ─── AddressBook ─────────────────────────────────────────────────────────────

/// A contact directory rooted at an address-book folder.
#[derive(Debug, Clone)]
pub struct AddressBook {
  root: PathBuf,
}

impl AddressBook {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  /// `~/Library/Application Support/AddressBook`, if `HOME` is set.
  pub fn default_root() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
      PathBuf::from(home).join("Library/Application Support/AddressBook")
    })
  }

  pub fn root(&self) -> &Path { &self.root }

  /// Whether the root folder can be listed.
  pub fn is_readable(&self) -> bool { fs::read_dir(&self.root).is_ok() }

  /// Every container database under the root, local container first.
  ///
  /// The directory walk runs on the blocking pool.
  pub async fn container_paths(&self) -> Result<Vec<PathBuf>> {
    let root = self.root.clone();
    tokio::task::spawn_blocking(move || scan_containers(&root)).await?
  }

  /// Every contact across every container.
  ///
  /// A contact present in several containers under the same identifier is
  /// returned once, from the first container that holds it.
  pub async fn fetch_all_contacts(&self) -> Result<Vec<ContactRecord>> {
    let mut seen = HashSet::new();
    let mut contacts = Vec::new();

    for path in self.container_paths().await? {
      let found = read_container(&path).await?;
      tracing::debug!(container = %path.display(), contacts = found.len(), "read contact container");
      contacts.extend(found.into_iter().filter(|c| seen.insert(c.identifier.clone())));
    }

    Ok(contacts)
  }
}

/// List the container databases under `root`, local container first.
fn scan_containers(root: &Path) -> Result<Vec<PathBuf>> {
  let io_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source| Error::Io { path, source }
  };

  // Listing the root surfaces permission errors even when it is empty.
  fs::read_dir(root).map_err(io_err(root))?;

  let mut paths = Vec::new();
  let local = root.join(DATABASE_FILE);
  if local.is_file() {
    paths.push(local);
  }

  let sources = root.join("Sources");
  if sources.is_dir() {
    let mut synced: Vec<PathBuf> = fs::read_dir(&sources)
      .map_err(io_err(&sources))?
      .filter_map(|entry| entry.ok())
      .map(|entry| entry.path().join(DATABASE_FILE))
      .filter(|db| db.is_file())
      .collect();
    synced.sort();
    paths.extend(synced);
  }

  if paths.is_empty() {
    return Err(Error::NoContainers(root.to_path_buf()));
  }
  Ok(paths)
}

/// Read every record of one container database.
async fn read_container(path: &Path) -> Result<Vec<ContactRecord>> {
  let conn = tokio_rusqlite::Connection::open_with_flags(
    path,
    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
  )
  .await?;

  let (records, phones, emails) = conn
    .call(|conn| {
      let records = conn
        .prepare(RECORDS)?
        .query_map([], |row| {
          Ok(RawRecord {
            pk:           row.get(0)?,
            identifier:   row.get(1)?,
            given_name:   row.get(2)?,
            family_name:  row.get(3)?,
            organization: row.get(4)?,
            thumbnail:    row.get(5)?,
          })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

      let owned_values = |sql: &str| -> rusqlite::Result<Vec<(i64, String)>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      };
      let phones = owned_values(PHONE_NUMBERS)?;
      let emails = owned_values(EMAIL_ADDRESSES)?;

      Ok((records, phones, emails))
    })
    .await?;

  let mut phones_by_owner = group_by_owner(phones);
  let mut emails_by_owner = group_by_owner(emails);

  Ok(
    records
      .into_iter()
      .map(|raw| {
        let phones = phones_by_owner.remove(&raw.pk).unwrap_or_default();
        let emails = emails_by_owner.remove(&raw.pk).unwrap_or_default();
        raw.into_contact(phones, emails)
      })
      .collect(),
  )
}

fn group_by_owner(rows: Vec<(i64, String)>) -> HashMap<i64, Vec<String>> {
  let mut grouped: HashMap<i64, Vec<String>> = HashMap::new();
  for (owner, value) in rows {
    let value = value.trim();
    if !value.is_empty() {
      grouped.entry(owner).or_default().push(value.to_owned());
    }
  }
  grouped
}

impl ContactDirectory for AddressBook {
  type Error = Error;

  async fn fetch_all_contacts(&self) -> Result<Vec<ContactRecord>> {
    AddressBook::fetch_all_contacts(self).await
  }
}
