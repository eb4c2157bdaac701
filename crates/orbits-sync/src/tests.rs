//! End-to-end sync runs against an in-memory SQLite store with fake local
//! sources.

use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use orbits_core::{
  contact::ContactRecord,
  message::{MessageThreadStat, QueryMode},
  person::Person,
  source::{CapabilityOracle, ContactDirectory, MessageArchive},
  store::{PersonStore, Session},
};
use orbits_store_sqlite::SqliteStore;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::{Error, InsertMode, SyncEngine, SyncOptions, SyncPhase};

// ─── Fakes ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct FakeError(String);

#[derive(Default)]
struct FakeDirectory {
  contacts: Vec<ContactRecord>,
  fail:     bool,
}

impl ContactDirectory for FakeDirectory {
  type Error = FakeError;

  async fn fetch_all_contacts(&self) -> Result<Vec<ContactRecord>, FakeError> {
    if self.fail {
      return Err(FakeError("address book unavailable".into()));
    }
    Ok(self.contacts.clone())
  }
}

struct FakeArchive {
  threads:    Vec<MessageThreadStat>,
  accessible: bool,
  fail:       bool,
}

impl Default for FakeArchive {
  fn default() -> Self { Self { threads: vec![], accessible: true, fail: false } }
}

impl MessageArchive for FakeArchive {
  type Error = FakeError;

  fn can_access(&self) -> bool { self.accessible }

  async fn fetch_threads(&self, _mode: QueryMode) -> Result<Vec<MessageThreadStat>, FakeError> {
    if self.fail {
      return Err(FakeError("database is locked".into()));
    }
    Ok(self.threads.clone())
  }
}

struct FakeCapabilities {
  directory: bool,
  archive:   bool,
}

impl Default for FakeCapabilities {
  fn default() -> Self { Self { directory: true, archive: true } }
}

impl CapabilityOracle for FakeCapabilities {
  async fn has_directory_permission(&self) -> bool { self.directory }

  fn has_archive_permission(&self) -> bool { self.archive }
}

/// When a concurrent writer sneaks a row into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RaceAt {
  AfterList,
  AfterRecheck,
}

#[derive(Debug, thiserror::Error)]
enum TestStoreError {
  #[error(transparent)]
  Store(#[from] orbits_store_sqlite::Error),
  #[error("rejected by test store")]
  Rejected,
}

/// Wraps a [`SqliteStore`] to inject races and write failures.
struct TestStore {
  inner:          SqliteStore,
  race_at:        Option<RaceAt>,
  racer:          Mutex<Option<Person>>,
  reject_inserts: bool,
  reject_updates: bool,
}

impl TestStore {
  fn new(inner: SqliteStore) -> Self {
    Self {
      inner,
      race_at: None,
      racer: Mutex::new(None),
      reject_inserts: false,
      reject_updates: false,
    }
  }

  fn racing(inner: SqliteStore, at: RaceAt, row: Person) -> Self {
    Self { race_at: Some(at), racer: Mutex::new(Some(row)), ..Self::new(inner) }
  }

  async fn race(&self, at: RaceAt) -> Result<(), TestStoreError> {
    if self.race_at != Some(at) {
      return Ok(());
    }
    let row = self.racer.lock().unwrap().take();
    if let Some(row) = row {
      self.inner.insert_persons(vec![row]).await?;
    }
    Ok(())
  }
}

impl PersonStore for TestStore {
  type Error = TestStoreError;

  fn current_session(&self) -> Option<Session> { self.inner.current_session() }

  async fn list_persons(&self, user_id: Uuid) -> Result<Vec<Person>, TestStoreError> {
    let rows = self.inner.list_persons(user_id).await?;
    self.race(RaceAt::AfterList).await?;
    Ok(rows)
  }

  async fn existing_keys(
    &self,
    user_id: Uuid,
    contact_identifiers: Vec<String>,
  ) -> Result<std::collections::HashSet<String>, TestStoreError> {
    let keys = self.inner.existing_keys(user_id, contact_identifiers).await?;
    self.race(RaceAt::AfterRecheck).await?;
    Ok(keys)
  }

  async fn insert_persons(&self, rows: Vec<Person>) -> Result<(), TestStoreError> {
    if self.reject_inserts {
      return Err(TestStoreError::Rejected);
    }
    Ok(self.inner.insert_persons(rows).await?)
  }

  async fn insert_persons_ignoring_conflicts(
    &self,
    rows: Vec<Person>,
  ) -> Result<usize, TestStoreError> {
    Ok(self.inner.insert_persons_ignoring_conflicts(rows).await?)
  }

  async fn update_person(&self, row: Person) -> Result<(), TestStoreError> {
    if self.reject_updates {
      return Err(TestStoreError::Rejected);
    }
    Ok(self.inner.update_person(row).await?)
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

type TestEngine<S = TestStore, D = FakeDirectory> =
  SyncEngine<S, D, FakeArchive, FakeCapabilities>;

async fn signed_in_store() -> (SqliteStore, Uuid) {
  let user_id = Uuid::new_v4();
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
    .with_session(Session { user_id, email: Some("me@example.com".into()) });
  (store, user_id)
}

fn contact(id: &str, given: &str, phones: &[&str], emails: &[&str]) -> ContactRecord {
  ContactRecord {
    identifier: id.into(),
    given_name: given.into(),
    phone_numbers: phones.iter().map(|p| p.to_string()).collect(),
    email_addresses: emails.iter().map(|e| e.to_string()).collect(),
    ..Default::default()
  }
}

fn thread(guid: &str, handle: &str, unread: u32, secs: i64) -> MessageThreadStat {
  MessageThreadStat {
    conversation_guid: Some(guid.into()),
    handles:           vec![handle.into()],
    display_name:      None,
    is_group:          false,
    has_unread:        unread > 0,
    unread_count:      unread,
    needs_response:    None,
    last_message_at:   Some(Utc.timestamp_opt(secs, 0).unwrap()),
  }
}

fn address_book() -> Vec<ContactRecord> {
  vec![
    contact("ada", "Ada", &["+1 (555) 123-4567"], &[]),
    contact("bob", "Bob", &[], &["Bob@Example.com"]),
    // Saved from a handle: the only "name" is the number itself.
    ContactRecord {
      organization: "555-999-9999".into(),
      ..contact("raw", "", &["5559999999"], &[])
    },
  ]
}

fn engine(store: TestStore, contacts: Vec<ContactRecord>, archive: FakeArchive) -> TestEngine {
  SyncEngine::new(
    store,
    FakeDirectory { contacts, fail: false },
    archive,
    FakeCapabilities::default(),
  )
}

fn many_contacts(n: usize) -> Vec<ContactRecord> {
  (0..n)
    .map(|i| {
      let phone = format!("555000{i:04}");
      contact(&format!("c{i:03}"), &format!("Person {i}"), &[phone.as_str()], &[])
    })
    .collect()
}

fn racer(user_id: Uuid, key: &str) -> Person {
  let now = Utc::now();
  Person {
    id: Uuid::new_v4(),
    user_id,
    contact_identifier: key.into(),
    phone: None,
    email: None,
    display_name: "Written elsewhere".into(),
    photo_hash: None,
    photo_available: false,
    orbit_id: None,
    unread_count: 0,
    last_message_at: None,
    conversation_guid: None,
    needs_response: false,
    needs_response_marked_at: None,
    created_at: now,
    updated_at: now,
    orbit: None,
  }
}

fn find<'a>(rows: &'a [Person], key: &str) -> &'a Person {
  rows
    .iter()
    .find(|p| p.contact_identifier == key)
    .unwrap_or_else(|| panic!("no row for {key}"))
}

// ─── Happy path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_sync_inserts_eligible_contacts() {
  let (store, user) = signed_in_store().await;
  let archive = FakeArchive {
    threads: vec![thread("ada-chat", "+15551234567", 3, 1_700_000_000)],
    ..Default::default()
  };
  let engine = engine(TestStore::new(store.clone()), address_book(), archive);
  assert_eq!(engine.phase(), SyncPhase::Idle);

  let report = engine.run().await.unwrap();

  assert_eq!(engine.phase(), SyncPhase::Done);
  assert_eq!(report.user_id, user);
  assert_eq!(report.contacts_observed, 3);
  assert_eq!(report.contacts_skipped_ineligible, 1);
  assert_eq!(report.threads_processed, 1);
  assert!(report.message_data_available);
  assert_eq!(report.records_inserted, 2);
  assert_eq!(report.records_updated, 0);
  assert!(report.insert_failures.is_empty());

  let rows = store.list_persons(user).await.unwrap();
  assert_eq!(rows.len(), 2);
  let ada = find(&rows, "ada");
  assert_eq!(ada.phone.as_deref(), Some("5551234567"));
  assert_eq!(ada.unread_count, 3);
  assert_eq!(ada.conversation_guid.as_deref(), Some("ada-chat"));
  assert_eq!(find(&rows, "bob").email.as_deref(), Some("bob@example.com"));
}

#[tokio::test]
async fn second_run_only_updates() {
  let (store, user) = signed_in_store().await;
  let engine = engine(TestStore::new(store.clone()), address_book(), FakeArchive::default());

  engine.run().await.unwrap();
  let report = engine.run().await.unwrap();

  assert_eq!(report.records_inserted, 0);
  assert_eq!(report.records_updated, 2);
  assert_eq!(store.list_persons(user).await.unwrap().len(), 2);
}

#[tokio::test]
async fn resync_preserves_server_owned_state() {
  let (store, user) = signed_in_store().await;
  engine(TestStore::new(store.clone()), address_book(), FakeArchive::default())
    .run()
    .await
    .unwrap();

  let before = store.list_persons(user).await.unwrap();
  let ada = find(&before, "ada").clone();
  let orbit = store.create_orbit(user, "Close friends", 14, 3).await.unwrap();
  store.assign_orbit(ada.id, Some(orbit.id)).await.unwrap();
  store.mark_needs_response(ada.id, true).await.unwrap();
  let marked_at = find(&store.list_persons(user).await.unwrap(), "ada").needs_response_marked_at;

  let mut renamed = address_book();
  renamed[0].family_name = "Lovelace".into();
  let archive = FakeArchive {
    threads: vec![thread("ada-new", "5551234567", 1, 1_700_000_500)],
    ..Default::default()
  };
  engine(TestStore::new(store.clone()), renamed, archive).run().await.unwrap();

  let after = store.list_persons(user).await.unwrap();
  let synced = find(&after, "ada");
  assert_eq!(synced.id, ada.id);
  assert_eq!(synced.created_at, ada.created_at);
  assert_eq!(synced.orbit_id, Some(orbit.id));
  assert_eq!(synced.orbit.as_ref().map(|o| o.name.as_str()), Some("Close friends"));
  assert!(synced.needs_response);
  assert_eq!(synced.needs_response_marked_at, marked_at);
  assert_eq!(synced.display_name, "Ada Lovelace");
  assert_eq!(synced.unread_count, 1);
  assert_eq!(synced.conversation_guid.as_deref(), Some("ada-new"));
}

#[tokio::test]
async fn handle_mode_derives_needs_response() {
  let (store, user) = signed_in_store().await;
  let mut stat = thread("ada-chat", "+15551234567", 1, 1_700_000_000);
  stat.needs_response = Some(true);
  let archive = FakeArchive { threads: vec![stat], ..Default::default() };

  engine(TestStore::new(store.clone()), address_book(), archive)
    .with_options(SyncOptions { query_mode: QueryMode::Handle, ..Default::default() })
    .run()
    .await
    .unwrap();

  let rows = store.list_persons(user).await.unwrap();
  let ada = find(&rows, "ada");
  assert!(ada.needs_response);
  assert!(ada.needs_response_marked_at.is_some());
  assert!(!find(&rows, "bob").needs_response);
}

#[tokio::test]
async fn inserts_span_multiple_batches() {
  let (store, user) = signed_in_store().await;
  let report = engine(TestStore::new(store.clone()), many_contacts(120), FakeArchive::default())
    .run()
    .await
    .unwrap();

  assert_eq!(report.records_inserted, 120);
  assert_eq!(store.list_persons(user).await.unwrap().len(), 120);
}

// ─── Fatal failures ──────────────────────────────────────────────────────────

#[tokio::test]
async fn no_session_aborts_before_reading() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let engine = engine(TestStore::new(store), address_book(), FakeArchive::default());

  let err = engine.run().await.unwrap_err();
  assert!(matches!(err, Error::NoSession), "{err}");
  assert_eq!(engine.phase(), SyncPhase::Failed);
}

#[tokio::test]
async fn directory_permission_is_required() {
  let (store, user) = signed_in_store().await;
  let engine = SyncEngine::new(
    TestStore::new(store.clone()),
    FakeDirectory { contacts: address_book(), fail: false },
    FakeArchive::default(),
    FakeCapabilities { directory: false, archive: true },
  );

  let err = engine.run().await.unwrap_err();
  assert!(matches!(err, Error::PermissionDenied(_)), "{err}");
  assert!(store.list_persons(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn directory_errors_are_fatal() {
  let (store, user) = signed_in_store().await;
  let engine = SyncEngine::new(
    TestStore::new(store.clone()),
    FakeDirectory { contacts: vec![], fail: true },
    FakeArchive::default(),
    FakeCapabilities::default(),
  );

  let err = engine.run().await.unwrap_err();
  assert!(matches!(err, Error::Directory(_)), "{err}");
  assert!(store.list_persons(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_update_aborts_the_run() {
  let (store, _) = signed_in_store().await;
  engine(TestStore::new(store.clone()), address_book(), FakeArchive::default())
    .run()
    .await
    .unwrap();

  let rejecting = TestStore { reject_updates: true, ..TestStore::new(store) };
  let engine = engine(rejecting, address_book(), FakeArchive::default());
  let err = engine.run().await.unwrap_err();
  assert!(matches!(err, Error::Store(_)), "{err}");
  assert_eq!(engine.phase(), SyncPhase::Failed);
}

// ─── Degraded runs ───────────────────────────────────────────────────────────

#[tokio::test]
async fn archive_permission_denied_syncs_without_messages() {
  let (store, user) = signed_in_store().await;
  let engine = SyncEngine::new(
    TestStore::new(store.clone()),
    FakeDirectory { contacts: address_book(), fail: false },
    FakeArchive {
      threads: vec![thread("ada-chat", "5551234567", 2, 1_700_000_000)],
      ..Default::default()
    },
    FakeCapabilities { directory: true, archive: false },
  );

  let report = engine.run().await.unwrap();
  assert!(!report.message_data_available);
  assert_eq!(report.records_inserted, 2);
  assert_eq!(find(&store.list_persons(user).await.unwrap(), "ada").unread_count, 0);
}

#[tokio::test]
async fn archive_query_errors_degrade() {
  let (store, _) = signed_in_store().await;
  let archive = FakeArchive { fail: true, ..Default::default() };
  let report = engine(TestStore::new(store), address_book(), archive)
    .run()
    .await
    .unwrap();

  assert!(!report.message_data_available);
  assert_eq!(report.threads_processed, 0);
  assert_eq!(report.records_inserted, 2);
}

// ─── Insert races ────────────────────────────────────────────────────────────

#[tokio::test]
async fn recheck_drops_rows_created_concurrently() {
  let (store, user) = signed_in_store().await;
  let racing = TestStore::racing(store.clone(), RaceAt::AfterList, racer(user, "ada"));

  let report = engine(racing, address_book(), FakeArchive::default())
    .run()
    .await
    .unwrap();

  assert_eq!(report.inserts_skipped_existing, 1);
  assert_eq!(report.records_inserted, 1);
  assert!(report.insert_failures.is_empty());
  let rows = store.list_persons(user).await.unwrap();
  assert_eq!(find(&rows, "ada").display_name, "Written elsewhere");
}

#[tokio::test]
async fn rejected_batch_falls_back_to_single_rows() {
  let (store, user) = signed_in_store().await;
  let racing = TestStore::racing(store.clone(), RaceAt::AfterRecheck, racer(user, "c017"));

  let report = engine(racing, many_contacts(50), FakeArchive::default())
    .run()
    .await
    .unwrap();

  assert_eq!(report.inserts_skipped_existing, 0);
  assert_eq!(report.records_inserted, 49);
  assert_eq!(report.insert_failures.len(), 1);
  assert_eq!(report.insert_failures[0].contact_identifier, "c017");
  assert_eq!(store.list_persons(user).await.unwrap().len(), 50);
}

#[tokio::test]
async fn fully_failed_batch_is_an_error() {
  let (store, user) = signed_in_store().await;
  let rejecting = TestStore { reject_inserts: true, ..TestStore::new(store.clone()) };
  let engine = engine(rejecting, address_book(), FakeArchive::default());

  let err = engine.run().await.unwrap_err();
  assert!(
    matches!(err, Error::InsertBatchFailed { batch: 1, inserted: 0, .. }),
    "{err}"
  );
  assert_eq!(engine.phase(), SyncPhase::Failed);
  assert!(store.list_persons(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn ignore_conflicts_mode_skips_taken_keys() {
  let (store, user) = signed_in_store().await;
  let racing = TestStore::racing(store.clone(), RaceAt::AfterList, racer(user, "bob"));

  let report = engine(racing, address_book(), FakeArchive::default())
    .with_options(SyncOptions { insert_mode: InsertMode::IgnoreConflicts, ..Default::default() })
    .run()
    .await
    .unwrap();

  assert_eq!(report.records_inserted, 1);
  assert_eq!(report.inserts_skipped_existing, 1);
  assert!(report.insert_failures.is_empty());
  let rows = store.list_persons(user).await.unwrap();
  assert_eq!(find(&rows, "bob").display_name, "Written elsewhere");
}

// ─── Re-entrancy ─────────────────────────────────────────────────────────────

/// A directory that parks inside the read until released.
struct GatedDirectory {
  contacts: Vec<ContactRecord>,
  entered:  Arc<Notify>,
  release:  Arc<Notify>,
}

impl ContactDirectory for GatedDirectory {
  type Error = FakeError;

  async fn fetch_all_contacts(&self) -> Result<Vec<ContactRecord>, FakeError> {
    self.entered.notify_one();
    self.release.notified().await;
    Ok(self.contacts.clone())
  }
}

#[tokio::test]
async fn overlapping_runs_are_refused() {
  let (store, _) = signed_in_store().await;
  let entered = Arc::new(Notify::new());
  let release = Arc::new(Notify::new());
  let engine: TestEngine<TestStore, GatedDirectory> = SyncEngine::new(
    TestStore::new(store),
    GatedDirectory {
      contacts: address_book(),
      entered:  entered.clone(),
      release:  release.clone(),
    },
    FakeArchive::default(),
    FakeCapabilities::default(),
  );

  let (first, second) = tokio::join!(engine.run(), async {
    entered.notified().await;
    assert_eq!(engine.phase(), SyncPhase::Ingest);
    let second = engine.run().await;
    release.notify_one();
    second
  });

  assert!(matches!(second, Err(Error::AlreadyRunning)));
  assert_eq!(first.unwrap().records_inserted, 2);
  assert_eq!(engine.phase(), SyncPhase::Done);
}
