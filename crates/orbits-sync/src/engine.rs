//! The sync run state machine.
//!
//! ```text
//! Idle → AuthCheck → PermissionCheck → Ingest → Enrich → Reconcile → Persist → Done
//!                                  (any step) → Failed
//! ```
//!
//! Every write happens in `Persist`; the steps before it only read. A second
//! [`SyncEngine::run`] while one is in flight is refused with
//! [`Error::AlreadyRunning`].

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use orbits_core::{
  message::{MessageThreadStat, QueryMode},
  source::{CapabilityOracle, ContactDirectory, MessageArchive},
  store::PersonStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  enrich::enrich,
  error::{Error, Result},
  persist::{self, InsertFailure},
  reconcile,
};

/// Rows per write batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

// ─── Options ─────────────────────────────────────────────────────────────────

/// How new rows reach the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
  /// Re-check the store for the insert keys, then bulk insert with a
  /// per-row fallback.
  #[default]
  Checked,
  /// Let the store skip rows whose natural key is already taken.
  IgnoreConflicts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
  pub batch_size:  usize,
  pub query_mode:  QueryMode,
  pub insert_mode: InsertMode,
}

impl Default for SyncOptions {
  fn default() -> Self {
    Self {
      batch_size:  DEFAULT_BATCH_SIZE,
      query_mode:  QueryMode::default(),
      insert_mode: InsertMode::default(),
    }
  }
}

// ─── Phase ───────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncPhase {
  #[default]
  Idle,
  AuthCheck,
  PermissionCheck,
  Ingest,
  Enrich,
  Reconcile,
  Persist,
  Done,
  Failed,
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  pub user_id:                        Uuid,
  pub started_at:                     DateTime<Utc>,
  pub finished_at:                    DateTime<Utc>,
  pub contacts_observed:              usize,
  pub contacts_skipped_ineligible:    usize,
  pub contacts_skipped_no_identifier: usize,
  pub threads_processed:              usize,
  pub unmatched_handles:              usize,
  /// False when the archive was unreadable or its query failed; message
  /// fields were then left empty for this run.
  pub message_data_available:         bool,
  pub records_updated:                usize,
  pub records_inserted:               usize,
  /// Planned inserts dropped because the row appeared in the store
  /// mid-run.
  pub inserts_skipped_existing:       usize,
  pub insert_failures:                Vec<InsertFailure>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Drives sync runs against a store `S`, a contact directory `D`, a message
/// archive `A` and a capability oracle `C`.
pub struct SyncEngine<S, D, A, C> {
  store:        S,
  directory:    D,
  archive:      A,
  capabilities: C,
  options:      SyncOptions,
  phase:        Mutex<SyncPhase>,
  running:      tokio::sync::Mutex<()>,
}

impl<S, D, A, C> SyncEngine<S, D, A, C>
where
  S: PersonStore,
  D: ContactDirectory,
  A: MessageArchive,
  C: CapabilityOracle,
{
  pub fn new(store: S, directory: D, archive: A, capabilities: C) -> Self {
    Self {
      store,
      directory,
      archive,
      capabilities,
      options: SyncOptions::default(),
      phase: Mutex::new(SyncPhase::Idle),
      running: tokio::sync::Mutex::new(()),
    }
  }

  pub fn with_options(mut self, options: SyncOptions) -> Self {
    self.options = options;
    self
  }

  /// The phase of the current run, or of the last one if none is running.
  pub fn phase(&self) -> SyncPhase {
    *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn enter(&self, next: SyncPhase) {
    let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
    let prev = std::mem::replace(&mut *phase, next);
    tracing::debug!(from = %prev, to = %next, "sync phase");
  }

  /// Run one full sync.
  pub async fn run(&self) -> Result<SyncReport> {
    let Ok(_running) = self.running.try_lock() else {
      tracing::warn!("sync requested while another run is in progress");
      return Err(Error::AlreadyRunning);
    };

    match self.run_steps().await {
      Ok(report) => {
        self.enter(SyncPhase::Done);
        tracing::info!(
          updated = report.records_updated,
          inserted = report.records_inserted,
          skipped_existing = report.inserts_skipped_existing,
          failed = report.insert_failures.len(),
          "sync finished"
        );
        Ok(report)
      }
      Err(e) => {
        tracing::error!(phase = %self.phase(), error = %e, "sync failed");
        self.enter(SyncPhase::Failed);
        Err(e)
      }
    }
  }

  async fn run_steps(&self) -> Result<SyncReport> {
    let started_at = Utc::now();

    self.enter(SyncPhase::AuthCheck);
    let session = self.store.current_session().ok_or(Error::NoSession)?;
    let user_id = session.user_id;

    self.enter(SyncPhase::PermissionCheck);
    if !self.capabilities.has_directory_permission().await {
      return Err(Error::PermissionDenied("contact directory".into()));
    }
    let archive_permitted =
      self.capabilities.has_archive_permission() && self.archive.can_access();
    if !archive_permitted {
      tracing::warn!("message archive is not readable; syncing without message data");
    }

    self.enter(SyncPhase::Ingest);
    let (contacts, threads) = tokio::join!(
      self.directory.fetch_all_contacts(),
      self.read_threads(archive_permitted),
    );
    let contacts = contacts.map_err(|e| Error::Directory(Box::new(e)))?;
    let message_data_available = threads.is_some();
    let threads = threads.unwrap_or_default();
    tracing::info!(
      contacts = contacts.len(),
      threads = threads.len(),
      "local sources read"
    );

    self.enter(SyncPhase::Enrich);
    let enrichment = enrich(&contacts, &threads);
    drop(contacts);
    tracing::info!(
      candidates = enrichment.candidates.len(),
      skipped_ineligible = enrichment.skipped_ineligible,
      skipped_no_identifier = enrichment.skipped_no_identifier,
      "contacts enriched"
    );

    self.enter(SyncPhase::Reconcile);
    let existing = self.store.list_persons(user_id).await.map_err(Error::store)?;
    let mut plan =
      reconcile::plan(user_id, &existing, enrichment.candidates, Utc::now());
    tracing::info!(
      existing = existing.len(),
      updates = plan.updates.len(),
      inserts = plan.inserts.len(),
      "plan computed"
    );

    self.enter(SyncPhase::Persist);
    let batch_size = self.options.batch_size;
    let records_updated =
      persist::apply_updates(&self.store, std::mem::take(&mut plan.updates), batch_size).await?;

    let (records_inserted, inserts_skipped_existing, insert_failures) =
      match self.options.insert_mode {
        InsertMode::Checked => {
          let skipped = if plan.inserts.is_empty() {
            0
          } else {
            let taken = self
              .store
              .existing_keys(user_id, plan.insert_keys())
              .await
              .map_err(Error::store)?;
            plan.drop_inserts(&taken)
          };
          if skipped > 0 {
            tracing::warn!(skipped, "rows appeared in the store since the initial fetch");
          }
          let outcome = persist::apply_inserts(&self.store, plan.inserts, batch_size).await?;
          (outcome.inserted, skipped, outcome.failures)
        }
        InsertMode::IgnoreConflicts => {
          let planned = plan.inserts.len();
          let inserted =
            persist::apply_inserts_ignoring_conflicts(&self.store, plan.inserts, batch_size)
              .await?;
          (inserted, planned.saturating_sub(inserted), Vec::new())
        }
      };

    Ok(SyncReport {
      user_id,
      started_at,
      finished_at: Utc::now(),
      contacts_observed: enrichment.contacts_observed,
      contacts_skipped_ineligible: enrichment.skipped_ineligible,
      contacts_skipped_no_identifier: enrichment.skipped_no_identifier,
      threads_processed: enrichment.threads_processed,
      unmatched_handles: enrichment.unmatched_handles,
      message_data_available,
      records_updated,
      records_inserted,
      inserts_skipped_existing,
      insert_failures,
    })
  }

  /// Thread stats, or `None` if the archive is unavailable this run.
  async fn read_threads(&self, permitted: bool) -> Option<Vec<MessageThreadStat>> {
    if !permitted {
      return None;
    }
    match self.archive.fetch_threads(self.options.query_mode).await {
      Ok(threads) => Some(threads),
      Err(e) => {
        tracing::warn!(error = %e, "message archive query failed; syncing without message data");
        None
      }
    }
  }
}
