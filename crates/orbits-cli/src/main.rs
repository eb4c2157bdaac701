//! `orbits`: sync local contacts and message activity into a person store.
//!
//! # Usage
//!
//! ```
//! orbits sync --json
//! orbits watch
//! orbits --config ~/.config/orbits/orbits.toml status
//! ```
//!
//! Settings come from the TOML file given with `--config` (default
//! `orbits.toml`) overlaid by `ORBITS__*` environment variables.

mod capabilities;
mod client;
mod settings;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context as _, Result};
use capabilities::LocalCapabilities;
use clap::{Parser, Subcommand};
use client::{RestConfig, RestStore};
use orbits_archive::ChatDb;
use orbits_core::{
  source::{CapabilityOracle, ContactDirectory, MessageArchive},
  store::PersonStore,
};
use orbits_directory::AddressBook;
use orbits_store_sqlite::SqliteStore;
use orbits_sync::{SyncEngine, SyncReport};
use settings::{Settings, StoreSettings, expand_tilde};
use tokio::time::{self, MissedTickBehavior};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "orbits", version, about = "Sync local contacts into Orbits")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "orbits.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run one sync and print its report.
  Sync {
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
  },
  /// Sync repeatedly at the configured cadence until interrupted.
  Watch,
  /// Show capabilities and a summary of the stored people.
  Status,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;
  let session = settings.session.session();

  match &settings.store {
    StoreSettings::Sqlite { path } => {
      let path = expand_tilde(path);
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
          .with_context(|| format!("failed to create {}", parent.display()))?;
      }
      let mut store = SqliteStore::open(&path)
        .await
        .with_context(|| format!("failed to open store at {path:?}"))?;
      if let Some(session) = session {
        store = store.with_session(session);
      }
      dispatch(cli.command, store, &settings).await
    }
    StoreSettings::Rest { url, api_key, access_token } => {
      let store = RestStore::new(
        RestConfig {
          base_url:     url.clone(),
          api_key:      api_key.clone(),
          access_token: access_token.clone(),
        },
        session,
      )
      .context("failed to build HTTP client")?;
      dispatch(cli.command, store, &settings).await
    }
  }
}

async fn dispatch<S: PersonStore>(command: Command, store: S, settings: &Settings) -> Result<()> {
  let address_book = AddressBook::new(expand_tilde(&settings.sources.address_book_root));
  let chat_db = ChatDb::new(expand_tilde(&settings.sources.archive_path));
  tracing::debug!(
    address_book = %address_book.root().display(),
    archive = %chat_db.path().display(),
    "local sources"
  );
  let capabilities = LocalCapabilities::new(address_book.clone(), chat_db.clone());

  if let Command::Status = command {
    return status(&store, &capabilities).await;
  }

  let engine = SyncEngine::new(store, address_book, chat_db, capabilities)
    .with_options(settings.sync.options());

  if let Command::Sync { json } = command {
    let report = engine.run().await?;
    return print_report(&report, json);
  }
  watch(&engine, settings.sync.cadence_minutes).await
}

// ─── Commands ─────────────────────────────────────────────────────────────────

/// Run a sync every `cadence_minutes`, starting now. A failed run is logged
/// and the loop carries on; runs never overlap since each tick awaits the
/// previous run.
async fn watch<S, D, A, C>(engine: &SyncEngine<S, D, A, C>, cadence_minutes: u64) -> Result<()>
where
  S: PersonStore,
  D: ContactDirectory,
  A: MessageArchive,
  C: CapabilityOracle,
{
  let mut interval = time::interval(Duration::from_secs(cadence_minutes * 60));
  interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
  tracing::info!(cadence_minutes, "watching for changes");

  loop {
    tokio::select! {
      _ = interval.tick() => {
        match engine.run().await {
          Ok(report) => tracing::info!(
            inserted = report.records_inserted,
            updated = report.records_updated,
            "scheduled sync complete"
          ),
          Err(e) => tracing::error!(error = %e, "scheduled sync failed"),
        }
      }
      _ = tokio::signal::ctrl_c() => {
        tracing::info!("interrupted, stopping");
        return Ok(());
      }
    }
  }
}

async fn status<S: PersonStore>(store: &S, capabilities: &LocalCapabilities) -> Result<()> {
  let summary = capabilities.summary();
  println!("{summary}");
  for hint in summary.hints() {
    println!("  {hint}");
  }

  let Some(session) = store.current_session() else {
    println!("session: none (set session.user_id)");
    return Ok(());
  };
  println!(
    "session: {}{}",
    session.user_id,
    session.email.map(|e| format!(" <{e}>")).unwrap_or_default()
  );

  let people = store
    .list_persons(session.user_id)
    .await
    .context("failed to list people")?;
  let unread = people.iter().filter(|p| p.unread_count > 0).count();
  let needs_response = people.iter().filter(|p| p.needs_response).count();
  let in_orbit = people.iter().filter(|p| p.orbit_id.is_some()).count();
  println!("people: {}", people.len());
  println!("  with unread messages: {unread}");
  println!("  awaiting a reply:     {needs_response}");
  println!("  assigned to an orbit: {in_orbit}");
  Ok(())
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
  if json {
    let out = serde_json::to_string_pretty(report).context("failed to serialise report")?;
    println!("{out}");
    return Ok(());
  }

  println!("contacts observed:      {}", report.contacts_observed);
  println!("  skipped (ineligible): {}", report.contacts_skipped_ineligible);
  println!("  skipped (no handle):  {}", report.contacts_skipped_no_identifier);
  println!(
    "message threads:        {}{}",
    report.threads_processed,
    if report.message_data_available { "" } else { " (messages unavailable)" }
  );
  println!("updated:                {}", report.records_updated);
  println!("inserted:               {}", report.records_inserted);
  if report.inserts_skipped_existing > 0 {
    println!("  already present:      {}", report.inserts_skipped_existing);
  }
  for failure in &report.insert_failures {
    println!("  failed {}: {}", failure.contact_identifier, failure.reason);
  }
  Ok(())
}
