//! Settings for the `orbits` binary.
//!
//! Loaded from an optional TOML file layered under `ORBITS__*` environment
//! variables, e.g. `ORBITS__SESSION__USER_ID` or `ORBITS__SYNC__BATCH_SIZE`.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use orbits_archive::ChatDb;
use orbits_core::{message::QueryMode, store::Session};
use orbits_directory::AddressBook;
use orbits_sync::{InsertMode, SyncOptions};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub session: SessionSettings,
  pub store:   StoreSettings,
  pub sources: SourceSettings,
  pub sync:    SyncSettings,
}

impl Settings {
  /// Read `path` (if it exists) and overlay the environment.
  pub fn load(path: &Path) -> Result<Self> {
    let settings: Settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("ORBITS")
          .prefix_separator("__")
          .separator("__"),
      )
      .build()
      .context("failed to read config")?
      .try_deserialize()
      .context("failed to deserialise settings")?;

    settings.sync.validate()?;
    Ok(settings)
  }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// Who the sync runs as. Without a `user_id` every run stops at the auth
/// check.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
  pub user_id: Option<Uuid>,
  pub email:   Option<String>,
}

impl SessionSettings {
  pub fn session(&self) -> Option<Session> {
    self.user_id.map(|user_id| Session { user_id, email: self.email.clone() })
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreSettings {
  /// A local SQLite file.
  Sqlite { path: PathBuf },
  /// A PostgREST endpoint.
  Rest {
    url:          String,
    api_key:      String,
    /// Bearer token for the signed-in user; the API key is sent if absent.
    #[serde(default)]
    access_token: Option<String>,
  },
}

impl Default for StoreSettings {
  fn default() -> Self { Self::Sqlite { path: PathBuf::from("~/.local/share/orbits/orbits.db") } }
}

// ─── Sources ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
  pub archive_path:      PathBuf,
  pub address_book_root: PathBuf,
}

impl Default for SourceSettings {
  fn default() -> Self {
    Self {
      archive_path:      ChatDb::default_path()
        .unwrap_or_else(|| PathBuf::from("~/Library/Messages/chat.db")),
      address_book_root: AddressBook::default_root()
        .unwrap_or_else(|| PathBuf::from("~/Library/Application Support/AddressBook")),
    }
  }
}

// ─── Sync ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
  pub batch_size:      usize,
  pub query_mode:      QueryMode,
  pub insert_mode:     InsertMode,
  /// Minutes between runs in `watch` mode.
  pub cadence_minutes: u64,
}

impl Default for SyncSettings {
  fn default() -> Self {
    let options = SyncOptions::default();
    Self {
      batch_size:      options.batch_size,
      query_mode:      options.query_mode,
      insert_mode:     options.insert_mode,
      cadence_minutes: 60,
    }
  }
}

impl SyncSettings {
  fn validate(&self) -> Result<()> {
    if self.batch_size == 0 {
      bail!("sync.batch_size must be at least 1");
    }
    if !(1..=1440).contains(&self.cadence_minutes) {
      bail!("sync.cadence_minutes must be 1-1440, got {}", self.cadence_minutes);
    }
    Ok(())
  }

  pub fn options(&self) -> SyncOptions {
    SyncOptions {
      batch_size:  self.batch_size,
      query_mode:  self.query_mode,
      insert_mode: self.insert_mode,
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
