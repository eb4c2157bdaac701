//! [`ChatDb`]: the SQLite implementation of [`MessageArchive`].

use std::{
  fs::File,
  path::{Path, PathBuf},
};

use orbits_core::{
  message::{MessageThreadStat, QueryMode},
  source::MessageArchive,
};
use rusqlite::OpenFlags;

use crate::{
  Error, Result,
  epoch::apple_time_to_utc,
  query::{CONVERSATION_STATS, HANDLE_STATS},
};

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// Columns of a [`CONVERSATION_STATS`] row.
struct RawConversation {
  guid:              String,
  display_name:      Option<String>,
  participants:      Option<String>,
  participant_count: i64,
  last_message_date: Option<f64>,
  unread_count:      Option<i64>,
}

impl RawConversation {
  fn into_stat(self) -> MessageThreadStat {
    let handles: Vec<String> = self
      .participants
      .as_deref()
      .unwrap_or_default()
      .split(',')
      .map(str::trim)
      .filter(|h| !h.is_empty())
      .map(str::to_owned)
      .collect();
    let unread_count = clamp_count(self.unread_count);

    MessageThreadStat {
      conversation_guid: Some(self.guid),
      handles,
      display_name: self.display_name.filter(|n| !n.trim().is_empty()),
      is_group: self.participant_count != 1,
      has_unread: unread_count > 0,
      unread_count,
      needs_response: None,
      last_message_at: apple_time_to_utc(self.last_message_date),
    }
  }
}

/// Columns of a [`HANDLE_STATS`] row.
struct RawHandle {
  handle:            String,
  unread_count:      Option<i64>,
  last_message_date: Option<f64>,
  last_is_from_me:   Option<i64>,
  chat_guid:         Option<String>,
}

impl RawHandle {
  fn into_stat(self) -> MessageThreadStat {
    let unread_count = clamp_count(self.unread_count);
    MessageThreadStat {
      conversation_guid: self.chat_guid,
      handles: vec![self.handle],
      display_name: None,
      is_group: false,
      has_unread: unread_count > 0,
      unread_count,
      needs_response: self.last_is_from_me.map(|from_me| from_me == 0),
      last_message_at: apple_time_to_utc(self.last_message_date),
    }
  }
}

fn clamp_count(raw: Option<i64>) -> u32 {
  raw.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32
}

// ─── ChatDb ──────────────────────────────────────────────────────────────────

/// A message archive at a fixed path, opened read-only per query.
#[derive(Debug, Clone)]
pub struct ChatDb {
  path: PathBuf,
}

impl ChatDb {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  /// `~/Library/Messages/chat.db`, if `HOME` is set.
  pub fn default_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
      .map(|home| PathBuf::from(home).join("Library/Messages/chat.db"))
  }

  pub fn path(&self) -> &Path { &self.path }

  /// Whether the archive file can currently be opened for reading.
  pub fn can_access_database(&self) -> bool { File::open(&self.path).is_ok() }

  /// Aggregate message statistics in the requested mode.
  ///
  /// Fails with [`Error::AccessDenied`] if the file cannot be read, and with
  /// [`Error::Database`] if the connection or a query fails.
  pub async fn fetch_threads(&self, mode: QueryMode) -> Result<Vec<MessageThreadStat>> {
    if tokio::fs::File::open(&self.path).await.is_err() {
      return Err(Error::AccessDenied(self.path.clone()));
    }

    let conn = tokio_rusqlite::Connection::open_with_flags(
      &self.path,
      OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .await?;

    let stats = match mode {
      QueryMode::Conversation => self.conversation_stats(&conn).await?,
      QueryMode::Handle => self.handle_stats(&conn).await?,
    };

    tracing::debug!(
      path = %self.path.display(),
      ?mode,
      rows = stats.len(),
      "read message archive"
    );
    Ok(stats)
  }

  async fn conversation_stats(
    &self,
    conn: &tokio_rusqlite::Connection,
  ) -> Result<Vec<MessageThreadStat>> {
    let raws: Vec<RawConversation> = conn
      .call(|conn| {
        let mut stmt = conn.prepare(CONVERSATION_STATS)?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawConversation {
              guid:              row.get(0)?,
              display_name:      row.get(1)?,
              participants:      row.get(2)?,
              participant_count: row.get(3)?,
              last_message_date: row.get(4)?,
              unread_count:      row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws.into_iter().map(RawConversation::into_stat).collect())
  }

  async fn handle_stats(
    &self,
    conn: &tokio_rusqlite::Connection,
  ) -> Result<Vec<MessageThreadStat>> {
    let raws: Vec<RawHandle> = conn
      .call(|conn| {
        let mut stmt = conn.prepare(HANDLE_STATS)?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawHandle {
              handle:            row.get(0)?,
              unread_count:      row.get(1)?,
              last_message_date: row.get(2)?,
              last_is_from_me:   row.get(3)?,
              chat_guid:         row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws.into_iter().map(RawHandle::into_stat).collect())
  }
}

impl MessageArchive for ChatDb {
  type Error = Error;

  fn can_access(&self) -> bool { self.can_access_database() }

  async fn fetch_threads(&self, mode: QueryMode) -> Result<Vec<MessageThreadStat>> {
    ChatDb::fetch_threads(self, mode).await
  }
}
