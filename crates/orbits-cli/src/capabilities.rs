//! OS capability probes for the local sources.

use std::fmt;

use orbits_archive::ChatDb;
use orbits_core::source::CapabilityOracle;
use orbits_directory::AddressBook;

/// Probes by attempting to read the source locations themselves; a denied
/// privacy permission surfaces as an unreadable path.
#[derive(Debug, Clone)]
pub struct LocalCapabilities {
  address_book: AddressBook,
  chat_db:      ChatDb,
}

impl LocalCapabilities {
  pub fn new(address_book: AddressBook, chat_db: ChatDb) -> Self {
    Self { address_book, chat_db }
  }

  pub fn summary(&self) -> PermissionSummary {
    PermissionSummary {
      directory: self.address_book.is_readable(),
      archive:   self.chat_db.can_access_database(),
    }
  }
}

impl CapabilityOracle for LocalCapabilities {
  async fn has_directory_permission(&self) -> bool {
    let address_book = self.address_book.clone();
    tokio::task::spawn_blocking(move || address_book.is_readable())
      .await
      .unwrap_or(false)
  }

  fn has_archive_permission(&self) -> bool { self.chat_db.can_access_database() }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionSummary {
  pub directory: bool,
  pub archive:   bool,
}

impl PermissionSummary {
  /// One remediation hint per missing capability.
  pub fn hints(&self) -> Vec<&'static str> {
    let mut hints = Vec::new();
    if !self.directory {
      hints.push(
        "Contacts are not readable: grant Contacts access in System Settings → Privacy & \
         Security → Contacts. Sync cannot run without it.",
      );
    }
    if !self.archive {
      hints.push(
        "Messages are not readable: grant Full Disk Access in System Settings → Privacy & \
         Security → Full Disk Access. Sync will run without message data.",
      );
    }
    hints
  }
}

impl fmt::Display for PermissionSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mark = |ok: bool| if ok { "granted" } else { "missing" };
    writeln!(f, "contacts: {}", mark(self.directory))?;
    write!(f, "messages: {}", mark(self.archive))
  }
}
